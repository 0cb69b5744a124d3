/// Ifaces for shared/exclusive locking
pub mod ifaces;

/// Bit-packed state word of the fair RW lock
pub mod lockstate;
pub(crate) mod waitqueue;

/// Cyclic barrier for a fixed number of parties
pub mod barrier;
/// One-shot countdown latch
pub mod latch;
/// Node recycling Treiber stack and its node pool
pub mod recycling;
/// Fair, mostly lock-free RW lock
pub mod rwlock;
/// Counting semaphore
pub mod semaphore;
/// Basic treiber stack
pub mod treiber;

///
/// Prelude for the synchronization primitives
pub mod prelude {
    pub use super::barrier::*;
    pub use super::ifaces::*;
    pub use super::latch::*;
    pub use super::recycling::*;
    pub use super::rwlock::*;
    pub use super::semaphore::*;
    pub use super::treiber::TreiberStack;
}
