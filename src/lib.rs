//!
//! Pillars for in-process coordination between threads.
//!
//! * [`RwLock`](sync::rwlock::RwLock): fair reader/writer lock, a single CAS when
//!   uncontended and condition-variable parking under contention.
//! * [`Semaphore`](sync::semaphore::Semaphore), [`CountdownLatch`](sync::latch::CountdownLatch)
//!   and [`CyclicBarrier`](sync::barrier::CyclicBarrier).
//! * [`TreiberStack`](sync::treiber::TreiberStack) and
//!   [`RecyclingStack`](sync::recycling::RecyclingStack), lock-free stacks with
//!   epoch-based reclamation.
//! * [`StripedMap`](table::striped::StripedMap): hash map sharded over per-stripe RW locks.

/// Errors reported by the synchronization primitives
pub mod errors;
/// Synchronization primitives exposed by Palisade
pub mod sync;
/// Concurrent in-memory table variations
pub mod table;

///
/// Prelude of everything above
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::sync::prelude::*;
    pub use crate::table::prelude::*;
}
