/// Striped concurrent hash map guarded by per-stripe fair RW locks.
pub mod striped;

/// Prelude for concurrent KV table implementations
pub mod prelude {
    pub use super::striped::*;
}
