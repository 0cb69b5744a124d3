use std::result;
use thiserror::Error;

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum SyncError {
    #[error("Reader limit exceeded: at most {max} concurrent readers")]
    ReaderLimit { max: u64 },
    #[error("Writer limit exceeded: at most {max} waiting writers")]
    WriterLimit { max: u64 },
    #[error("Permit released without a matching acquire, use add_permits to raise capacity")]
    UnbalancedRelease,
}

pub type SyncResult<T> = result::Result<T, SyncError>;
