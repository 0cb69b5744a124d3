//!
//! Bit-packed state word of the fair RW lock.
//!
//! ```text
//!  63        62 ........... 32  31 ............ 0
//! [ running ][ waiting writers ][ active readers ]
//! ```
use std::fmt;

/// Bits reserved for the active reader count.
pub const READER_BITS: u32 = 32;
/// Bits reserved for the waiting writer count.
pub const WAITING_WRITER_BITS: u32 = 31;

/// Largest representable number of active readers.
pub const MAX_READERS: u64 = (1 << READER_BITS) - 1;
/// Largest representable number of waiting writers.
pub const MAX_WAITING_WRITERS: u64 = (1 << WAITING_WRITER_BITS) - 1;

/// One waiting writer.
pub const WAITING_WRITER: u64 = 1 << READER_BITS;
/// Writer currently holds the lock.
pub const RUNNING_WRITER: u64 = 1 << (READER_BITS + WAITING_WRITER_BITS);

const READER_MASK: u64 = MAX_READERS;
const WAITING_WRITER_MASK: u64 = MAX_WAITING_WRITERS << READER_BITS;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LockState(u64);

impl LockState {
    pub const UNLOCKED: LockState = LockState(0);
    pub const WRITE_LOCKED: LockState = LockState(RUNNING_WRITER);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn readers(self) -> u64 {
        self.0 & READER_MASK
    }

    #[inline]
    pub const fn waiting_writers(self) -> u64 {
        (self.0 & WAITING_WRITER_MASK) >> READER_BITS
    }

    #[inline]
    pub const fn has_running_writer(self) -> bool {
        self.0 & RUNNING_WRITER != 0
    }

    #[inline]
    pub const fn has_waiting_writer(self) -> bool {
        self.0 & WAITING_WRITER_MASK != 0
    }

    /// Either a writer is queued or one holds the lock.
    #[inline]
    pub const fn has_writer(self) -> bool {
        self.0 >= WAITING_WRITER
    }

    #[inline]
    pub const fn has_readers(self) -> bool {
        self.readers() != 0
    }

    #[inline]
    pub const fn is_unlocked(self) -> bool {
        self.0 == 0
    }

    /// Neither a reader nor a writer runs. Waiting writers may still be queued.
    #[inline]
    pub const fn is_idle(self) -> bool {
        !self.has_running_writer() && !self.has_readers()
    }

    #[inline]
    pub const fn readers_saturated(self) -> bool {
        self.readers() == MAX_READERS
    }

    #[inline]
    pub const fn writers_saturated(self) -> bool {
        self.waiting_writers() == MAX_WAITING_WRITERS
    }

    #[inline]
    pub const fn with_reader(self) -> Self {
        Self(self.0 + 1)
    }

    #[inline]
    pub const fn without_reader(self) -> Self {
        Self(self.0 - 1)
    }

    #[inline]
    pub const fn with_waiting_writer(self) -> Self {
        Self(self.0 + WAITING_WRITER)
    }

    #[inline]
    pub const fn without_waiting_writer(self) -> Self {
        Self(self.0 - WAITING_WRITER)
    }

    /// Promotes one waiting writer to the running one.
    #[inline]
    pub const fn promote_writer(self) -> Self {
        Self(self.0 - WAITING_WRITER + RUNNING_WRITER)
    }

    #[inline]
    pub const fn without_running_writer(self) -> Self {
        Self(self.0 & !RUNNING_WRITER)
    }
}

impl fmt::Debug for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockState")
            .field("readers", &self.readers())
            .field("waiting_writers", &self.waiting_writers())
            .field("running_writer", &self.has_running_writer())
            .finish()
    }
}
