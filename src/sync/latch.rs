use super::waitqueue::WaitQueue;
use log::*;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

///
/// One-shot gate that opens once it has been counted down to zero.
pub struct CountdownLatch {
    count: AtomicUsize,
    waiters: WaitQueue,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            count: AtomicUsize::new(count),
            waiters: WaitQueue::default(),
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.count() == 0
    }

    ///
    /// Decrement the count, opening the latch when it reaches zero.
    /// Does nothing on an open latch.
    pub fn count_down(&self) {
        let mut c = self.count.load(Ordering::Acquire);
        loop {
            if c == 0 {
                return;
            }
            match self
                .count
                .compare_exchange(c, c - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => c = actual,
            }
        }

        if c == 1 {
            trace!("latch::count_down::opened");
            self.waiters.broadcast();
        }
    }

    ///
    /// Block until the latch is open.
    pub fn wait(&self) {
        if self.is_open() {
            return;
        }
        self.waiters.park_while(|_| !self.is_open());
    }

    ///
    /// Block until the latch is open or `timeout` passes. Returns whether it opened.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        if self.is_open() {
            return true;
        }
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.waiters.park_while_until(deadline, |_| !self.is_open()),
            None => {
                self.wait();
                true
            }
        }
    }
}

impl fmt::Debug for CountdownLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownLatch")
            .field("count", &self.count())
            .finish()
    }
}
