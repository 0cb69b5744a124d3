use super::waitqueue::WaitQueue;
use crate::errors::{SyncError, SyncResult};
use log::*;
use std::convert::TryFrom;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

///
/// Counting semaphore.
///
/// A single signed counter is the source of truth: a positive value is the number of
/// free permits, a negative one the number of threads waiting for a permit. Parked
/// threads are woken by wake tokens posted under the queue guard, one per permit
/// handed over.
pub struct Semaphore {
    permits: AtomicI64,
    held: AtomicUsize,
    wakeups: WaitQueue<u64>,
}

enum Withdrawal {
    Served,
    Withdrawn,
    InFlight,
}

#[inline]
fn take_token(tokens: &mut u64) -> bool {
    if *tokens > 0 {
        *tokens -= 1;
        false
    } else {
        true
    }
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: AtomicI64::new(i64::try_from(permits).unwrap_or(i64::MAX)),
            held: AtomicUsize::new(0),
            wakeups: WaitQueue::new(0),
        }
    }

    /// Free permits right now. Advisory.
    #[inline]
    pub fn available_permits(&self) -> usize {
        self.permits.load(Ordering::Acquire).max(0) as usize
    }

    /// Threads blocked in an acquire right now. Advisory.
    #[inline]
    pub fn waiting(&self) -> usize {
        let c = self.permits.load(Ordering::Acquire);
        if c < 0 {
            c.unsigned_abs() as usize
        } else {
            0
        }
    }

    /// Permits taken, or being waited for, and not yet released. A blocked acquire
    /// already counts, so another thread may release on its behalf.
    #[inline]
    pub fn held(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    ///
    /// Take a permit, blocking until one is available.
    pub fn acquire(&self) {
        // Counted before the counter moves, so a release racing with our park matches us.
        self.held.fetch_add(1, Ordering::AcqRel);
        let prev = self.permits.fetch_sub(1, Ordering::AcqRel);
        if prev <= 0 {
            trace!("semaphore::acquire::parked::{}", prev);
            self.wakeups.park_while(take_token);
        }
    }

    ///
    /// Take a permit if one is free. A single CAS attempt, never blocks; losing a race
    /// for the counter counts as failure.
    pub fn try_acquire(&self) -> bool {
        let c = self.permits.load(Ordering::Acquire);
        if c <= 0 {
            return false;
        }
        let taken = self
            .permits
            .compare_exchange(c, c - 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if taken {
            self.held.fetch_add(1, Ordering::AcqRel);
        }
        taken
    }

    ///
    /// Take a permit, blocking at most `timeout`.
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        let deadline = match Instant::now().checked_add(timeout) {
            Some(d) => d,
            None => {
                self.acquire();
                return true;
            }
        };

        self.held.fetch_add(1, Ordering::AcqRel);
        let prev = self.permits.fetch_sub(1, Ordering::AcqRel);
        if prev > 0 || self.wakeups.park_while_until(deadline, take_token) {
            return true;
        }

        match self.wakeups.with_state(|tokens| self.withdraw(tokens)) {
            Withdrawal::Served => {}
            Withdrawal::Withdrawn => {
                // A negative counter means at least this waiter is still unmatched.
                self.held.fetch_sub(1, Ordering::AcqRel);
                debug!("semaphore::try_acquire_for::timed_out");
                return false;
            }
            Withdrawal::InFlight => self.wakeups.park_while(take_token),
        }
        true
    }

    // Runs under the queue guard. Giving up is only sound while the counter still
    // shows more waiters than permits already handed over.
    fn withdraw(&self, tokens: &mut u64) -> Withdrawal {
        if !take_token(tokens) {
            return Withdrawal::Served;
        }

        let mut c = self.permits.load(Ordering::Acquire);
        loop {
            if c >= 0 {
                return Withdrawal::InFlight;
            }
            match self
                .permits
                .compare_exchange(c, c + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Withdrawal::Withdrawn,
                Err(actual) => c = actual,
            }
        }
    }

    ///
    /// Give back a permit taken by one of the acquire methods, or hand one to a thread
    /// still blocked in an acquire.
    ///
    /// Releasing more than was taken or requested is refused with [`SyncError::UnbalancedRelease`].
    /// Use [`add_permits`](Self::add_permits) to raise the capacity on purpose.
    pub fn release(&self) -> SyncResult<()> {
        let mut h = self.held.load(Ordering::Acquire);
        loop {
            if h == 0 {
                return Err(SyncError::UnbalancedRelease);
            }
            match self
                .held
                .compare_exchange(h, h - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => h = actual,
            }
        }

        let prev = self.permits.fetch_add(1, Ordering::AcqRel);
        if prev < 0 {
            self.wakeups.signal_with(|tokens| *tokens += 1);
        }
        Ok(())
    }

    ///
    /// Permanently raise the capacity by `n` permits.
    pub fn add_permits(&self, n: usize) {
        if n == 0 {
            return;
        }
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        let prev = self.permits.fetch_add(n, Ordering::AcqRel);
        if prev < 0 {
            let woken = n.min(prev.unsigned_abs() as i64) as u64;
            self.wakeups.broadcast_with(|tokens| *tokens += woken);
        }
    }

    ///
    /// Take a permit that is given back when the returned guard drops.
    pub fn permit(&self) -> SemaphorePermit<'_> {
        self.acquire();
        SemaphorePermit { sem: self }
    }

    pub fn try_permit(&self) -> Option<SemaphorePermit<'_>> {
        if self.try_acquire() {
            Some(SemaphorePermit { sem: self })
        } else {
            None
        }
    }

    ///
    /// Runs `f` while holding a permit. The permit is released even if `f` panics.
    pub fn with_permit<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _permit = self.permit();
        f()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("permits", &self.permits.load(Ordering::Relaxed))
            .field("held", &self.held())
            .finish()
    }
}

///
/// Permit held on a [`Semaphore`], released on drop.
pub struct SemaphorePermit<'a> {
    sem: &'a Semaphore,
}

impl<'a> SemaphorePermit<'a> {
    /// Keep the permit taken. It can still be given back with [`Semaphore::release`].
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl<'a> Drop for SemaphorePermit<'a> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.release() {
            debug!("semaphore::permit::drop::{}", e);
        }
    }
}

impl<'a> fmt::Debug for SemaphorePermit<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphorePermit").finish()
    }
}
