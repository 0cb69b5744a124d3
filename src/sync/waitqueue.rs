use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::Instant;

///
/// Guard mutex and condition variable pair that threads park on.
///
/// The guard is only held for the check-and-park window. Every park re-checks its
/// blocking condition under the guard, and every wake-up takes the guard before
/// notifying, so a state change published before the wake-up can't slip between
/// a waiter's check and its park.
pub(crate) struct WaitQueue<S = ()> {
    guard: Mutex<S>,
    cvar: Condvar,
}

impl<S> WaitQueue<S> {
    pub fn new(state: S) -> Self {
        Self {
            guard: Mutex::new(state),
            cvar: Condvar::new(),
        }
    }

    /// Parks until `blocked` returns false.
    #[inline]
    pub fn park_while<F>(&self, mut blocked: F)
    where
        F: FnMut(&mut S) -> bool,
    {
        let mut g = self.guard.lock();
        while blocked(&mut *g) {
            self.cvar.wait(&mut g);
        }
    }

    /// Parks until `blocked` returns false or the deadline passes.
    /// Returns whether the condition cleared.
    #[inline]
    pub fn park_while_until<F>(&self, deadline: Instant, mut blocked: F) -> bool
    where
        F: FnMut(&mut S) -> bool,
    {
        let mut g = self.guard.lock();
        while blocked(&mut *g) {
            if self.cvar.wait_until(&mut g, deadline).timed_out() {
                return !blocked(&mut *g);
            }
        }
        true
    }

    /// Parks at most once, and only if `blocked` still holds under the guard.
    #[inline]
    pub fn park_once_if<F>(&self, blocked: F)
    where
        F: FnOnce(&mut S) -> bool,
    {
        let mut g = self.guard.lock();
        if blocked(&mut *g) {
            self.cvar.wait(&mut g);
        }
    }

    /// Timed [`park_once_if`](Self::park_once_if). Returns false if the deadline passed.
    #[inline]
    pub fn park_once_if_until<F>(&self, deadline: Instant, blocked: F) -> bool
    where
        F: FnOnce(&mut S) -> bool,
    {
        let mut g = self.guard.lock();
        if blocked(&mut *g) {
            !self.cvar.wait_until(&mut g, deadline).timed_out()
        } else {
            true
        }
    }

    /// Runs `f` on the guarded state without parking.
    #[inline]
    pub fn with_state<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut S) -> R,
    {
        f(&mut *self.guard.lock())
    }

    /// Updates the guarded state and wakes one parked thread.
    #[inline]
    pub fn signal_with<F>(&self, f: F)
    where
        F: FnOnce(&mut S),
    {
        let mut g = self.guard.lock();
        f(&mut *g);
        self.cvar.notify_one();
    }

    /// Updates the guarded state and wakes every parked thread.
    #[inline]
    pub fn broadcast_with<F>(&self, f: F)
    where
        F: FnOnce(&mut S),
    {
        let mut g = self.guard.lock();
        f(&mut *g);
        self.cvar.notify_all();
    }

    #[inline]
    pub fn signal(&self) {
        let _g = self.guard.lock();
        self.cvar.notify_one();
    }

    #[inline]
    pub fn broadcast(&self) {
        let _g = self.guard.lock();
        self.cvar.notify_all();
    }
}

impl<S: Default> Default for WaitQueue<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> fmt::Debug for WaitQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue").finish()
    }
}
