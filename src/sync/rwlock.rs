use super::{
    ifaces::RwLockIface,
    lockstate::{LockState, MAX_READERS, MAX_WAITING_WRITERS},
    waitqueue::WaitQueue,
};
use crate::errors::SyncError;
use log::*;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::{
    fmt,
    time::{Duration, Instant},
};
use std::{
    marker::PhantomData as marker,
    ops::{Deref, DerefMut},
};

#[cold]
#[inline(never)]
fn reader_limit() -> ! {
    panic!(
        "{}",
        SyncError::ReaderLimit {
            max: MAX_READERS
        }
    )
}

#[cold]
#[inline(never)]
fn writer_limit() -> ! {
    panic!(
        "{}",
        SyncError::WriterLimit {
            max: MAX_WAITING_WRITERS
        }
    )
}

#[inline]
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

///
/// Fair reader/writer lock without attached data.
///
/// The whole lock is a single atomic word (see [`LockState`]). Acquisitions that
/// don't contend finish with one CAS; only contended ones park on one of the two
/// wait queues.
///
/// A writer that starts waiting stops new readers from entering. Readers that were
/// already parked when that happened may barge ahead of the writer once it has
/// finished waiting but before it runs, so a stream of writers can't stall them
/// forever, while a writer only ever yields to readers that queued before it.
pub struct RawRwLock {
    state: AtomicU64,
    readers: WaitQueue,
    writers: WaitQueue,
}

impl RawRwLock {
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(LockState::UNLOCKED.raw()),
            readers: WaitQueue::default(),
            writers: WaitQueue::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_state(state: LockState) -> Self {
        let lock = Self::new();
        lock.state.store(state.raw(), Ordering::SeqCst);
        lock
    }

    #[inline]
    fn load(&self) -> LockState {
        LockState::from_raw(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn cas(&self, current: LockState, new: LockState) -> Result<LockState, LockState> {
        self.state
            .compare_exchange(current.raw(), new.raw(), Ordering::AcqRel, Ordering::Acquire)
            .map(LockState::from_raw)
            .map_err(LockState::from_raw)
    }

    /// Snapshot of the lock word.
    #[inline]
    pub fn state(&self) -> LockState {
        self.load()
    }

    #[inline]
    pub fn readers(&self) -> u64 {
        self.load().readers()
    }

    #[inline]
    pub fn waiting_writers(&self) -> u64 {
        self.load().waiting_writers()
    }

    #[inline]
    pub fn is_write_locked(&self) -> bool {
        self.load().has_running_writer()
    }

    ///
    /// Acquire the lock in shared mode, waiting at most `timeout`.
    pub fn try_acquire_read_for(&self, timeout: Duration) -> bool {
        match deadline_after(timeout) {
            Some(deadline) => self.lock_read(Some(deadline)),
            None => self.lock_read(None),
        }
    }

    ///
    /// Acquire the lock in exclusive mode, waiting at most `timeout`.
    pub fn try_acquire_write_for(&self, timeout: Duration) -> bool {
        match deadline_after(timeout) {
            Some(deadline) => self.lock_write(Some(deadline)),
            None => self.lock_write(None),
        }
    }

    fn lock_read(&self, deadline: Option<Instant>) -> bool {
        let mut c = self.load();
        loop {
            if c.readers_saturated() {
                reader_limit();
            }

            if c.has_writer() {
                trace!("rwlock::lock_read::parked::{:?}", c);
                let woken = match deadline {
                    Some(d) => self
                        .readers
                        .park_once_if_until(d, |_| self.load().has_writer()),
                    None => {
                        self.readers.park_once_if(|_| self.load().has_writer());
                        true
                    }
                };
                if !woken {
                    debug!("rwlock::lock_read::timed_out");
                    return false;
                }
                return self.barge_read(deadline);
            }

            match self.cas(c, c.with_reader()) {
                Ok(_) => return true,
                Err(actual) => c = actual,
            }
        }
    }

    // A reader that already waited once only yields to a running writer.
    fn barge_read(&self, deadline: Option<Instant>) -> bool {
        loop {
            let c = self.load();
            if c.readers_saturated() {
                reader_limit();
            }

            if c.has_running_writer() {
                let cleared = match deadline {
                    Some(d) => self
                        .readers
                        .park_while_until(d, |_| self.load().has_running_writer()),
                    None => {
                        self.readers
                            .park_while(|_| self.load().has_running_writer());
                        true
                    }
                };
                if !cleared {
                    debug!("rwlock::barge_read::timed_out");
                    return false;
                }
            } else if self.cas(c, c.with_reader()).is_ok() {
                return true;
            }
        }
    }

    fn lock_write(&self, deadline: Option<Instant>) -> bool {
        let mut c = self.load();
        loop {
            if c.is_unlocked() {
                match self.cas(c, LockState::WRITE_LOCKED) {
                    Ok(_) => return true,
                    Err(actual) => {
                        c = actual;
                        continue;
                    }
                }
            }

            if c.writers_saturated() {
                writer_limit();
            }

            match self.cas(c, c.with_waiting_writer()) {
                Ok(_) => return self.promote_when_idle(deadline),
                Err(actual) => c = actual,
            }
        }
    }

    // Caller is registered as a waiting writer.
    fn promote_when_idle(&self, deadline: Option<Instant>) -> bool {
        loop {
            trace!("rwlock::promote_when_idle::parked");
            let cleared = match deadline {
                Some(d) => self
                    .writers
                    .park_while_until(d, |_| !self.load().is_idle()),
                None => {
                    self.writers.park_while(|_| !self.load().is_idle());
                    true
                }
            };
            if !cleared {
                self.withdraw_writer();
                return false;
            }

            let c = self.load();
            if c.is_idle() && self.cas(c, c.promote_writer()).is_ok() {
                return true;
            }
        }
    }

    fn withdraw_writer(&self) {
        let mut c = self.load();
        let left = loop {
            match self.cas(c, c.without_waiting_writer()) {
                Ok(prev) => break prev.without_waiting_writer(),
                Err(actual) => c = actual,
            }
        };
        debug!("rwlock::withdraw_writer::{:?}", left);

        if !left.has_writer() {
            self.readers.broadcast();
        } else if left.is_idle() {
            // We may have swallowed the wake-up meant for the next writer.
            self.writers.signal();
        }
    }
}

unsafe impl RwLockIface for RawRwLock {
    #[inline]
    fn acquire_read(&self) {
        self.lock_read(None);
    }

    fn try_acquire_read(&self) -> bool {
        let mut c = self.load();
        loop {
            if c.has_writer() {
                return false;
            }
            if c.readers_saturated() {
                reader_limit();
            }
            match self.cas(c, c.with_reader()) {
                Ok(_) => return true,
                Err(actual) => c = actual,
            }
        }
    }

    fn release_read(&self) -> bool {
        let mut c = self.load();
        loop {
            if !c.has_readers() {
                return false;
            }
            match self.cas(c, c.without_reader()) {
                Ok(prev) => {
                    if prev.has_waiting_writer() && prev.readers() == 1 {
                        self.writers.signal();
                    }
                    return true;
                }
                Err(actual) => c = actual,
            }
        }
    }

    #[inline]
    fn acquire_write(&self) {
        self.lock_write(None);
    }

    #[inline]
    fn try_acquire_write(&self) -> bool {
        self.cas(LockState::UNLOCKED, LockState::WRITE_LOCKED)
            .is_ok()
    }

    fn release_write(&self) -> bool {
        let mut c = self.load();
        loop {
            if !c.has_running_writer() {
                return false;
            }
            match self.cas(c, c.without_running_writer()) {
                Ok(prev) => {
                    self.readers.broadcast();
                    if prev.has_waiting_writer() {
                        self.writers.signal();
                    }
                    return true;
                }
                Err(actual) => c = actual,
            }
        }
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRwLock")
            .field("state", &self.load())
            .finish()
    }
}

// Write Guard

pub struct WriteGuard<'a, T: ?Sized>
where
    RwLock<T>: 'a,
{
    lock: &'a RwLock<T>,
    marker: marker<&'a mut T>,
}

impl<'a, T: ?Sized> Deref for WriteGuard<'a, T>
where
    RwLock<T>: 'a,
{
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> DerefMut for WriteGuard<'a, T>
where
    RwLock<T>: 'a,
{
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for WriteGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.raw.release_write();
    }
}

impl<'a, T> fmt::Debug for WriteGuard<'a, T>
where
    T: fmt::Debug + ?Sized + 'a,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a, T> fmt::Display for WriteGuard<'a, T>
where
    T: fmt::Display + ?Sized + 'a,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

// Read Guard

pub struct ReadGuard<'a, T: ?Sized>
where
    RwLock<T>: 'a,
{
    lock: &'a RwLock<T>,
    marker: marker<&'a T>,
}

impl<'a, T: ?Sized> Deref for ReadGuard<'a, T>
where
    RwLock<T>: 'a,
{
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for ReadGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.raw.release_read();
    }
}

impl<'a, T> fmt::Debug for ReadGuard<'a, T>
where
    T: fmt::Debug + ?Sized + 'a,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a, T> fmt::Display for ReadGuard<'a, T>
where
    T: fmt::Display + ?Sized + 'a,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

///
/// Fair, mostly lock-free RW lock protecting a value.
pub struct RwLock<T>
where
    T: ?Sized,
{
    raw: RawRwLock,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T>
where
    T: ?Sized,
{
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }

    /// Snapshot of the lock word. Advisory.
    ///
    /// The raw lock itself is never handed out: releasing it behind a live guard would
    /// let a writer in next to that guard.
    #[inline]
    pub fn state(&self) -> LockState {
        self.raw.state()
    }

    #[inline]
    fn read_guard(&self) -> ReadGuard<'_, T> {
        ReadGuard { lock: self, marker }
    }

    #[inline]
    fn write_guard(&self) -> WriteGuard<'_, T> {
        WriteGuard { lock: self, marker }
    }

    // Exposed methods

    #[inline]
    pub fn read(&self) -> ReadGuard<'_, T> {
        self.raw.acquire_read();
        self.read_guard()
    }

    #[inline]
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        if self.raw.try_acquire_read() {
            Some(self.read_guard())
        } else {
            None
        }
    }

    #[inline]
    pub fn try_read_for(&self, timeout: Duration) -> Option<ReadGuard<'_, T>> {
        if self.raw.try_acquire_read_for(timeout) {
            Some(self.read_guard())
        } else {
            None
        }
    }

    #[inline]
    pub fn write(&self) -> WriteGuard<'_, T> {
        self.raw.acquire_write();
        self.write_guard()
    }

    #[inline]
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        if self.raw.try_acquire_write() {
            Some(self.write_guard())
        } else {
            None
        }
    }

    #[inline]
    pub fn try_write_for(&self, timeout: Duration) -> Option<WriteGuard<'_, T>> {
        if self.raw.try_acquire_write_for(timeout) {
            Some(self.write_guard())
        } else {
            None
        }
    }

    ///
    /// Runs `f` with shared access. The lock is released even if `f` panics.
    #[inline]
    pub fn with_read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.read();
        f(&*guard)
    }

    ///
    /// Runs `f` with exclusive access. The lock is released even if `f` panics.
    #[inline]
    pub fn with_write<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.write();
        f(&mut *guard)
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        !self.state().is_unlocked()
    }
}

impl<T> RwLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            raw: RawRwLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_read() {
            Some(guard) => f.debug_struct("RwLock").field("data", &&*guard).finish(),
            None => f
                .debug_struct("RwLock")
                .field("data", &format_args!("<locked>"))
                .finish(),
        }
    }
}
