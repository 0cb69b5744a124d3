///
/// Shared/exclusive lock operations.
///
/// # Safety
///
/// Implementors must never admit a writer while any reader or another writer holds
/// the lock. The scoped helpers hand out no data, they only pair acquisition with a
/// release that runs on every exit path, unwinding included.
pub unsafe trait RwLockIface {
    fn acquire_read(&self);

    fn try_acquire_read(&self) -> bool;

    fn release_read(&self) -> bool;

    fn acquire_write(&self);

    fn try_acquire_write(&self) -> bool;

    fn release_write(&self) -> bool;

    /// Runs `f` while holding the lock in shared mode.
    fn with_read<R, F>(&self, f: F) -> R
    where
        Self: Sized,
        F: FnOnce() -> R,
    {
        self.acquire_read();
        let _release = Release {
            lock: self,
            exclusive: false,
        };
        f()
    }

    /// Runs `f` while holding the lock in exclusive mode.
    fn with_write<R, F>(&self, f: F) -> R
    where
        Self: Sized,
        F: FnOnce() -> R,
    {
        self.acquire_write();
        let _release = Release {
            lock: self,
            exclusive: true,
        };
        f()
    }
}

struct Release<'a, L: RwLockIface> {
    lock: &'a L,
    exclusive: bool,
}

impl<'a, L: RwLockIface> Drop for Release<'a, L> {
    fn drop(&mut self) {
        if self.exclusive {
            self.lock.release_write();
        } else {
            self.lock.release_read();
        }
    }
}
