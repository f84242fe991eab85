//! Spin lock for short critical sections.
//!
//! Wraps `spin::Mutex` so that holding the lock also counts as being in
//! atomic context: a blocking primitive reached while the guard is alive trips
//! [`might_sleep`](crate::might_sleep) in debug builds.
//!
//! The lock is not reentrant. Locking it twice from the same path spins
//! forever.

use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::context::AtomicSection;

pub struct SpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    /// Creates a new lock protecting the given value.
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    /// Acquires the lock, spinning until it becomes available.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let section = AtomicSection::enter();
        SpinLockGuard {
            inner: self.inner.lock(),
            _section: section,
        }
    }

    /// Acquires the lock if it is free.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let section = AtomicSection::enter();
        self.inner.try_lock().map(|inner| SpinLockGuard {
            inner,
            _section: section,
        })
    }

    /// Consumes the lock and returns the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(value) => f.debug_struct("SpinLock").field("data", &*value).finish(),
            None => f.write_str("SpinLock { <locked> }"),
        }
    }
}

/// Guard returned by [`SpinLock::lock`].
///
/// The spin guard is released before the atomic section ends (field order).
pub struct SpinLockGuard<'a, T> {
    inner: spin::MutexGuard<'a, T>,
    _section: AtomicSection,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}
