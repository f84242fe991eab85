//! Shared monotonic counter.
//!
//! The authoritative value lives behind a [`SpinLock`]; every increment also
//! publishes the new value to an atomic mirror while the lock is still held.
//! [`CounterView`] reads only the mirror, so observers never contend with
//! writers and always see a non-decreasing (possibly stale) value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::lock::SpinLock;

#[derive(Debug, Default)]
pub struct SharedCounter {
    value: SpinLock<u64>,
    published: AtomicU64,
}

impl SharedCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increments under the lock and returns the new value.
    ///
    /// The order of returned values is the lock acquisition order.
    pub fn increment(&self) -> u64 {
        let mut value = self.value.lock();
        *value += 1;
        let current = *value;
        self.published.store(current, Ordering::Release);
        current
    }

    /// Reads the authoritative value under the lock.
    pub fn get(&self) -> u64 {
        *self.value.lock()
    }

    /// Returns a read-only handle onto the published value.
    pub fn view(self: &Arc<Self>) -> CounterView {
        CounterView {
            counter: Arc::clone(self),
        }
    }
}

/// Read-only, lock-free view of a [`SharedCounter`].
#[derive(Debug, Clone)]
pub struct CounterView {
    counter: Arc<SharedCounter>,
}

impl CounterView {
    pub fn get(&self) -> u64 {
        self.counter.published.load(Ordering::Acquire)
    }
}
