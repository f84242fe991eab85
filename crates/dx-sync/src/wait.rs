//! Wait queue for parking process-context threads on a condition.
//!
//! Waiters re-check their predicate while holding the queue's internal lock,
//! and notifiers take that lock before waking. A state change made before a
//! `notify_*` call is therefore never missed.
//!
//! Notifiers never park: the lock is only held while a waiter evaluates its
//! predicate, so they spin on it. That makes `notify_*` usable from atomic
//! context.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::context::{might_sleep, ProcessContext};

/// Result of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The predicate became true.
    Signaled,
    /// The timeout elapsed with the predicate still false.
    TimedOut,
}

impl WaitOutcome {
    pub fn is_signaled(self) -> bool {
        matches!(self, Self::Signaled)
    }
}

/// Condition/wait mechanism. Parked threads consume no CPU.
#[derive(Default)]
pub struct WaitQueue {
    lock: Mutex<()>,
    cond: Condvar,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `condition` returns `true` or `timeout` elapses.
    ///
    /// `condition` runs with the queue's internal lock held and must not
    /// touch this queue.
    pub fn wait_timeout<F>(
        &self,
        _ctx: &ProcessContext,
        mut condition: F,
        timeout: Duration,
    ) -> WaitOutcome
    where
        F: FnMut() -> bool,
    {
        might_sleep();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_forever(&mut condition);
            return WaitOutcome::Signaled;
        };

        let mut guard = self.lock.lock();
        loop {
            if condition() {
                return WaitOutcome::Signaled;
            }
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                return if condition() {
                    WaitOutcome::Signaled
                } else {
                    WaitOutcome::TimedOut
                };
            }
        }
    }

    /// Blocks until `condition` returns `true`.
    pub fn wait<F>(&self, _ctx: &ProcessContext, mut condition: F)
    where
        F: FnMut() -> bool,
    {
        might_sleep();
        self.wait_forever(&mut condition);
    }

    fn wait_forever(&self, condition: &mut dyn FnMut() -> bool) {
        let mut guard = self.lock.lock();
        while !condition() {
            self.cond.wait(&mut guard);
        }
    }

    /// Wakes one parked thread. Callable from any context.
    pub fn notify_one(&self) -> bool {
        let _guard = self.spin_lock();
        self.cond.notify_one()
    }

    /// Wakes every parked thread and returns how many were woken.
    pub fn notify_all(&self) -> usize {
        let _guard = self.spin_lock();
        self.cond.notify_all()
    }

    fn spin_lock(&self) -> MutexGuard<'_, ()> {
        loop {
            if let Some(guard) = self.lock.try_lock() {
                return guard;
            }
            core::hint::spin_loop();
        }
    }
}

impl core::fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("WaitQueue")
    }
}
