//! Execution-context tokens.
//!
//! The runtime distinguishes two kinds of execution context:
//!
//! - **atomic**: timer callbacks, tasklet callbacks and hard IRQ phases. Code
//!   here must return in bounded time and must not sleep or wait.
//! - **process**: work items, threaded IRQ phases and pool workers. Code here
//!   may block.
//!
//! Each context is represented by a zero-sized, `!Send` token. Blocking APIs
//! demand `&ProcessContext`; atomic callbacks are only handed
//! `&AtomicContext`, so they have nothing to pass to a blocking call.
//!
//! A per-thread depth counter additionally tracks whether the current thread
//! is inside an atomic section (an [`AtomicContext::enter`] scope or a held
//! [`SpinLock`](crate::SpinLock)). [`might_sleep`] asserts on it in debug
//! builds and logs a warning in release builds.

use core::cell::Cell;
use core::marker::PhantomData;
use std::time::Duration;

thread_local! {
    static ATOMIC_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Returns `true` while the current thread is inside an atomic section.
pub fn in_atomic() -> bool {
    ATOMIC_DEPTH.with(|depth| depth.get() > 0)
}

/// Check placed at the top of every blocking primitive.
///
/// Panics in debug builds when called from atomic context. Release builds
/// log the caller's location and carry on.
#[track_caller]
pub fn might_sleep() {
    debug_assert!(
        !in_atomic(),
        "blocking operation attempted from atomic context"
    );
    #[cfg(not(debug_assertions))]
    if in_atomic() {
        let caller = core::panic::Location::caller();
        log::warn!("blocking operation attempted from atomic context at {caller}");
    }
}

/// Marks the current thread as atomic until dropped.
pub(crate) struct AtomicSection {
    _not_send: PhantomData<*const ()>,
}

impl AtomicSection {
    pub(crate) fn enter() -> Self {
        ATOMIC_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for AtomicSection {
    fn drop(&mut self) {
        ATOMIC_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Capability token for non-blocking execution.
pub struct AtomicContext {
    _section: AtomicSection,
}

impl AtomicContext {
    /// Runs `f` inside an atomic section.
    ///
    /// Used by the runtime's service threads (timer base, tasklet engine, IRQ
    /// lines) to invoke user callbacks.
    pub fn enter<R>(f: impl FnOnce(&AtomicContext) -> R) -> R {
        let ctx = AtomicContext {
            _section: AtomicSection::enter(),
        };
        f(&ctx)
    }
}

/// Capability token for blockable execution.
pub struct ProcessContext {
    _not_send: PhantomData<*const ()>,
}

impl ProcessContext {
    /// Claims process context for the current thread.
    ///
    /// # Panics
    ///
    /// In debug builds, panics when called inside an atomic section.
    #[track_caller]
    pub fn enter() -> Self {
        might_sleep();
        Self {
            _not_send: PhantomData,
        }
    }
}

impl core::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ProcessContext")
    }
}

impl core::fmt::Debug for AtomicContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("AtomicContext")
    }
}

/// Sleeps the calling thread. Only callable from process context.
pub fn msleep(_ctx: &ProcessContext, duration: Duration) {
    might_sleep();
    std::thread::sleep(duration);
}
