//! # dx-sync
//!
//! Synchronization layer shared by every execution context of the DX runtime.
//!
//! ## Module Overview
//! - [`context`] – Atomic/process execution-context tokens and `msleep`.
//! - [`lock`]    – Non-reentrant spin lock usable from atomic context.
//! - [`wait`]    – Wait queue with predicate, timeout and notify.
//! - [`counter`] – Lock-guarded monotonic counter with a read-only view.
//! - [`stop`]    – Cooperative cancellation token (flag + wait queue).
//!
//! Blocking operations across the workspace take a [`ProcessContext`]
//! argument, and callbacks that run in atomic context only ever receive an
//! [`AtomicContext`]. A callback written against the wrong context does not
//! type-check.

pub mod context;
pub mod counter;
pub mod lock;
pub mod stop;
pub mod wait;

pub use context::{in_atomic, might_sleep, msleep, AtomicContext, ProcessContext};
pub use counter::{CounterView, SharedCounter};
pub use lock::{SpinLock, SpinLockGuard};
pub use stop::StopToken;
pub use wait::{WaitOutcome, WaitQueue};

#[cfg(test)]
mod tests;
