//! Cooperative cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::ProcessContext;
use crate::wait::{WaitOutcome, WaitQueue};

/// Stop flag paired with a wait queue.
///
/// Loops wait on the token between iterations; [`StopToken::request_stop`]
/// wakes every waiter immediately instead of letting it sleep out its period.
#[derive(Debug, Default)]
pub struct StopToken {
    stopped: AtomicBool,
    queue: WaitQueue,
}

impl StopToken {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets the flag and wakes all waiters. Returns `false` if already set.
    pub fn request_stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        self.queue.notify_all();
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Waits up to `period`; [`WaitOutcome::Signaled`] means stop was requested.
    pub fn wait_timeout(&self, ctx: &ProcessContext, period: Duration) -> WaitOutcome {
        self.queue.wait_timeout(ctx, || self.is_stopped(), period)
    }
}
