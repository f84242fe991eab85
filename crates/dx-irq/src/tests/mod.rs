
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use dx_sync::{in_atomic, msleep, AtomicContext, ProcessContext};

use crate::dispatcher::{IrqReturn, ThreadedHandler, ThreadedIrqReturn};
use crate::line::Edge;

pub(crate) fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Handler that records both phases and can be slowed down.
#[derive(Default)]
pub(crate) struct Recorder {
    pub hard: AtomicU64,
    pub threaded: AtomicU64,
    pub hard_atomic: AtomicBool,
    pub threaded_atomic: AtomicBool,
    pub hard_spin: Option<Duration>,
    pub threaded_sleep: Option<Duration>,
    pub hard_entered: AtomicBool,
    pub hard_finished: AtomicBool,
}

impl ThreadedHandler for Recorder {
    fn handle(&self, _edge: Edge, _ctx: &AtomicContext) -> ThreadedIrqReturn {
        self.hard_entered.store(true, Ordering::SeqCst);
        self.hard_atomic.store(in_atomic(), Ordering::SeqCst);
        if let Some(spin) = self.hard_spin {
            let until = Instant::now() + spin;
            while Instant::now() < until {
                std::hint::spin_loop();
            }
        }
        self.hard.fetch_add(1, Ordering::SeqCst);
        self.hard_finished.store(true, Ordering::SeqCst);
        ThreadedIrqReturn::WakeThread
    }

    fn handle_threaded(&self, ctx: &ProcessContext) -> IrqReturn {
        self.threaded_atomic.store(in_atomic(), Ordering::SeqCst);
        if let Some(delay) = self.threaded_sleep {
            msleep(ctx, delay);
        }
        self.threaded.fetch_add(1, Ordering::SeqCst);
        IrqReturn::Handled
    }
}
