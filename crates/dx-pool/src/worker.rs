//! Worker loop and thread naming.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dx_sync::{ProcessContext, SharedCounter, StopToken, WaitQueue};
use log::{error, info};
use parking_lot::Mutex;

const NAME_PREFIX: &str = "thread/";

/// Thread name of the worker at `index`.
pub fn worker_name(index: usize) -> String {
    format!("{NAME_PREFIX}{index}")
}

/// Recovers the index from a name produced by [`worker_name`].
pub fn parse_worker_index(name: &str) -> Option<usize> {
    name.strip_prefix(NAME_PREFIX)?.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Aborted,
}

/// Holds every worker back until the whole pool has been created.
#[derive(Debug)]
pub(crate) struct StartGate {
    state: Mutex<GateState>,
    queue: WaitQueue,
}

impl StartGate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState::Closed),
            queue: WaitQueue::new(),
        })
    }

    pub(crate) fn open(&self) {
        self.settle(GateState::Open);
    }

    pub(crate) fn abort(&self) {
        self.settle(GateState::Aborted);
    }

    fn settle(&self, to: GateState) {
        *self.state.lock() = to;
        self.queue.notify_all();
    }

    /// Returns `true` once opened, `false` if startup was aborted.
    pub(crate) fn pass(&self, ctx: &ProcessContext) -> bool {
        self.queue
            .wait(ctx, || *self.state.lock() != GateState::Closed);
        *self.state.lock() == GateState::Open
    }
}

pub(crate) struct Worker {
    pub(crate) period: Duration,
    pub(crate) counter: Arc<SharedCounter>,
    pub(crate) stop: Arc<StopToken>,
    pub(crate) gate: Arc<StartGate>,
}

impl Worker {
    /// Runs until stopped and returns the number of completed cycles.
    pub(crate) fn run(self) -> u64 {
        let ctx = ProcessContext::enter();
        if !self.gate.pass(&ctx) {
            return 0;
        }

        let name = thread::current().name().map(str::to_owned);
        let index = name.as_deref().and_then(parse_worker_index);
        if index.is_none() {
            error!("unable to get worker number from thread name {name:?}");
        }

        let mut cycles = 0;
        loop {
            let value = self.counter.increment();
            cycles += 1;
            info!("global counter: {value}");
            if let Some(index) = index {
                if index % 5 == 0 {
                    info!("=========================");
                }
                info!("thread number: {index}");
            }

            if self.stop.wait_timeout(&ctx, self.period).is_signaled() {
                info!("stopping thread '{}'", name.as_deref().unwrap_or("?"));
                return cycles;
            }
        }
    }
}
