//! Tasklets: coalescing deferred callbacks that run in atomic context.
//!
//! Each tasklet carries a small state machine guarded by its own spin lock:
//!
//! ```text
//!   Idle --schedule--> Pending --dequeue--> Running --return--> Idle
//!                                              |  ^
//!                                     schedule |  | return (re-queued
//!                                              v  |  as Pending)
//!                                        RunningPending
//! ```
//!
//! A tasklet is in an engine queue only while `Pending`, so a tasklet is never
//! executed by two engine threads at once, and repeated scheduling before it
//! runs collapses into a single invocation. The engine queues are fixed-size
//! `heapless` deques bounded by [`MAX_TASKLETS`], so scheduling never
//! allocates.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use dx_sync::{AtomicContext, ProcessContext, SpinLock, WaitQueue};
use heapless::Deque;
use log::{debug, error, info};
use parking_lot::Mutex;

use crate::error::{spawn_named, DeferError};

/// Maximum number of tasklets one engine can serve.
pub const MAX_TASKLETS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskletState {
    Idle,
    Pending,
    Running,
    /// Scheduled again while running; runs once more after returning.
    RunningPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Priority {
    Normal,
    High,
}

struct Slot {
    state: TaskletState,
    priority: Priority,
    killed: bool,
}

type TaskletCallback = Box<dyn FnMut(&AtomicContext) + Send>;

struct TaskletShared {
    label: String,
    slot: SpinLock<Slot>,
    callback: Mutex<TaskletCallback>,
    idle: WaitQueue,
    runs: AtomicU64,
    registered: Arc<AtomicUsize>,
}

impl TaskletShared {
    fn state(&self) -> TaskletState {
        self.slot.lock().state
    }
}

/// The registration slot is released once the last handle and any queue
/// entry are gone, so a queue never holds more than `MAX_TASKLETS` entries.
impl Drop for TaskletShared {
    fn drop(&mut self) {
        self.registered.fetch_sub(1, Ordering::AcqRel);
    }
}

type Queue = Deque<Arc<TaskletShared>, MAX_TASKLETS>;

struct Queues {
    high: Queue,
    normal: Queue,
    shutdown: bool,
}

impl Queues {
    fn pop(&mut self) -> Option<Arc<TaskletShared>> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    fn has_work(&self) -> bool {
        !self.high.is_empty() || !self.normal.is_empty()
    }
}

struct EngineShared {
    name: String,
    queues: SpinLock<Queues>,
    wake: WaitQueue,
    registered: Arc<AtomicUsize>,
}

impl EngineShared {
    fn enqueue(&self, tasklet: Arc<TaskletShared>, priority: Priority) {
        let rejected = {
            let mut queues = self.queues.lock();
            let queue = match priority {
                Priority::High => &mut queues.high,
                Priority::Normal => &mut queues.normal,
            };
            queue.push_back(tasklet).err()
        };

        match rejected {
            None => {
                self.wake.notify_one();
            }
            Some(tasklet) => {
                tasklet.slot.lock().state = TaskletState::Idle;
                tasklet.idle.notify_all();
                error!("tasklet queue of '{}' overflowed, dropped '{}'", self.name, tasklet.label);
            }
        }
    }

    fn wait_for_work(&self, ctx: &ProcessContext) -> bool {
        self.wake.wait(ctx, || {
            let queues = self.queues.lock();
            queues.shutdown || queues.has_work()
        });
        !self.queues.lock().shutdown
    }

    fn run(&self) {
        let ctx = ProcessContext::enter();
        while self.wait_for_work(&ctx) {
            loop {
                let next = self.queues.lock().pop();
                let Some(tasklet) = next else {
                    break;
                };
                self.execute(tasklet);
            }
        }
        debug!("tasklet engine '{}' executor exiting", self.name);
    }

    fn execute(&self, tasklet: Arc<TaskletShared>) {
        {
            let mut slot = tasklet.slot.lock();
            if slot.state != TaskletState::Pending {
                return;
            }
            slot.state = TaskletState::Running;
        }

        AtomicContext::enter(|atomic| {
            let mut callback = tasklet.callback.lock();
            (&mut **callback)(atomic);
        });
        tasklet.runs.fetch_add(1, Ordering::Relaxed);

        let requeue = {
            let mut slot = tasklet.slot.lock();
            if slot.state == TaskletState::RunningPending && !slot.killed {
                slot.state = TaskletState::Pending;
                Some(slot.priority)
            } else {
                slot.state = TaskletState::Idle;
                None
            }
        };

        if let Some(priority) = requeue {
            self.enqueue(Arc::clone(&tasklet), priority);
        }
        tasklet.idle.notify_all();
    }
}

/// Executor for tasklets. Starts `threads` engine threads.
pub struct TaskletEngine {
    shared: Arc<EngineShared>,
    threads: Vec<JoinHandle<()>>,
}

impl TaskletEngine {
    pub fn start(name: &str, threads: usize) -> Result<Self, DeferError> {
        let shared = Arc::new(EngineShared {
            name: name.to_owned(),
            queues: SpinLock::new(Queues {
                high: Deque::new(),
                normal: Deque::new(),
                shutdown: false,
            }),
            wake: WaitQueue::new(),
            registered: Arc::new(AtomicUsize::new(0)),
        });

        let mut engine = Self {
            shared,
            threads: Vec::with_capacity(threads),
        };
        for index in 0..threads.max(1) {
            let worker = Arc::clone(&engine.shared);
            let handle = spawn_named(format!("{name}/softirq/{index}"), move || worker.run())?;
            engine.threads.push(handle);
        }
        Ok(engine)
    }

    /// Registers a new tasklet in the `Idle` state.
    ///
    /// At most [`MAX_TASKLETS`] tasklets may be alive at once; dropping every
    /// handle to one frees its slot.
    pub fn tasklet<F>(&self, label: &str, callback: F) -> Result<Tasklet, DeferError>
    where
        F: FnMut(&AtomicContext) + Send + 'static,
    {
        let registered = self.shared.registered.fetch_add(1, Ordering::AcqRel);
        if registered >= MAX_TASKLETS {
            self.shared.registered.fetch_sub(1, Ordering::AcqRel);
            return Err(DeferError::TooManyTasklets(MAX_TASKLETS));
        }

        Ok(Tasklet {
            shared: Arc::new(TaskletShared {
                label: label.to_owned(),
                slot: SpinLock::new(Slot {
                    state: TaskletState::Idle,
                    priority: Priority::Normal,
                    killed: false,
                }),
                callback: Mutex::new(Box::new(callback)),
                idle: WaitQueue::new(),
                runs: AtomicU64::new(0),
                registered: Arc::clone(&self.shared.registered),
            }),
            engine: Arc::clone(&self.shared),
        })
    }

    /// Tasklets currently registered with this engine.
    pub fn registered(&self) -> usize {
        self.shared.registered.load(Ordering::Acquire)
    }

    /// Stops and joins the engine threads. Returns the number of queue
    /// entries that never ran.
    pub fn shutdown(mut self, _ctx: &ProcessContext) -> usize {
        let dropped = self.stop();
        info!("tasklet engine '{}' shut down", self.shared.name);
        dropped
    }

    fn stop(&mut self) -> usize {
        let mut stranded = Vec::new();
        {
            let mut queues = self.shared.queues.lock();
            queues.shutdown = true;
            while let Some(tasklet) = queues.pop() {
                stranded.push(tasklet);
            }
        }
        self.shared.wake.notify_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        let mut dropped = 0;
        for tasklet in stranded {
            let mut slot = tasklet.slot.lock();
            if slot.state == TaskletState::Pending {
                slot.state = TaskletState::Idle;
                dropped += 1;
            }
            drop(slot);
            tasklet.idle.notify_all();
        }
        if dropped > 0 {
            debug!("tasklet engine '{}' dropped {dropped} pending tasklet(s)", self.shared.name);
        }
        dropped
    }
}

impl Drop for TaskletEngine {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}

/// Handle to a registered tasklet.
#[derive(Clone)]
pub struct Tasklet {
    shared: Arc<TaskletShared>,
    engine: Arc<EngineShared>,
}

impl Tasklet {
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Requests a run on the normal queue.
    ///
    /// Returns `false` when the request was coalesced with one already
    /// pending, or when the tasklet has been killed.
    pub fn schedule(&self) -> bool {
        self.schedule_with(Priority::Normal)
    }

    /// Requests a run on the high-priority queue, drained before the normal
    /// one.
    pub fn schedule_hi(&self) -> bool {
        self.schedule_with(Priority::High)
    }

    fn schedule_with(&self, priority: Priority) -> bool {
        let enqueue = {
            let mut slot = self.shared.slot.lock();
            if slot.killed {
                return false;
            }
            match slot.state {
                TaskletState::Idle => {
                    slot.state = TaskletState::Pending;
                    slot.priority = priority;
                    true
                }
                TaskletState::Running => {
                    slot.state = TaskletState::RunningPending;
                    slot.priority = priority;
                    return true;
                }
                TaskletState::Pending | TaskletState::RunningPending => return false,
            }
        };

        if enqueue {
            self.engine.enqueue(Arc::clone(&self.shared), priority);
        }
        enqueue
    }

    /// Prevents any future run and waits for an in-flight one to finish.
    ///
    /// A pending request is discarded. Returns `true` if the tasklet was
    /// pending or running when killed.
    pub fn kill(&self, ctx: &ProcessContext) -> bool {
        let busy = {
            let mut slot = self.shared.slot.lock();
            slot.killed = true;
            let busy = slot.state != TaskletState::Idle;
            slot.state = match slot.state {
                TaskletState::Pending => TaskletState::Idle,
                TaskletState::RunningPending => TaskletState::Running,
                other => other,
            };
            busy
        };

        self.shared
            .idle
            .wait(ctx, || self.shared.state() == TaskletState::Idle);
        debug!("tasklet '{}' killed (busy: {busy})", self.shared.label);
        busy
    }

    pub fn state(&self) -> TaskletState {
        self.shared.state()
    }

    pub fn is_killed(&self) -> bool {
        self.shared.slot.lock().killed
    }

    /// Number of completed invocations.
    pub fn run_count(&self) -> u64 {
        self.shared.runs.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Tasklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tasklet")
            .field("label", &self.shared.label)
            .field("state", &self.state())
            .field("runs", &self.run_count())
            .finish()
    }
}
