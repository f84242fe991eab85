//! Work queues: deferred callbacks that run in process context and may block.
//!
//! A [`WorkQueue`] owns one or more executor threads. Items are either
//! reusable [`Work`] handles, which carry a `queued` bit so that queueing an
//! already queued item is a no-op, or one-shot closures passed to
//! [`WorkQueue::queue_fn`]. Delayed items wait in a deadline heap and are
//! moved to the ready queue once due.
//!
//! [`WorkQueue::queue`], [`WorkQueue::queue_delayed`] and
//! [`WorkQueue::cancel_delayed`] may be called from atomic context: `Work`
//! items live in fixed-capacity queues behind a [`SpinLock`], so queueing
//! one never allocates or sleeps. Closures are boxed and therefore can only
//! be queued from process context.
//!
//! A failing item (an `Err` result or a panic) is logged and counted; the
//! executor carries on with the next item.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{TryReserveError, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use dx_sync::{ProcessContext, SpinLock, WaitQueue};
use heapless::binary_heap::{BinaryHeap, Min};
use heapless::Deque;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::{spawn_named, DeferError};

/// Failure reported by a work callback.
#[derive(Error, Debug)]
pub enum WorkError {
    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    #[error("{0}")]
    Failed(String),
}

pub type WorkResult = Result<(), WorkError>;

/// Maximum number of `Work` items one queue holds at once in each of its
/// ready and delayed queues.
pub const MAX_QUEUED_WORK: usize = 64;

type WorkCallback = Box<dyn FnMut(&ProcessContext) -> WorkResult + Send>;
type OnceCallback = Box<dyn FnOnce(&ProcessContext) -> WorkResult + Send>;

struct WorkShared {
    label: String,
    queued: AtomicBool,
    callback: Mutex<WorkCallback>,
    runs: AtomicU64,
}

/// Reusable work item.
#[derive(Clone)]
pub struct Work {
    shared: Arc<WorkShared>,
}

impl Work {
    pub fn new<F>(label: &str, callback: F) -> Self
    where
        F: FnMut(&ProcessContext) -> WorkResult + Send + 'static,
    {
        Self {
            shared: Arc::new(WorkShared {
                label: label.to_owned(),
                queued: AtomicBool::new(false),
                callback: Mutex::new(Box::new(callback)),
                runs: AtomicU64::new(0),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// `true` from queueing until an executor picks the item up.
    pub fn is_queued(&self) -> bool {
        self.shared.queued.load(Ordering::Acquire)
    }

    /// Number of invocations that returned, successfully or not.
    pub fn run_count(&self) -> u64 {
        self.shared.runs.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Work")
            .field("label", &self.shared.label)
            .field("queued", &self.is_queued())
            .field("runs", &self.run_count())
            .finish()
    }
}

enum Job {
    Item(Arc<WorkShared>),
    Once { label: String, callback: OnceCallback },
}

impl Job {
    fn label(&self) -> &str {
        match self {
            Self::Item(work) => &work.label,
            Self::Once { label, .. } => label,
        }
    }

    fn run(self, ctx: &ProcessContext) -> WorkResult {
        match self {
            Self::Item(work) => {
                work.queued.store(false, Ordering::Release);
                let result = {
                    let mut callback = work.callback.lock();
                    (&mut **callback)(ctx)
                };
                work.runs.fetch_add(1, Ordering::Relaxed);
                result
            }
            Self::Once { callback, .. } => callback(ctx),
        }
    }
}

struct Delayed {
    due: Instant,
    seq: u64,
    work: Arc<WorkShared>,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Counters kept by a [`WorkQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkQueueStats {
    pub queued: u64,
    pub coalesced: u64,
    /// `Work` items turned away by a full or stopped queue.
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
}

/// Outcome of [`WorkQueue::destroy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items that ran to completion, successfully or not.
    pub completed: u64,
    /// Items among `completed` that failed or panicked.
    pub failed: u64,
    /// Queued items discarded without running.
    pub dropped: u64,
}

enum Refusal {
    Full(Arc<WorkShared>),
    ShutDown,
}

type Stranded = heapless::Vec<Arc<WorkShared>, { 2 * MAX_QUEUED_WORK }>;

struct Inner {
    ready: Deque<Arc<WorkShared>, MAX_QUEUED_WORK>,
    delayed: BinaryHeap<Delayed, Min, MAX_QUEUED_WORK>,
    seq: u64,
    running: usize,
    shutdown: bool,
    stats: WorkQueueStats,
}

impl Inner {
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|head| head.due <= now) && !self.ready.is_full() {
            if let Some(entry) = self.delayed.pop() {
                let _ = self.ready.push_back(entry.work);
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.peek().map(|entry| entry.due)
    }

    /// Empties both queues, due or not.
    fn take_all(&mut self) -> Stranded {
        let mut stranded = Stranded::new();
        while let Some(work) = self.ready.pop_front() {
            let _ = stranded.push(work);
        }
        while let Some(entry) = self.delayed.pop() {
            let _ = stranded.push(entry.work);
        }
        stranded
    }
}

struct QueueShared {
    name: String,
    inner: SpinLock<Inner>,
    closures: Mutex<VecDeque<Job>>,
    work_ready: WaitQueue,
    idle: WaitQueue,
    executors: Mutex<Vec<ThreadId>>,
}

impl QueueShared {
    /// `true` if an executor waiting for `waiting_for` should wake up.
    fn has_work(&self, waiting_for: Option<Instant>) -> bool {
        let wake = {
            let inner = self.inner.lock();
            inner.shutdown
                || !inner.ready.is_empty()
                || match (inner.next_due(), waiting_for) {
                    (Some(due), Some(until)) => due < until || due <= Instant::now(),
                    (Some(_), None) => true,
                    (None, _) => false,
                }
        };
        wake || !self.closures.lock().is_empty()
    }

    /// No item is ready, running, or due at `now`.
    fn is_idle(&self, now: Instant) -> bool {
        if !self.closures.lock().is_empty() {
            return false;
        }
        let inner = self.inner.lock();
        inner.ready.is_empty()
            && inner.running == 0
            && inner.next_due().map_or(true, |due| due > now)
    }

    fn next_job(&self, ctx: &ProcessContext) -> Option<Job> {
        loop {
            let next_due = {
                let mut inner = self.inner.lock();
                if inner.shutdown {
                    return None;
                }
                inner.promote_due(Instant::now());
                if let Some(work) = inner.ready.pop_front() {
                    inner.running += 1;
                    return Some(Job::Item(work));
                }
                inner.next_due()
            };
            {
                let mut closures = self.closures.lock();
                if let Some(job) = closures.pop_front() {
                    self.inner.lock().running += 1;
                    return Some(job);
                }
            }
            match next_due {
                Some(due) => {
                    let timeout = due.saturating_duration_since(Instant::now());
                    self.work_ready.wait_timeout(ctx, || self.has_work(Some(due)), timeout);
                }
                None => self.work_ready.wait(ctx, || self.has_work(None)),
            }
        }
    }

    fn run(&self) {
        let ctx = ProcessContext::enter();
        while let Some(job) = self.next_job(&ctx) {
            let label = job.label().to_owned();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run(&ctx)));

            {
                let mut inner = self.inner.lock();
                inner.running -= 1;
                inner.stats.completed += 1;
                match &outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => inner.stats.failed += 1,
                    Err(_) => {
                        inner.stats.failed += 1;
                        inner.stats.panicked += 1;
                    }
                }
            }

            match outcome {
                Ok(Ok(())) => debug!("work '{label}' on '{}' done", self.name),
                Ok(Err(err)) => error!("work '{label}' on '{}' failed: {err}", self.name),
                Err(_) => error!("work '{label}' on '{}' panicked, executor continues", self.name),
            }
            self.idle.notify_all();
        }
        debug!("work queue '{}' executor exiting", self.name);
    }

    fn on_executor(&self) -> bool {
        let current = thread::current().id();
        self.executors.lock().contains(&current)
    }

    /// Discards every queued item and clears the `queued` bit of each `Work`.
    fn drop_queued(&self) -> u64 {
        let closures = std::mem::take(&mut *self.closures.lock());
        let stranded = self.inner.lock().take_all();
        for work in &stranded {
            work.queued.store(false, Ordering::Release);
        }
        (stranded.len() + closures.len()) as u64
    }
}

impl QueueShared {
    fn queue(&self, work: &Work) -> bool {
        if !self.claim(work) {
            return false;
        }
        let pushed = {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                inner.stats.rejected += 1;
                Err(Refusal::ShutDown)
            } else {
                match inner.ready.push_back(Arc::clone(&work.shared)) {
                    Ok(()) => {
                        inner.stats.queued += 1;
                        Ok(())
                    }
                    Err(rejected) => {
                        inner.stats.rejected += 1;
                        Err(Refusal::Full(rejected))
                    }
                }
            }
        };
        self.admitted(work, pushed)
    }

    fn queue_delayed(&self, work: &Work, delay: Duration) -> bool {
        if delay.is_zero() {
            return self.queue(work);
        }
        if !self.claim(work) {
            return false;
        }
        let due = Instant::now() + delay;
        let pushed = {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                inner.stats.rejected += 1;
                Err(Refusal::ShutDown)
            } else {
                inner.seq += 1;
                let entry = Delayed {
                    due,
                    seq: inner.seq,
                    work: Arc::clone(&work.shared),
                };
                match inner.delayed.push(entry) {
                    Ok(()) => {
                        inner.stats.queued += 1;
                        Ok(())
                    }
                    Err(rejected) => {
                        inner.stats.rejected += 1;
                        Err(Refusal::Full(rejected.work))
                    }
                }
            }
        };
        self.admitted(work, pushed)
    }

    fn claim(&self, work: &Work) -> bool {
        let claimed = work
            .shared
            .queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !claimed {
            self.inner.lock().stats.coalesced += 1;
        }
        claimed
    }

    /// Wakes an executor for a pushed item, or releases the claim of one the
    /// queue turned away.
    fn admitted(&self, work: &Work, pushed: Result<(), Refusal>) -> bool {
        let refusal = match pushed {
            Ok(()) => {
                self.work_ready.notify_one();
                return true;
            }
            Err(refusal) => refusal,
        };
        work.shared.queued.store(false, Ordering::Release);
        match refusal {
            Refusal::Full(rejected) => {
                drop(rejected);
                error!("work queue '{}' is full, '{}' rejected", self.name, work.shared.label);
            }
            Refusal::ShutDown => {
                warn!("work queue '{}' is shut down, '{}' rejected", self.name, work.shared.label);
            }
        }
        false
    }

    fn cancel_delayed(&self, work: &Work) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let mut kept = heapless::Vec::<Delayed, MAX_QUEUED_WORK>::new();
            let mut removed = None;
            while let Some(entry) = inner.delayed.pop() {
                if removed.is_none() && Arc::ptr_eq(&entry.work, &work.shared) {
                    removed = Some(entry);
                } else {
                    let _ = kept.push(entry);
                }
            }
            for entry in kept {
                let _ = inner.delayed.push(entry);
            }
            removed
        };

        match removed {
            Some(_) => {
                work.shared.queued.store(false, Ordering::Release);
                debug!("delayed work '{}' cancelled", work.shared.label);
                true
            }
            None => false,
        }
    }
}

/// Executor for blockable deferred work.
pub struct WorkQueue {
    shared: Arc<QueueShared>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkQueue {
    pub fn start(name: &str, threads: usize) -> Result<Self, DeferError> {
        let shared = Arc::new(QueueShared {
            name: name.to_owned(),
            inner: SpinLock::new(Inner {
                ready: Deque::new(),
                delayed: BinaryHeap::new(),
                seq: 0,
                running: 0,
                shutdown: false,
                stats: WorkQueueStats::default(),
            }),
            closures: Mutex::new(VecDeque::new()),
            work_ready: WaitQueue::new(),
            idle: WaitQueue::new(),
            executors: Mutex::new(Vec::new()),
        });

        let mut queue = Self {
            shared,
            threads: Vec::with_capacity(threads),
        };
        for index in 0..threads.max(1) {
            let worker = Arc::clone(&queue.shared);
            let handle = spawn_named(format!("{name}/kworker/{index}"), move || worker.run())?;
            queue.shared.executors.lock().push(handle.thread().id());
            queue.threads.push(handle);
        }
        info!("work queue '{name}' started with {} executor(s)", queue.threads.len());
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Queues `work` for immediate execution.
    ///
    /// Returns `false` if it was already queued (immediately or delayed).
    /// Also returns `false`, counting the item as rejected, when the ready
    /// queue already holds [`MAX_QUEUED_WORK`] items or the executors have
    /// stopped.
    pub fn queue(&self, work: &Work) -> bool {
        self.shared.queue(work)
    }

    /// Queues `work` to run no earlier than `delay` from now.
    ///
    /// Returns `false` if it was already queued or the delayed heap is full.
    pub fn queue_delayed(&self, work: &Work, delay: Duration) -> bool {
        self.shared.queue_delayed(work, delay)
    }

    /// Queues a one-shot closure. Never coalesced.
    ///
    /// The closure is boxed, so this needs process context.
    pub fn queue_fn<F>(&self, _ctx: &ProcessContext, label: &str, callback: F)
    where
        F: FnOnce(&ProcessContext) -> WorkResult + Send + 'static,
    {
        let job = Job::Once {
            label: label.to_owned(),
            callback: Box::new(callback),
        };
        {
            let mut closures = self.shared.closures.lock();
            closures.push_back(job);
            self.shared.inner.lock().stats.queued += 1;
        }
        self.shared.work_ready.notify_one();
    }

    /// Removes `work` from the delayed heap if it has not become due yet.
    pub fn cancel_delayed(&self, work: &Work) -> bool {
        self.shared.cancel_delayed(work)
    }

    /// Returns a handle that queues `Work` items without owning the executors.
    pub fn handle(&self) -> WorkQueueHandle {
        WorkQueueHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Waits until the ready queue is empty and no item is executing.
    ///
    /// Delayed items that are already due count as ready; those still
    /// waiting for their deadline are not waited for. Calling this from one
    /// of the queue's own executors would deadlock, so it only logs a
    /// warning and returns.
    pub fn flush(&self, ctx: &ProcessContext) {
        if self.shared.on_executor() {
            warn!("flush of '{}' called from its own executor, skipped", self.shared.name);
            return;
        }

        let started = Instant::now();
        self.shared.work_ready.notify_all();
        self.shared.idle.wait(ctx, || self.shared.is_idle(started));
    }

    pub fn pending_delayed(&self) -> usize {
        self.shared.inner.lock().delayed.len()
    }

    pub fn stats(&self) -> WorkQueueStats {
        self.shared.inner.lock().stats
    }

    /// Drops delayed items that are not due, drains everything else, then
    /// stops and joins the executors.
    ///
    /// Items queued by callbacks that run during the drain are dropped as
    /// well once the executors have stopped.
    pub fn destroy(mut self, ctx: &ProcessContext) -> DrainReport {
        let not_due = {
            let mut inner = self.shared.inner.lock();
            inner.promote_due(Instant::now());
            let mut stranded = Stranded::new();
            while let Some(entry) = inner.delayed.pop() {
                let _ = stranded.push(entry.work);
            }
            stranded
        };
        for work in &not_due {
            work.queued.store(false, Ordering::Release);
        }
        let mut dropped = not_due.len() as u64;
        drop(not_due);
        if dropped > 0 {
            warn!(
                "work queue '{}' dropped {dropped} delayed item(s) still in use",
                self.shared.name
            );
        }

        self.flush(ctx);
        self.stop();

        let requeued = self.shared.drop_queued();
        if requeued > 0 {
            warn!(
                "work queue '{}' dropped {requeued} item(s) queued during the drain",
                self.shared.name
            );
            dropped += requeued;
        }

        let stats = self.shared.inner.lock().stats;
        info!(
            "work queue '{}' destroyed: {} completed, {} failed, {dropped} dropped",
            self.shared.name, stats.completed, stats.failed
        );
        DrainReport {
            completed: stats.completed,
            failed: stats.failed,
            dropped,
        }
    }

    fn stop(&mut self) {
        self.shared.inner.lock().shutdown = true;
        self.shared.work_ready.notify_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.shared.name)
            .field("executors", &self.threads.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Cloneable handle for queueing `Work` items from other contexts.
///
/// Items queued through a handle while [`WorkQueue::destroy`] drains are
/// dropped by it; once the executors have stopped, queueing is refused.
#[derive(Clone)]
pub struct WorkQueueHandle {
    shared: Arc<QueueShared>,
}

impl WorkQueueHandle {
    pub fn queue(&self, work: &Work) -> bool {
        self.shared.queue(work)
    }

    pub fn queue_delayed(&self, work: &Work, delay: Duration) -> bool {
        self.shared.queue_delayed(work, delay)
    }

    pub fn cancel_delayed(&self, work: &Work) -> bool {
        self.shared.cancel_delayed(work)
    }
}

impl fmt::Debug for WorkQueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueueHandle")
            .field("name", &self.shared.name)
            .finish()
    }
}
