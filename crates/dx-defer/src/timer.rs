//! High-resolution timers.
//!
//! A [`TimerBase`] owns one service thread that sleeps until the earliest
//! armed deadline and runs the expired timer's callback inside an
//! [`AtomicContext`]. Timers are one-shot per fire: after each invocation the
//! callback's [`TimerRestart`] answer, the fire policy and any pending cancel
//! decide whether the timer is queued again.
//!
//! Pending deadlines are heap entries tagged with the timer's generation.
//! Re-arming or cancelling bumps the generation, which turns any queued entry
//! stale instead of removing it from the heap.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dx_sync::{AtomicContext, ProcessContext, SpinLock, WaitQueue};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::error::{spawn_named, DeferError};

/// How many times an armed timer may fire before it disarms itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirePolicy {
    Once,
    /// At most `n` invocations; the last one never restarts.
    Times(u32),
    /// Until the callback returns [`TimerRestart::NoRestart`] or the timer is
    /// cancelled.
    Forever,
}

impl FirePolicy {
    fn budget(self) -> Option<u32> {
        match self {
            Self::Once => Some(1),
            Self::Times(n) => Some(n),
            Self::Forever => None,
        }
    }
}

/// Callback verdict, the equivalent of `HRTIMER_RESTART`/`HRTIMER_NORESTART`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRestart {
    Restart,
    NoRestart,
}

/// Result of a draining [`HrTimer::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelStatus {
    /// The timer was armed or its callback was running.
    WasActive,
    Idle,
}

impl CancelStatus {
    pub fn was_active(self) -> bool {
        matches!(self, Self::WasActive)
    }
}

/// Result of a non-waiting [`HrTimer::try_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryCancel {
    Cancelled,
    Inactive,
    /// The callback is executing; nothing was changed.
    Running,
}

/// View handed to a timer callback.
pub struct TimerContext<'a> {
    atomic: &'a AtomicContext,
    now: Instant,
    expires: Instant,
    fires: u64,
    next: Option<Instant>,
}

impl<'a> TimerContext<'a> {
    pub fn atomic(&self) -> &'a AtomicContext {
        self.atomic
    }

    /// Time at which the callback was entered.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Deadline this invocation was armed for.
    pub fn expires(&self) -> Instant {
        self.expires
    }

    /// Number of invocations since the timer was created, this one included.
    pub fn fire_count(&self) -> u64 {
        self.fires
    }

    /// Moves the next deadline forward by whole `interval`s until it lies
    /// after `now`. Returns the number of intervals skipped over.
    pub fn forward_now(&mut self, interval: Duration) -> u64 {
        let (next, overruns) = forward(self.expires, self.now, interval);
        self.next = Some(next);
        overruns
    }

    /// Schedules the next fire exactly one `interval` after this deadline,
    /// even if that instant has already passed.
    pub fn forward(&mut self, interval: Duration) {
        self.next = Some(self.expires + interval);
    }

    /// Requests the next fire at an absolute deadline.
    pub fn rearm_at(&mut self, deadline: Instant) {
        self.next = Some(deadline);
    }
}

fn forward(expires: Instant, now: Instant, interval: Duration) -> (Instant, u64) {
    if now < expires {
        return (expires, 0);
    }
    let step = interval.as_nanos().max(1);
    let overruns = (now - expires).as_nanos() / step + 1;
    let advance = u64::try_from(step * overruns).unwrap_or(u64::MAX);
    let overruns = u64::try_from(overruns).unwrap_or(u64::MAX);
    (expires + Duration::from_nanos(advance), overruns)
}

type TimerCallback = Box<dyn FnMut(&mut TimerContext<'_>) -> TimerRestart + Send>;

struct TimerState {
    armed: bool,
    running: bool,
    cancelling: bool,
    generation: u64,
    expires: Instant,
    period: Duration,
    remaining: Option<u32>,
    fires: u64,
}

struct TimerShared {
    label: String,
    state: SpinLock<TimerState>,
    callback: Mutex<TimerCallback>,
    idle: WaitQueue,
}

struct Entry {
    expires: Instant,
    seq: u64,
    generation: u64,
    timer: Arc<TimerShared>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.expires, self.seq).cmp(&(other.expires, other.seq))
    }
}

#[derive(Default)]
struct BaseQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    seq: u64,
    shutdown: bool,
}

struct BaseShared {
    name: String,
    queue: Mutex<BaseQueue>,
    cond: Condvar,
}

impl BaseShared {
    fn enqueue(&self, timer: Arc<TimerShared>, expires: Instant, generation: u64) {
        let mut queue = self.queue.lock();
        queue.seq += 1;
        let seq = queue.seq;
        queue.heap.push(Reverse(Entry {
            expires,
            seq,
            generation,
            timer,
        }));
        drop(queue);
        self.cond.notify_one();
    }

    fn run(self: Arc<Self>) {
        debug!("timer base '{}' running", self.name);
        while let Some(entry) = self.next_expired() {
            entry.timer.expire(entry.generation, &self);
        }
        debug!("timer base '{}' stopped", self.name);
    }

    fn next_expired(&self) -> Option<Entry> {
        let mut queue = self.queue.lock();
        loop {
            if queue.shutdown {
                return None;
            }
            let due = queue.heap.peek().map(|Reverse(entry)| entry.expires);
            match due {
                None => self.cond.wait(&mut queue),
                Some(at) if at <= Instant::now() => {
                    if let Some(Reverse(entry)) = queue.heap.pop() {
                        return Some(entry);
                    }
                }
                Some(at) => {
                    self.cond.wait_until(&mut queue, at);
                }
            }
        }
    }
}

impl TimerShared {
    fn expire(self: &Arc<Self>, generation: u64, base: &BaseShared) {
        let (expires, fires) = {
            let mut state = self.state.lock();
            if !state.armed || state.generation != generation {
                return;
            }
            state.armed = false;
            state.running = true;
            state.fires += 1;
            if let Some(remaining) = state.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }
            (state.expires, state.fires)
        };

        let (verdict, requested, now) = AtomicContext::enter(|atomic| {
            let mut ctx = TimerContext {
                atomic,
                now: Instant::now(),
                expires,
                fires,
                next: None,
            };
            let mut callback = self.callback.lock();
            let verdict = (&mut **callback)(&mut ctx);
            (verdict, ctx.next, ctx.now)
        });

        let (requeue, exhausted) = {
            let mut state = self.state.lock();
            state.running = false;
            let exhausted = state.remaining == Some(0);
            let restart = verdict == TimerRestart::Restart
                && !exhausted
                && !state.cancelling
                && !state.armed;
            if restart {
                let next = requested.unwrap_or_else(|| forward(expires, now, state.period).0);
                state.expires = next;
                state.armed = true;
                state.generation += 1;
                (Some((next, state.generation)), exhausted)
            } else {
                (None, exhausted)
            }
        };

        match requeue {
            Some((next, generation)) => base.enqueue(Arc::clone(self), next, generation),
            None if exhausted && verdict == TimerRestart::Restart => {
                debug!("timer '{}' fire budget exhausted, disarmed", self.label);
            }
            None => {}
        }
        self.idle.notify_all();
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

/// Service thread shared by a set of timers.
pub struct TimerBase {
    shared: Arc<BaseShared>,
    thread: Option<JoinHandle<()>>,
}

impl TimerBase {
    pub fn start(name: &str) -> Result<Self, DeferError> {
        let shared = Arc::new(BaseShared {
            name: name.to_owned(),
            queue: Mutex::new(BaseQueue::default()),
            cond: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        let thread = spawn_named(format!("{name}/timer"), move || worker.run())?;
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Creates a disarmed timer serviced by this base.
    pub fn timer<F>(&self, label: &str, callback: F) -> HrTimer
    where
        F: FnMut(&mut TimerContext<'_>) -> TimerRestart + Send + 'static,
    {
        HrTimer {
            shared: Arc::new(TimerShared {
                label: label.to_owned(),
                state: SpinLock::new(TimerState {
                    armed: false,
                    running: false,
                    cancelling: false,
                    generation: 0,
                    expires: Instant::now(),
                    period: Duration::ZERO,
                    remaining: None,
                    fires: 0,
                }),
                callback: Mutex::new(Box::new(callback)),
                idle: WaitQueue::new(),
            }),
            base: Arc::clone(&self.shared),
        }
    }

    /// Number of queued deadlines that would still fire.
    pub fn armed_count(&self) -> usize {
        let queue = self.shared.queue.lock();
        queue
            .heap
            .iter()
            .filter(|Reverse(entry)| {
                let state = entry.timer.state.lock();
                state.armed && state.generation == entry.generation
            })
            .count()
    }

    /// Stops the service thread. Timers still armed never fire.
    pub fn shutdown(mut self, _ctx: &ProcessContext) {
        let armed = self.armed_count();
        if armed > 0 {
            warn!(
                "timer base '{}' shut down with {armed} armed timer(s)",
                self.shared.name
            );
        }
        self.stop();
        info!("timer base '{}' shut down", self.shared.name);
    }

    fn stop(&mut self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.cond.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TimerBase {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle to a re-armable timer.
#[derive(Clone)]
pub struct HrTimer {
    shared: Arc<TimerShared>,
    base: Arc<BaseShared>,
}

impl HrTimer {
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Arms the timer to fire `delay` from now.
    ///
    /// `delay` is also the default period when the callback restarts without
    /// choosing a deadline. Arming an armed timer replaces its deadline.
    /// `FirePolicy::Times(0)` leaves the timer disarmed.
    pub fn arm(&self, delay: Duration, policy: FirePolicy) {
        let expires = Instant::now() + delay;
        let budget = policy.budget();
        let generation = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.cancelling = false;
            state.remaining = budget;
            state.armed = budget != Some(0);
            state.expires = expires;
            state.period = delay;
            state.generation
        };
        if budget == Some(0) {
            debug!("timer '{}' armed with an empty fire budget, disarmed", self.shared.label);
            return;
        }
        debug!(
            "timer '{}' armed for {} ms ({policy:?})",
            self.shared.label,
            delay.as_millis()
        );
        self.base.enqueue(Arc::clone(&self.shared), expires, generation);
    }

    /// Disarms the timer and waits for a running callback to return.
    ///
    /// After this returns the callback will not begin again until the timer
    /// is re-armed.
    pub fn cancel(&self, ctx: &ProcessContext) -> CancelStatus {
        let active = {
            let mut state = self.shared.state.lock();
            let active = state.armed || state.running;
            state.armed = false;
            state.generation += 1;
            state.cancelling = state.running;
            active
        };

        self.shared.idle.wait(ctx, || !self.shared.is_running());
        self.shared.state.lock().cancelling = false;

        if active {
            CancelStatus::WasActive
        } else {
            CancelStatus::Idle
        }
    }

    /// Disarms the timer unless its callback is currently executing.
    pub fn try_cancel(&self) -> TryCancel {
        let mut state = self.shared.state.lock();
        if state.running {
            TryCancel::Running
        } else if state.armed {
            state.armed = false;
            state.generation += 1;
            TryCancel::Cancelled
        } else {
            TryCancel::Inactive
        }
    }

    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().armed
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn fire_count(&self) -> u64 {
        self.shared.state.lock().fires
    }
}

impl fmt::Debug for HrTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("HrTimer")
            .field("label", &self.shared.label)
            .field("armed", &state.armed)
            .field("running", &state.running)
            .field("fires", &state.fires)
            .finish()
    }
}
