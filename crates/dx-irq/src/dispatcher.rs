//! Threaded interrupt handlers.
//!
//! [`request_threaded_irq`] attaches a [`ThreadedHandler`] to an [`IrqLine`]
//! and starts the thread that runs its threaded phase. Each registration
//! moves through
//!
//! ```text
//!   Idle -> ImmediatePhase -> PendingDeferred -> DeferredPhase -> Idle
//! ```
//!
//! Edges are first filtered by trigger type, then debounced: an edge closer
//! than the debounce interval to the last *accepted* edge is dropped. With
//! [`IrqFlags::ONESHOT`] the line is masked from the moment the threaded
//! phase is requested until it returns. One accepted edge arriving while
//! masked is latched and its immediate phase replayed on unmask; further
//! edges are dropped as masked.

use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dx_sync::{AtomicContext, ProcessContext, SpinLock, WaitQueue};
use log::{debug, info, warn};

use crate::error::IrqError;
use crate::line::{Edge, IrqLine, LineAction};

/// Result of a handler's threaded phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The event was not for this handler.
    None,
    Handled,
}

/// Result of a handler's immediate phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadedIrqReturn {
    None,
    Handled,
    /// Run the threaded phase.
    WakeThread,
}

/// Handler split into an immediate and a threaded phase.
pub trait ThreadedHandler: Send + Sync + 'static {
    /// Runs inline when an accepted edge is raised. Must not block.
    fn handle(&self, edge: Edge, ctx: &AtomicContext) -> ThreadedIrqReturn;

    /// Runs on the registration's thread after [`ThreadedIrqReturn::WakeThread`].
    fn handle_threaded(&self, ctx: &ProcessContext) -> IrqReturn;
}

/// Trigger and behaviour flags for a registration.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags(u32);

impl IrqFlags {
    pub const TRIGGER_RISING: Self = Self(1 << 0);
    pub const TRIGGER_FALLING: Self = Self(1 << 1);
    pub const TRIGGER_BOTH: Self = Self(Self::TRIGGER_RISING.0 | Self::TRIGGER_FALLING.0);
    /// Keep the line masked until the threaded phase has finished.
    pub const ONESHOT: Self = Self(1 << 8);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn accepts(self, edge: Edge) -> bool {
        match edge {
            Edge::Rising => self.contains(Self::TRIGGER_RISING),
            Edge::Falling => self.contains(Self::TRIGGER_FALLING),
        }
    }
}

impl BitOr for IrqFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for IrqFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::TRIGGER_RISING) {
            set.entry(&"TRIGGER_RISING");
        }
        if self.contains(Self::TRIGGER_FALLING) {
            set.entry(&"TRIGGER_FALLING");
        }
        if self.contains(Self::ONESHOT) {
            set.entry(&"ONESHOT");
        }
        set.finish()
    }
}

/// Parameters of a [`request_threaded_irq`] call.
#[derive(Debug, Clone)]
pub struct IrqRequest {
    name: String,
    flags: IrqFlags,
    debounce: Duration,
}

impl IrqRequest {
    /// Defaults to falling-edge trigger, oneshot, no debounce.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: IrqFlags::TRIGGER_FALLING | IrqFlags::ONESHOT,
            debounce: Duration::ZERO,
        }
    }

    pub fn flags(mut self, flags: IrqFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Minimum interval between accepted edges.
    pub fn debounce(mut self, interval: Duration) -> Self {
        self.debounce = interval;
        self
    }
}

/// Observable phase of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqPhase {
    Idle,
    ImmediatePhase,
    PendingDeferred,
    DeferredPhase,
}

/// Edge accounting for a registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqStats {
    /// Edges whose immediate phase ran.
    pub delivered: u64,
    /// Edges dropped inside the debounce window.
    pub debounced: u64,
    /// Edges dropped while a oneshot line was masked and an edge was
    /// already latched.
    pub masked: u64,
    /// Latched edges whose immediate phase ran on unmask.
    pub replayed: u64,
    /// Edges not matching the trigger flags.
    pub filtered: u64,
    /// Completed threaded phases.
    pub threaded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadState {
    Idle,
    Pending,
    Running,
}

struct PhaseState {
    in_hard: u32,
    thread: ThreadState,
    rerun: bool,
    latched: Option<Edge>,
    last_accepted: Option<Instant>,
    stopping: bool,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    debounced: AtomicU64,
    masked: AtomicU64,
    replayed: AtomicU64,
    filtered: AtomicU64,
    threaded: AtomicU64,
}

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

struct Action<H> {
    id: u64,
    line: u32,
    name: String,
    flags: IrqFlags,
    debounce: Duration,
    handler: Arc<H>,
    state: SpinLock<PhaseState>,
    wake: WaitQueue,
    counters: Counters,
}

impl<H: ThreadedHandler> Action<H> {
    fn phase(&self) -> IrqPhase {
        let state = self.state.lock();
        match state.thread {
            ThreadState::Running => IrqPhase::DeferredPhase,
            ThreadState::Pending => IrqPhase::PendingDeferred,
            ThreadState::Idle if state.in_hard > 0 => IrqPhase::ImmediatePhase,
            ThreadState::Idle => IrqPhase::Idle,
        }
    }

    fn stats(&self) -> IrqStats {
        IrqStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            debounced: self.counters.debounced.load(Ordering::Relaxed),
            masked: self.counters.masked.load(Ordering::Relaxed),
            replayed: self.counters.replayed.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            threaded: self.counters.threaded.load(Ordering::Relaxed),
        }
    }

    /// Applies debouncing and masking. Returns `true` if the immediate phase
    /// should run now.
    fn admit(&self, edge: Edge, at: Instant) -> bool {
        let mut state = self.state.lock();
        if let Some(last) = state.last_accepted {
            if at.saturating_duration_since(last) < self.debounce {
                self.counters.debounced.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }
        if self.flags.contains(IrqFlags::ONESHOT) && state.thread != ThreadState::Idle {
            if state.latched.is_some() {
                self.counters.masked.fetch_add(1, Ordering::Relaxed);
            } else {
                state.latched = Some(edge);
                state.last_accepted = Some(at);
            }
            return false;
        }
        state.last_accepted = Some(at);
        state.in_hard += 1;
        true
    }

    /// Runs the immediate phase of an admitted edge and requests the
    /// threaded phase if the handler asks for it.
    fn run_immediate(&self, edge: Edge, ctx: &AtomicContext) {
        let ret = self.handler.handle(edge, ctx);
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);

        let woke = {
            let mut state = self.state.lock();
            state.in_hard -= 1;
            match (ret, state.thread) {
                (ThreadedIrqReturn::WakeThread, ThreadState::Idle) => {
                    state.thread = ThreadState::Pending;
                    true
                }
                (ThreadedIrqReturn::WakeThread, ThreadState::Running) => {
                    state.rerun = true;
                    false
                }
                _ => false,
            }
        };
        if woke {
            self.wake.notify_all();
        }
    }

    /// Ends a threaded phase: replays a latched edge while the line is still
    /// masked, then goes idle or pending.
    fn unmask(&self) {
        loop {
            let latched = {
                let mut state = self.state.lock();
                match state.latched.take() {
                    Some(edge) => {
                        state.in_hard += 1;
                        Some(edge)
                    }
                    None => {
                        state.thread = if state.rerun {
                            state.rerun = false;
                            ThreadState::Pending
                        } else {
                            ThreadState::Idle
                        };
                        None
                    }
                }
            };
            let Some(edge) = latched else {
                break;
            };
            self.counters.replayed.fetch_add(1, Ordering::Relaxed);
            debug!("irq {} ({}): replaying latched {edge:?} edge", self.line, self.name);
            AtomicContext::enter(|ctx| self.run_immediate(edge, ctx));
        }
        self.wake.notify_all();
    }

    fn thread_main(&self) {
        let ctx = ProcessContext::enter();
        loop {
            self.wake.wait(&ctx, || {
                let state = self.state.lock();
                state.thread == ThreadState::Pending || state.stopping
            });

            {
                let mut state = self.state.lock();
                if state.thread != ThreadState::Pending {
                    break;
                }
                state.thread = ThreadState::Running;
            }

            let ret = self.handler.handle_threaded(&ctx);
            self.counters.threaded.fetch_add(1, Ordering::Relaxed);
            if ret == IrqReturn::None {
                debug!("irq {} ({}): threaded phase not handled", self.line, self.name);
            }

            self.unmask();
        }
        debug!("irq {} ({}): thread exiting", self.line, self.name);
    }
}

impl<H: ThreadedHandler> LineAction for Action<H> {
    fn id(&self) -> u64 {
        self.id
    }

    fn deliver(&self, edge: Edge, at: Instant, ctx: &AtomicContext) {
        if !self.flags.accepts(edge) {
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if self.admit(edge, at) {
            self.run_immediate(edge, ctx);
        }
    }
}

/// What [`Registration::free`] hands back once the line is released.
pub struct FreedIrq<H> {
    pub handler: Arc<H>,
    pub stats: IrqStats,
    /// `true` if a threaded phase was pending or running when freed.
    pub was_busy: bool,
}

/// Installs `handler` on `line` and starts its threaded-phase thread.
///
/// Fails with [`IrqError::Busy`] if the line already has a handler.
pub fn request_threaded_irq<H: ThreadedHandler>(
    line: &Arc<IrqLine>,
    request: IrqRequest,
    handler: H,
) -> Result<Registration<H>, IrqError> {
    let handler = Arc::new(handler);
    let action = Arc::new(Action {
        id: NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed),
        line: line.number(),
        name: request.name,
        flags: request.flags,
        debounce: request.debounce,
        handler: Arc::clone(&handler),
        state: SpinLock::new(PhaseState {
            in_hard: 0,
            thread: ThreadState::Idle,
            rerun: false,
            latched: None,
            last_accepted: None,
            stopping: false,
        }),
        wake: WaitQueue::new(),
        counters: Counters::default(),
    });

    if line.is_claimed() {
        return Err(IrqError::Busy {
            line: line.number(),
        });
    }

    let worker = Arc::clone(&action);
    let thread = thread::Builder::new()
        .name(format!("irq/{}-{}", action.line, action.name))
        .spawn(move || worker.thread_main())
        .map_err(|source| IrqError::Spawn {
            line: action.line,
            source,
        })?;

    let mut registration = Registration {
        line: Arc::clone(line),
        action,
        thread: Some(thread),
        attached: false,
    };
    let installed: Arc<dyn LineAction> = registration.action.clone();
    line.attach(installed)?;
    registration.attached = true;

    info!(
        "irq {} ({}): threaded handler registered, flags {:?}, debounce {} ms",
        registration.action.line,
        registration.action.name,
        registration.action.flags,
        registration.action.debounce.as_millis()
    );
    Ok(registration)
}

/// Live handler registration. Dropping it frees the line.
pub struct Registration<H: ThreadedHandler> {
    line: Arc<IrqLine>,
    action: Arc<Action<H>>,
    thread: Option<JoinHandle<()>>,
    attached: bool,
}

impl<H: ThreadedHandler> Registration<H> {
    pub fn handler(&self) -> &Arc<H> {
        &self.action.handler
    }

    pub fn phase(&self) -> IrqPhase {
        self.action.phase()
    }

    pub fn stats(&self) -> IrqStats {
        self.action.stats()
    }

    pub fn line(&self) -> &Arc<IrqLine> {
        &self.line
    }

    /// Releases the line.
    ///
    /// The handler is detached first, which waits for any running immediate
    /// phase; a pending threaded phase is then allowed to finish before the
    /// thread is stopped and joined.
    pub fn free(mut self, ctx: &ProcessContext) -> FreedIrq<H> {
        let was_busy = self.phase() != IrqPhase::Idle;
        self.detach();
        self.action.wake.wait(ctx, || {
            self.action.state.lock().thread == ThreadState::Idle
        });
        if was_busy {
            warn!(
                "irq {} ({}): freed while still in use, threaded phase drained",
                self.action.line, self.action.name
            );
        }
        self.stop_thread();

        info!("irq {} ({}): freed", self.action.line, self.action.name);
        FreedIrq {
            handler: Arc::clone(&self.action.handler),
            stats: self.action.stats(),
            was_busy,
        }
    }

    fn detach(&mut self) {
        if self.attached {
            self.line.detach(self.action.id);
            self.attached = false;
        }
    }

    fn stop_thread(&mut self) {
        self.action.state.lock().stopping = true;
        self.action.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<H: ThreadedHandler> Drop for Registration<H> {
    fn drop(&mut self) {
        self.detach();
        self.stop_thread();
    }
}

impl<H: ThreadedHandler> fmt::Debug for Registration<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("line", &self.action.line)
            .field("name", &self.action.name)
            .field("phase", &self.phase())
            .field("stats", &self.stats())
            .finish()
    }
}
