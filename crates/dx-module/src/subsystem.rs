//! Subsystem lifecycle.
//!
//! [`Subsystem::init`] acquires resources consumers-first (timer base,
//! tasklet engine, work queue, IRQ, worker pool) and arms the timers last,
//! so nothing produces events before everything that handles them exists.
//! Every resource releases itself on drop, which is what unwinds a failed
//! init. [`Subsystem::deinit`] tears down in the opposite direction:
//! producers are cancelled before the consumers they feed are drained.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dx_defer::{
    DeferError, DrainReport, FirePolicy, HrTimer, Tasklet, TaskletEngine, TimerBase,
    TimerRestart, Work, WorkQueue, WorkQueueHandle,
};
use dx_irq::{request_threaded_irq, ButtonHandler, IrqRequest, IrqStats, Level, Registration};
use dx_pool::{OsSpawner, ThreadSpawner, WorkerPool};
use dx_sync::{CounterView, ProcessContext, SharedCounter};
use log::{error, info, warn};

use crate::board::Board;
use crate::config::ModuleConfig;
use crate::error::InitError;

/// What [`Subsystem::deinit`] found while tearing down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    /// Timers that were armed or running when cancelled.
    pub timers_in_use: usize,
    /// Invocations of the fan-out timer over the subsystem lifetime.
    pub timer_fires: u64,
    /// A threaded button phase was pending or running when the IRQ was freed.
    pub irq_busy: bool,
    pub irq: IrqStats,
    /// Tasklets that were pending or running when killed.
    pub tasklets_busy: usize,
    pub tasklet_runs: u64,
    pub work: DrainReport,
    /// Cycles completed by each pool worker, by index.
    pub worker_cycles: Vec<u64>,
    pub counter: u64,
    pub presses: u64,
}

impl TeardownReport {
    /// `true` if any resource had to be drained or discarded.
    pub fn found_in_use(&self) -> bool {
        self.timers_in_use > 0 || self.irq_busy || self.tasklets_busy > 0 || self.work.dropped > 0
    }
}

/// Every resource of one runtime instance.
///
/// Field order is drop order: the timer base stops first so no callback
/// fires into a half-dropped subsystem.
pub struct Subsystem {
    timer_base: TimerBase,
    fanout: HrTimer,
    mirror: Option<HrTimer>,
    irq: Registration<ButtonHandler>,
    regular: Tasklet,
    hi: Tasklet,
    engine: TaskletEngine,
    queue: WorkQueue,
    work: Work,
    delayed_work: Work,
    pool: WorkerPool,
    counter: Arc<SharedCounter>,
    config: ModuleConfig,
    epoch: Instant,
}

impl Subsystem {
    pub fn init(
        config: ModuleConfig,
        board: Board,
        ctx: &ProcessContext,
    ) -> Result<Self, InitError> {
        Self::init_with_spawner(config, board, Arc::new(OsSpawner), ctx)
    }

    /// Like [`Subsystem::init`], creating pool workers through `spawner`.
    pub fn init_with_spawner(
        config: ModuleConfig,
        board: Board,
        spawner: Arc<dyn ThreadSpawner>,
        _ctx: &ProcessContext,
    ) -> Result<Self, InitError> {
        Self::build(config, board, spawner).map_err(|err| {
            error!("init failed, everything acquired was released: {err}");
            err
        })
    }

    fn build(
        config: ModuleConfig,
        board: Board,
        spawner: Arc<dyn ThreadSpawner>,
    ) -> Result<Self, InitError> {
        config.validate()?;
        let epoch = Instant::now();
        let counter = SharedCounter::new();

        let timer_base = TimerBase::start("dx")?;
        let engine = TaskletEngine::start("dx", config.tasklet_threads)?;
        let queue = WorkQueue::start("dx", config.work_threads)?;

        let work = logging_work("work", epoch);
        let delayed_work = logging_work("delayed-work", epoch);
        let fanout_tasklet = |label: &'static str| {
            fanout_tasklet(
                &engine,
                label,
                queue.handle(),
                work.clone(),
                delayed_work.clone(),
                config.delayed_work(),
                epoch,
            )
        };
        let regular = fanout_tasklet("regular")?;
        let hi = fanout_tasklet("hi")?;

        let fanout = {
            let regular = regular.clone();
            let hi = hi.clone();
            timer_base.timer("fanout", move |_ctx| {
                info!("timer fired ({} ms), scheduling tasklets", epoch.elapsed().as_millis());
                regular.schedule();
                hi.schedule_hi();
                TimerRestart::Restart
            })
        };

        let mirror = match (&board.mirror_led, config.led_mirror_period()) {
            (Some(led), Some(_)) => {
                let led = Arc::clone(led);
                let button = Arc::clone(&board.button);
                Some(timer_base.timer("led-mirror", move |_ctx| {
                    led.write(!button.read());
                    TimerRestart::Restart
                }))
            }
            _ => None,
        };

        let mut handler = ButtonHandler::new(Arc::clone(&board.led));
        if let Some(busy) = config.simulate_busy() {
            handler = handler.simulate_busy(busy);
        }
        let request = IrqRequest::new(config.irq_name.clone()).debounce(config.debounce());
        let irq = request_threaded_irq(&board.button_line, request, handler)?;

        let pool = WorkerPool::builder()
            .size(config.pool_size)
            .period(config.worker_period())
            .counter(Arc::clone(&counter))
            .spawner(spawner)
            .start()?;

        fanout.arm(config.timer_delay(), FirePolicy::from(config.timer_policy));
        if let (Some(timer), Some(period)) = (&mirror, config.led_mirror_period()) {
            timer.arm(period, FirePolicy::Forever);
        }

        info!(
            "subsystem up: {} workers, timer in {} ms ({:?}), irq {} debounce {} ms",
            config.pool_size,
            config.timer_delay_ms,
            config.timer_policy,
            board.button_line.number(),
            config.debounce_ms
        );

        Ok(Self {
            timer_base,
            fanout,
            mirror,
            irq,
            regular,
            hi,
            engine,
            queue,
            work,
            delayed_work,
            pool,
            counter,
            config,
            epoch,
        })
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Counter shared by the pool workers.
    pub fn counter(&self) -> CounterView {
        self.counter.view()
    }

    /// Accepted button presses.
    pub fn presses(&self) -> CounterView {
        self.irq.handler().presses()
    }

    pub fn led_state(&self) -> Level {
        self.irq.handler().led_state()
    }

    pub fn irq_stats(&self) -> IrqStats {
        self.irq.stats()
    }

    pub fn timer_fires(&self) -> u64 {
        self.fanout.fire_count()
    }

    pub fn tasklet_runs(&self) -> u64 {
        self.regular.run_count() + self.hi.run_count()
    }

    /// Completed runs of the immediate and delayed work items.
    pub fn work_runs(&self) -> (u64, u64) {
        (self.work.run_count(), self.delayed_work.run_count())
    }

    pub fn uptime(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Releases everything. Never fails; resources found busy are drained
    /// and reported.
    pub fn deinit(self, ctx: &ProcessContext) -> TeardownReport {
        let Subsystem {
            timer_base,
            fanout,
            mirror,
            irq,
            regular,
            hi,
            engine,
            queue,
            work,
            delayed_work,
            pool,
            counter,
            config: _,
            epoch,
        } = self;

        let mut timers_in_use = 0;
        for timer in std::iter::once(&fanout).chain(mirror.as_ref()) {
            if timer.cancel(ctx).was_active() {
                info!("The timer '{}' was still in use...", timer.label());
                timers_in_use += 1;
            }
        }
        let timer_fires = fanout.fire_count();

        let freed = irq.free(ctx);
        let presses = freed.handler.presses().get();

        let mut tasklets_busy = 0;
        for tasklet in [&regular, &hi] {
            if tasklet.kill(ctx) {
                warn!("tasklet '{}' was still in use", tasklet.label());
                tasklets_busy += 1;
            }
        }
        let tasklet_runs = regular.run_count() + hi.run_count();

        let work_report = queue.destroy(ctx);
        drop((work, delayed_work));

        let worker_cycles = pool.stop(ctx);

        drop((regular, hi, fanout, mirror));
        engine.shutdown(ctx);
        timer_base.shutdown(ctx);

        let report = TeardownReport {
            timers_in_use,
            timer_fires,
            irq_busy: freed.was_busy,
            irq: freed.stats,
            tasklets_busy,
            tasklet_runs,
            work: work_report,
            worker_cycles,
            counter: counter.get(),
            presses,
        };
        info!(
            "subsystem down after {} ms: counter {}, {} press(es), {} work item(s) completed",
            epoch.elapsed().as_millis(),
            report.counter,
            report.presses,
            report.work.completed
        );
        report
    }
}

fn logging_work(label: &'static str, epoch: Instant) -> Work {
    Work::new(label, move |_ctx| {
        info!("{label} called ({} ms)", epoch.elapsed().as_millis());
        Ok(())
    })
}

fn fanout_tasklet(
    engine: &TaskletEngine,
    label: &'static str,
    queue: WorkQueueHandle,
    work: Work,
    delayed_work: Work,
    delay: Duration,
    epoch: Instant,
) -> Result<Tasklet, DeferError> {
    engine.tasklet(label, move |_ctx| {
        info!("{label}: {} ms", epoch.elapsed().as_millis());
        queue.queue(&work);
        queue.queue_delayed(&delayed_work, delay);
    })
}
