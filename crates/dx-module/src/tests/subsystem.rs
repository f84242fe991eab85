use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use dx_irq::{request_threaded_irq, ButtonHandler, IrqError, IrqRequest, Level, OutputPin};
use dx_pool::{OsSpawner, PoolError, ThreadSpawner, WorkerBody};
use dx_sync::ProcessContext;

use super::wait_for;
use crate::board::SimBoard;
use crate::config::{ModuleConfig, TimerPolicy};
use crate::error::{ConfigError, InitError};
use crate::subsystem::Subsystem;

fn quick_config() -> ModuleConfig {
    ModuleConfig::builder()
        .pool_size(2)
        .worker_period(Duration::from_millis(20))
        .timer(Duration::from_millis(10), TimerPolicy::Once)
        .delayed_work(Duration::from_millis(20))
        .debounce(Duration::ZERO)
        .led_mirror(None)
        .build()
}

#[test]
fn timer_fans_out_to_tasklets_and_work() {
    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let subsystem =
        Subsystem::init(quick_config(), sim.board(), &ctx).expect("init should succeed");

    assert!(wait_for(Duration::from_secs(2), || {
        let (work, delayed) = subsystem.work_runs();
        work >= 1 && delayed >= 1
    }));
    assert_eq!(subsystem.timer_fires(), 1);
    assert_eq!(subsystem.tasklet_runs(), 2);

    let report = subsystem.deinit(&ctx);
    assert_eq!(report.timer_fires, 1);
    assert_eq!(report.tasklet_runs, 2);
    assert_eq!(report.timers_in_use, 0);
    assert!(report.work.completed >= 2);
}

#[test]
fn presses_toggle_led_and_are_counted() {
    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let subsystem =
        Subsystem::init(quick_config(), sim.board(), &ctx).expect("init should succeed");
    let presses = subsystem.presses();

    for expected in 1..=3u64 {
        sim.press();
        sim.release();
        assert_eq!(presses.get(), expected);
        assert!(wait_for(Duration::from_secs(2), || subsystem.irq_stats().threaded == expected));
    }

    assert_eq!(subsystem.led_state(), Level::High);
    assert_eq!(sim.led.level(), Level::High);
    let stats = subsystem.irq_stats();
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.filtered, 3);

    let report = subsystem.deinit(&ctx);
    assert_eq!(report.presses, 3);
    assert!(!report.irq_busy);
}

#[test]
fn mirror_led_follows_inverted_button() {
    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let config = ModuleConfig::builder()
        .pool_size(1)
        .timer(Duration::from_millis(50), TimerPolicy::Forever)
        .led_mirror(Some(Duration::from_millis(5)))
        .build();
    let subsystem = Subsystem::init(config, sim.board(), &ctx).expect("init should succeed");

    assert!(wait_for(Duration::from_secs(2), || sim.mirror_led.level() == Level::Low
        && sim.mirror_led.write_count() > 0));
    sim.button.set_level(Level::Low);
    assert!(wait_for(Duration::from_secs(2), || sim.mirror_led.level() == Level::High));
    sim.button.set_level(Level::High);
    assert!(wait_for(Duration::from_secs(2), || sim.mirror_led.level() == Level::Low));

    let report = subsystem.deinit(&ctx);
    assert_eq!(report.timers_in_use, 2);
}

#[test]
fn invalid_config_is_rejected_before_anything_starts() {
    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let config = ModuleConfig::builder().pool_size(0).build();

    let result = Subsystem::init(config, sim.board(), &ctx);

    assert!(matches!(result, Err(InitError::Config(ConfigError::EmptyPool))));
    assert!(!sim.line.is_claimed());
}

#[test]
fn busy_line_fails_init_and_releases_everything() {
    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let other = request_threaded_irq(
        &sim.line,
        IrqRequest::new("other"),
        ButtonHandler::new(Arc::clone(&sim.led) as Arc<dyn OutputPin>),
    )
    .expect("first request should succeed");

    let result = Subsystem::init(quick_config(), sim.board(), &ctx);
    assert!(matches!(result, Err(InitError::Irq(IrqError::Busy { .. }))));

    other.free(&ctx);
    let subsystem =
        Subsystem::init(quick_config(), sim.board(), &ctx).expect("line is free again");
    subsystem.deinit(&ctx);
}

struct FailAt(usize, std::sync::atomic::AtomicUsize);

impl ThreadSpawner for FailAt {
    fn spawn(&self, name: String, body: WorkerBody) -> io::Result<JoinHandle<u64>> {
        if self.1.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == self.0 {
            return Err(io::Error::new(io::ErrorKind::Other, "no more threads"));
        }
        OsSpawner.spawn(name, body)
    }
}

#[test]
fn pool_failure_rolls_back_irq_and_timers() {
    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let config = ModuleConfig::builder()
        .pool_size(5)
        .timer(Duration::from_millis(1), TimerPolicy::Forever)
        .build();
    let spawner = Arc::new(FailAt(3, Default::default()));

    let result = Subsystem::init_with_spawner(config, sim.board(), spawner, &ctx);

    match result {
        Err(InitError::Pool(PoolError::Spawn { index, .. })) => assert_eq!(index, 3),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("init should fail"),
    }
    assert!(!sim.line.is_claimed());
    let writes = sim.led.write_count();
    sim.press();
    assert_eq!(sim.led.write_count(), writes);
    assert_eq!(sim.line.spurious_count(), 1);
}

#[test]
fn deinit_reports_worker_cycles() {
    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let subsystem =
        Subsystem::init(quick_config(), sim.board(), &ctx).expect("init should succeed");
    let counter = subsystem.counter();

    assert!(wait_for(Duration::from_secs(2), || counter.get() >= 4));
    let report = subsystem.deinit(&ctx);

    assert_eq!(report.worker_cycles.len(), 2);
    assert_eq!(report.worker_cycles.iter().sum::<u64>(), report.counter);
    assert_eq!(counter.get(), report.counter);
}
