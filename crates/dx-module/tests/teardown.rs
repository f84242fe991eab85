//! Nothing keeps running once `deinit` has returned.

use std::thread;
use std::time::Duration;

use dx_module::{ModuleConfig, SimBoard, Subsystem, TimerPolicy};
use dx_sync::ProcessContext;

#[test]
fn deinit_leaves_nothing_running() {
    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let config = ModuleConfig::builder()
        .pool_size(5)
        .worker_period(Duration::from_millis(10))
        .timer(Duration::from_millis(10), TimerPolicy::Forever)
        .delayed_work(Duration::from_millis(500))
        .debounce(Duration::from_millis(20))
        .simulate_busy(Duration::from_millis(30))
        .led_mirror(Some(Duration::from_millis(5)))
        .build();
    let subsystem = Subsystem::init(config, sim.board(), &ctx).expect("init should succeed");
    let counter = subsystem.counter();
    let presses = subsystem.presses();

    for _ in 0..3 {
        sim.press();
        thread::sleep(Duration::from_millis(40));
        sim.release();
    }
    sim.press();
    thread::sleep(Duration::from_millis(60));

    let report = subsystem.deinit(&ctx);

    assert_eq!(report.timers_in_use, 2);
    assert!(report.timer_fires >= 2);
    assert_eq!(report.worker_cycles.len(), 5);
    assert_eq!(report.worker_cycles.iter().sum::<u64>(), report.counter);
    assert_eq!(report.presses + report.irq.masked, 4);
    assert_eq!(report.irq.debounced, 0);
    assert_eq!(report.presses, report.irq.delivered);
    assert!(report.tasklet_runs >= 2);
    assert!(report.work.dropped >= 1);
    assert!(report.found_in_use());

    let counter_after = counter.get();
    let presses_after = presses.get();
    let led_writes = sim.led.write_count();
    let mirror_writes = sim.mirror_led.write_count();
    assert_eq!(counter_after, report.counter);
    assert!(!sim.line.is_claimed());

    sim.release();
    sim.press();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(counter.get(), counter_after);
    assert_eq!(presses.get(), presses_after);
    assert_eq!(sim.led.write_count(), led_writes);
    assert_eq!(sim.mirror_led.write_count(), mirror_writes);
    assert_eq!(sim.line.spurious_count(), 2);
}
