use dx_defer::DrainReport;
use dx_irq::IrqStats;
use dx_module::TeardownReport;

use crate::report::rows;

fn sample() -> TeardownReport {
    TeardownReport {
        timers_in_use: 1,
        timer_fires: 4,
        irq_busy: false,
        irq: IrqStats {
            delivered: 3,
            debounced: 2,
            ..IrqStats::default()
        },
        tasklets_busy: 0,
        tasklet_runs: 8,
        work: DrainReport {
            completed: 12,
            failed: 0,
            dropped: 1,
        },
        worker_cycles: vec![4, 4, 3],
        counter: 11,
        presses: 3,
    }
}

fn value<'a>(rows: &'a [(&'static str, String)], label: &str) -> &'a str {
    rows.iter()
        .find(|(l, _)| *l == label)
        .map(|(_, v)| v.as_str())
        .unwrap_or_else(|| panic!("missing row {label}"))
}

#[test]
fn rows_follow_teardown_order() {
    let rows = rows(&sample());
    let labels: Vec<_> = rows.iter().map(|(label, _)| *label).collect();

    assert_eq!(labels.first(), Some(&"timers in use"));
    assert_eq!(labels.last(), Some(&"counter"));
    let irq = labels.iter().position(|l| *l == "irq busy").expect("irq row");
    let work = labels.iter().position(|l| *l == "work").expect("work row");
    assert!(irq < work);
}

#[test]
fn rows_render_counts() {
    let rows = rows(&sample());

    assert_eq!(value(&rows, "worker cycles"), "[4 4 3]");
    assert_eq!(value(&rows, "work"), "12 completed, 0 failed, 1 dropped");
    assert_eq!(
        value(&rows, "irq edges"),
        "3 delivered (0 replayed), 2 debounced, 0 masked, 0 filtered"
    );
    assert_eq!(value(&rows, "counter"), "11");
}
