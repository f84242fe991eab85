//! Teardown and status rendering.

use colored::Colorize;
use dx_module::{Subsystem, TeardownReport};

/// Label/value rows describing a teardown, in teardown order.
pub fn rows(report: &TeardownReport) -> Vec<(&'static str, String)> {
    let cycles = report
        .worker_cycles
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        ("timers in use", report.timers_in_use.to_string()),
        ("timer fires", report.timer_fires.to_string()),
        ("irq busy", report.irq_busy.to_string()),
        (
            "irq edges",
            format!(
                "{} delivered ({} replayed), {} debounced, {} masked, {} filtered",
                report.irq.delivered,
                report.irq.replayed,
                report.irq.debounced,
                report.irq.masked,
                report.irq.filtered
            ),
        ),
        ("button presses", report.presses.to_string()),
        ("tasklets busy", report.tasklets_busy.to_string()),
        ("tasklet runs", report.tasklet_runs.to_string()),
        (
            "work",
            format!(
                "{} completed, {} failed, {} dropped",
                report.work.completed, report.work.failed, report.work.dropped
            ),
        ),
        ("worker cycles", format!("[{cycles}]")),
        ("counter", report.counter.to_string()),
    ]
}

pub fn print_report(report: &TeardownReport) {
    let heading = if report.found_in_use() {
        "teardown (resources were still in use)".bright_yellow().bold()
    } else {
        "teardown (clean)".bright_green().bold()
    };
    println!("{heading}");
    for (label, value) in rows(report) {
        println!("  {:<16} {}", label.dimmed(), value);
    }
}

pub fn status_line(subsystem: &Subsystem) -> String {
    let (work, delayed) = subsystem.work_runs();
    format!(
        "[{:>6} ms] counter={} presses={} led={:?} timer={} tasklets={} work={}/{}",
        subsystem.uptime().as_millis(),
        subsystem.counter().get(),
        subsystem.presses().get(),
        subsystem.led_state(),
        subsystem.timer_fires(),
        subsystem.tasklet_runs(),
        work,
        delayed
    )
}
