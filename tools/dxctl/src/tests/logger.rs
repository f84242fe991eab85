use chrono::{Local, TimeZone};
use log::{Level, LevelFilter, Log, Record};

use crate::logger::{ConsoleLogger, LogLevel};

#[test]
fn plain_line_carries_thread_and_target() {
    let logger = ConsoleLogger::new(LevelFilter::Info, false);
    let now = Local
        .with_ymd_and_hms(2024, 5, 1, 12, 30, 15)
        .single()
        .expect("unambiguous local time");
    let line = logger.format_line(
        now,
        "irq/17-dx-button",
        &Record::builder()
            .level(Level::Warn)
            .target("dx_irq::button")
            .args(format_args!("pressed {} times", 3))
            .build(),
    );

    assert_eq!(line, "12:30:15.000 WARN  [irq/17-dx-button] dx_irq::button: pressed 3 times");
}

#[test]
fn level_filter_applies() {
    let logger = ConsoleLogger::new(LevelFilter::Info, false);
    let debug = Record::builder().level(Level::Debug).build();
    let error = Record::builder().level(Level::Error).build();

    assert!(!logger.enabled(debug.metadata()));
    assert!(logger.enabled(error.metadata()));
}

#[test]
fn cli_levels_map_to_filters() {
    assert_eq!(LevelFilter::from(LogLevel::Off), LevelFilter::Off);
    assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::Trace);
    assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::Warn);
}
