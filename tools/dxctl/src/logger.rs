//! Console logger
//!
//! Writes one line per record to stderr with a wall-clock timestamp and the
//! name of the emitting thread, which tells the execution context apart
//! (`dx/softirq/0`, `irq/17-dx-button`, `thread/3`, ...).

use std::io::Write;

use chrono::{DateTime, Local};
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<ConsoleLogger> = OnceCell::new();

/// Verbosity accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct ConsoleLogger {
    level: LevelFilter,
    color: bool,
}

impl ConsoleLogger {
    pub fn new(level: LevelFilter, color: bool) -> Self {
        Self { level, color }
    }

    /// Installs the process-wide logger. Fails if one is already set.
    pub fn install(level: LevelFilter, color: bool) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| Self::new(level, color));
        log::set_logger(logger)?;
        log::set_max_level(logger.level);
        Ok(())
    }

    pub fn format_line(&self, now: DateTime<Local>, thread: &str, record: &Record<'_>) -> String {
        let stamp = now.format("%H:%M:%S%.3f").to_string();
        let tag = format!("{:<5}", record.level());
        let thread = format!("[{thread}]");
        if !self.color {
            return format!("{stamp} {tag} {thread} {}: {}", record.target(), record.args());
        }

        let tag = match record.level() {
            Level::Error => tag.bright_red().bold(),
            Level::Warn => tag.bright_yellow(),
            Level::Info => tag.bright_green(),
            Level::Debug => tag.bright_blue(),
            Level::Trace => tag.dimmed(),
        };
        format!(
            "{} {} {} {}: {}",
            stamp.dimmed(),
            tag,
            thread.cyan(),
            record.target().dimmed(),
            record.args()
        )
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let current = std::thread::current();
        let line = self.format_line(Local::now(), current.name().unwrap_or("?"), record);
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
