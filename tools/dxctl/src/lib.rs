//! Host-side driver for the DX runtime.
//!
//! `dxctl` loads a [`dx_module::Subsystem`] on a simulated board, optionally
//! presses the button on a schedule, and prints what teardown found.

pub mod logger;
pub mod report;
pub mod settings;

pub use logger::{ConsoleLogger, LogLevel};
pub use settings::{load_config, parse_policy, Overrides};

#[cfg(test)]
mod tests;
