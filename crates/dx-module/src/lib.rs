//! # dx-module
//!
//! One explicit [`Subsystem`] instance owning every deferred-execution
//! resource of the runtime.
//!
//! ## Module Overview
//! - [`config`]    – [`ModuleConfig`] and its builder.
//! - [`board`]     – [`Board`] pins and IRQ line, plus the simulated [`SimBoard`].
//! - [`subsystem`] – [`Subsystem::init`] with full rollback and ordered
//!   [`Subsystem::deinit`].
//! - [`error`]     – [`InitError`] and [`ConfigError`].
//!
//! ## Data flow
//! A high-resolution timer schedules a regular and a high-priority tasklet;
//! each tasklet queues an immediate and a delayed work item. Independently,
//! button edges run the threaded IRQ handler and a pool of workers bumps a
//! shared counter on its own period.

pub mod board;
pub mod config;
pub mod error;
pub mod subsystem;

pub use board::{Board, SimBoard};
pub use config::{ModuleConfig, ModuleConfigBuilder, TimerPolicy};
pub use error::{ConfigError, InitError};
pub use subsystem::{Subsystem, TeardownReport};

#[cfg(test)]
mod tests;
