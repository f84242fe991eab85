//! # dx-defer
//!
//! Deferred-execution tiers of the DX runtime.
//!
//! ## Module Overview
//! - [`timer`]     – `TimerBase` service thread and re-armable [`HrTimer`]s
//!   whose callbacks run in atomic context.
//! - [`tasklet`]   – Coalescing soft deferred units executed by a
//!   [`TaskletEngine`], also in atomic context.
//! - [`workqueue`] – Blockable work items, optionally delayed, served by
//!   [`WorkQueue`] executor threads.
//!
//! Work flows downwards: a timer callback may schedule tasklets, a tasklet
//! may queue work, and only work items (process context) may block.

pub mod error;
pub mod tasklet;
pub mod timer;
pub mod workqueue;

pub use error::DeferError;
pub use tasklet::{Tasklet, TaskletEngine, TaskletState, MAX_TASKLETS};
pub use timer::{
    CancelStatus, FirePolicy, HrTimer, TimerBase, TimerContext, TimerRestart, TryCancel,
};
pub use workqueue::{
    DrainReport, Work, WorkError, WorkQueue, WorkQueueHandle, WorkQueueStats, WorkResult,
    MAX_QUEUED_WORK,
};

#[cfg(test)]
mod tests;
