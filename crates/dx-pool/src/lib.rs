//! # dx-pool
//!
//! Fixed-size pool of long-lived worker threads.
//!
//! ## Module Overview
//! - [`pool`]    – [`WorkerPool`]: all-or-nothing startup, stop and join.
//! - [`worker`]  – The worker loop, thread naming and self-identification.
//! - [`spawner`] – [`ThreadSpawner`] seam over OS thread creation.
//!
//! Workers share one [`SharedCounter`](dx_sync::SharedCounter). Each cycle
//! increments it, reports, then sleeps on the pool's stop token for one
//! period, so a stop request ends every worker without waiting out its
//! sleep.

pub mod error;
pub mod pool;
pub mod spawner;
pub mod worker;

pub use error::PoolError;
pub use pool::{WorkerPool, WorkerPoolBuilder};
pub use spawner::{OsSpawner, ThreadSpawner, WorkerBody};
pub use worker::{parse_worker_index, worker_name};

#[cfg(test)]
mod tests;
