use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Errors raised while starting a [`WorkerPool`](crate::WorkerPool).
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("failed to create worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to allocate worker table: {0}")]
    Alloc(#[from] TryReserveError),
}
