use dx_defer::DeferError;
use dx_irq::IrqError;
use dx_pool::PoolError;
use thiserror::Error;

/// Rejected [`ModuleConfig`](crate::ModuleConfig) values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    EmptyPool,

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("{0} needs at least one thread")]
    NoThreads(&'static str),

    #[error("timer policy Times(0) would never fire")]
    NeverFires,
}

/// Cause of a failed [`Subsystem::init`](crate::Subsystem::init).
///
/// Everything acquired before the failure has been released when this is
/// returned.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("worker pool: {0}")]
    Pool(#[from] PoolError),

    #[error("button irq: {0}")]
    Irq(#[from] IrqError),

    #[error("deferred execution: {0}")]
    Defer(#[from] DeferError),
}
