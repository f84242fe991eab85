use std::io;

use thiserror::Error;

/// Errors raised while requesting an interrupt line.
#[derive(Error, Debug)]
pub enum IrqError {
    #[error("irq {line} already has a handler")]
    Busy { line: u32 },

    #[error("failed to spawn threaded handler for irq {line}: {source}")]
    Spawn {
        line: u32,
        #[source]
        source: io::Error,
    },
}
