use std::io;

use thiserror::Error;

/// Errors raised while setting up deferred-execution resources.
#[derive(Error, Debug)]
pub enum DeferError {
    #[error("failed to spawn thread '{thread}': {source}")]
    Spawn {
        thread: String,
        #[source]
        source: io::Error,
    },
    #[error("tasklet limit of {0} reached")]
    TooManyTasklets(usize),
}

pub(crate) fn spawn_named<F>(
    name: String,
    body: F,
) -> Result<std::thread::JoinHandle<()>, DeferError>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|source| DeferError::Spawn {
            thread: name,
            source,
        })
}
