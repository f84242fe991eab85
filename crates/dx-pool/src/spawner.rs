//! Thread creation seam.

use std::io;
use std::thread::{self, JoinHandle};

/// Body of a worker thread; returns the number of cycles it completed.
pub type WorkerBody = Box<dyn FnOnce() -> u64 + Send + 'static>;

/// Creates named OS threads for the pool.
pub trait ThreadSpawner: Send + Sync {
    fn spawn(&self, name: String, body: WorkerBody) -> io::Result<JoinHandle<u64>>;
}

/// Spawns plain [`std::thread`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSpawner;

impl ThreadSpawner for OsSpawner {
    fn spawn(&self, name: String, body: WorkerBody) -> io::Result<JoinHandle<u64>> {
        thread::Builder::new().name(name).spawn(body)
    }
}
