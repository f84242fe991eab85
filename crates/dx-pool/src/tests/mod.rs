mod pool;
mod worker;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::spawner::{OsSpawner, ThreadSpawner, WorkerBody};

/// Spawner that can fail at a given call and tracks live threads.
#[derive(Default)]
pub(crate) struct CountingSpawner {
    pub fail_at: Option<usize>,
    pub rename: Option<&'static str>,
    pub calls: AtomicUsize,
    pub alive: Arc<AtomicUsize>,
    pub names: Mutex<Vec<String>>,
}

impl ThreadSpawner for CountingSpawner {
    fn spawn(&self, name: String, body: WorkerBody) -> io::Result<JoinHandle<u64>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(call) {
            return Err(io::Error::new(io::ErrorKind::Other, "out of threads"));
        }

        let name = self.rename.map(str::to_owned).unwrap_or(name);
        self.names.lock().unwrap().push(name.clone());
        let alive = Arc::clone(&self.alive);
        alive.fetch_add(1, Ordering::SeqCst);
        OsSpawner.spawn(
            name,
            Box::new(move || {
                let cycles = body();
                alive.fetch_sub(1, Ordering::SeqCst);
                cycles
            }),
        )
    }
}
