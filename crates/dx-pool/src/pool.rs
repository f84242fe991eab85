//! Worker pool lifecycle.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use dx_sync::{CounterView, ProcessContext, SharedCounter, StopToken};
use log::{error, info, warn};

use crate::error::PoolError;
use crate::spawner::{OsSpawner, ThreadSpawner};
use crate::worker::{worker_name, StartGate, Worker};

/// Builder for a [`WorkerPool`].
pub struct WorkerPoolBuilder {
    size: usize,
    period: Duration,
    counter: Option<Arc<SharedCounter>>,
    spawner: Arc<dyn ThreadSpawner>,
}

impl Default for WorkerPoolBuilder {
    fn default() -> Self {
        Self {
            size: 5,
            period: Duration::from_millis(5000),
            counter: None,
            spawner: Arc::new(OsSpawner),
        }
    }
}

impl WorkerPoolBuilder {
    /// Number of workers.
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Sleep between two cycles of one worker.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Counter shared by the workers. A fresh one is created if unset.
    pub fn counter(mut self, counter: Arc<SharedCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn spawner(mut self, spawner: Arc<dyn ThreadSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Creates every worker, then lets them all run.
    ///
    /// If creating worker `i` fails, workers `0..i` are stopped and joined
    /// before the error is returned; none of them will have run a cycle.
    pub fn start(self) -> Result<WorkerPool, PoolError> {
        let counter = self.counter.unwrap_or_else(SharedCounter::new);
        let stop = StopToken::new();
        let gate = StartGate::new();

        let mut handles: Vec<(usize, JoinHandle<u64>)> = Vec::new();
        handles.try_reserve_exact(self.size)?;

        for index in 0..self.size {
            let worker = Worker {
                period: self.period,
                counter: Arc::clone(&counter),
                stop: Arc::clone(&stop),
                gate: Arc::clone(&gate),
            };
            match self.spawner.spawn(worker_name(index), Box::new(move || worker.run())) {
                Ok(handle) => handles.push((index, handle)),
                Err(source) => {
                    error!("error while creating worker {index}: {source}");
                    gate.abort();
                    stop.request_stop();
                    for (started, handle) in handles {
                        if handle.join().is_err() {
                            error!("worker {started} panicked during rollback");
                        }
                    }
                    return Err(PoolError::Spawn { index, source });
                }
            }
        }

        gate.open();
        info!("{} workers were created and woken up", handles.len());
        Ok(WorkerPool {
            handles,
            counter,
            stop,
        })
    }
}

/// Running pool of periodic workers.
pub struct WorkerPool {
    handles: Vec<(usize, JoinHandle<u64>)>,
    counter: Arc<SharedCounter>,
    stop: Arc<StopToken>,
}

impl WorkerPool {
    pub fn builder() -> WorkerPoolBuilder {
        WorkerPoolBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn counter(&self) -> CounterView {
        self.counter.view()
    }

    /// Signals every worker and joins them in index order.
    ///
    /// Returns the number of cycles each worker completed. A worker that
    /// panicked is reported with zero cycles.
    pub fn stop(mut self, _ctx: &ProcessContext) -> Vec<u64> {
        let cycles = self.join_all();
        info!("workers were stopped, counter at {}", self.counter.get());
        cycles
    }

    fn join_all(&mut self) -> Vec<u64> {
        self.stop.request_stop();
        self.handles
            .drain(..)
            .map(|(index, handle)| {
                handle.join().unwrap_or_else(|_| {
                    warn!("worker {index} panicked");
                    0
                })
            })
            .collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.join_all();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.len())
            .field("counter", &self.counter.get())
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}
