use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dx_sync::{ProcessContext, SharedCounter};

use super::CountingSpawner;
use crate::error::PoolError;
use crate::pool::WorkerPool;

#[test]
fn counter_equals_sum_of_worker_cycles() {
    let ctx = ProcessContext::enter();
    let pool = WorkerPool::builder()
        .size(5)
        .period(Duration::from_millis(15))
        .start()
        .expect("pool should start");
    assert_eq!(pool.len(), 5);
    let view = pool.counter();

    thread::sleep(Duration::from_millis(120));
    let cycles = pool.stop(&ctx);

    assert_eq!(cycles.len(), 5);
    assert!(cycles.iter().all(|&c| c >= 1));
    assert_eq!(cycles.iter().sum::<u64>(), view.get());
}

#[test]
fn stop_interrupts_long_period() {
    let ctx = ProcessContext::enter();
    let counter = SharedCounter::new();
    let pool = WorkerPool::builder()
        .size(3)
        .period(Duration::from_secs(30))
        .counter(Arc::clone(&counter))
        .start()
        .expect("pool should start");

    let view = pool.counter();
    let deadline = Instant::now() + Duration::from_secs(2);
    while view.get() < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }

    let started = Instant::now();
    let cycles = pool.stop(&ctx);

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(cycles, vec![1, 1, 1]);
    assert_eq!(counter.get(), 3);
}

#[test]
fn failure_at_index_three_rolls_back_started_workers() {
    let spawner = Arc::new(CountingSpawner {
        fail_at: Some(3),
        ..CountingSpawner::default()
    });
    let counter = SharedCounter::new();

    let result = WorkerPool::builder()
        .size(5)
        .period(Duration::from_millis(5))
        .counter(Arc::clone(&counter))
        .spawner(spawner.clone())
        .start();

    match result {
        Err(PoolError::Spawn { index, .. }) => assert_eq!(index, 3),
        other => panic!("expected spawn failure, got {other:?}"),
    }
    assert_eq!(spawner.calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        spawner.names.lock().unwrap().as_slice(),
        &["thread/0", "thread/1", "thread/2"]
    );
    assert_eq!(spawner.alive.load(Ordering::SeqCst), 0);
    assert_eq!(counter.get(), 0);
}

#[test]
fn workers_wait_until_pool_is_complete() {
    struct SlowSpawner {
        inner: CountingSpawner,
        counter: Arc<SharedCounter>,
        seen: std::sync::Mutex<Vec<u64>>,
    }

    impl crate::spawner::ThreadSpawner for SlowSpawner {
        fn spawn(
            &self,
            name: String,
            body: crate::spawner::WorkerBody,
        ) -> std::io::Result<thread::JoinHandle<u64>> {
            thread::sleep(Duration::from_millis(20));
            self.seen.lock().unwrap().push(self.counter.get());
            self.inner.spawn(name, body)
        }
    }

    let ctx = ProcessContext::enter();
    let counter = SharedCounter::new();
    let spawner = Arc::new(SlowSpawner {
        inner: CountingSpawner::default(),
        counter: Arc::clone(&counter),
        seen: std::sync::Mutex::new(Vec::new()),
    });

    let pool = WorkerPool::builder()
        .size(4)
        .period(Duration::from_secs(30))
        .counter(Arc::clone(&counter))
        .spawner(spawner.clone())
        .start()
        .expect("pool should start");
    let cycles = pool.stop(&ctx);

    assert_eq!(spawner.seen.lock().unwrap().as_slice(), &[0, 0, 0, 0]);
    assert_eq!(cycles.iter().sum::<u64>(), counter.get());
}

#[test]
fn unidentifiable_worker_keeps_running() {
    let ctx = ProcessContext::enter();
    let spawner = Arc::new(CountingSpawner {
        rename: Some("rogue"),
        ..CountingSpawner::default()
    });

    let pool = WorkerPool::builder()
        .size(2)
        .period(Duration::from_millis(10))
        .spawner(spawner.clone())
        .start()
        .expect("pool should start");
    thread::sleep(Duration::from_millis(60));
    let cycles = pool.stop(&ctx);

    assert!(cycles.iter().all(|&c| c >= 2));
    assert_eq!(spawner.alive.load(Ordering::SeqCst), 0);
}

#[test]
fn oversized_pool_reports_allocation_failure() {
    let result = WorkerPool::builder().size(usize::MAX).start();
    assert!(matches!(result, Err(PoolError::Alloc(_))));
}

#[test]
fn dropping_pool_stops_workers() {
    let spawner = Arc::new(CountingSpawner::default());
    {
        let _pool = WorkerPool::builder()
            .size(3)
            .period(Duration::from_secs(30))
            .spawner(spawner.clone())
            .start()
            .expect("pool should start");
    }
    assert_eq!(spawner.alive.load(Ordering::SeqCst), 0);
}
