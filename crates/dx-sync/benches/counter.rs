use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};
use dx_sync::SharedCounter;

fn uncontended(c: &mut Criterion) {
    let counter = SharedCounter::new();
    c.bench_function("counter_increment_uncontended", |b| {
        b.iter(|| counter.increment())
    });
}

fn contended(c: &mut Criterion) {
    c.bench_function("counter_increment_4_threads", |b| {
        b.iter(|| {
            let counter = SharedCounter::new();
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    thread::spawn(move || {
                        for _ in 0..1_000 {
                            counter.increment();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            counter.get()
        })
    });
}

criterion_group!(benches, uncontended, contended);
criterion_main!(benches);
