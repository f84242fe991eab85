use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::context::{AtomicContext, ProcessContext};
use crate::stop::StopToken;
use crate::wait::{WaitOutcome, WaitQueue};

#[test]
fn wait_times_out_when_condition_stays_false() {
    let ctx = ProcessContext::enter();
    let queue = WaitQueue::new();
    let started = Instant::now();

    let outcome = queue.wait_timeout(&ctx, || false, Duration::from_millis(30));

    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[test]
fn wait_returns_immediately_when_condition_holds() {
    let ctx = ProcessContext::enter();
    let queue = WaitQueue::new();
    let outcome = queue.wait_timeout(&ctx, || true, Duration::from_secs(10));
    assert!(outcome.is_signaled());
}

#[test]
fn notify_wakes_waiter_before_timeout() {
    let queue = Arc::new(WaitQueue::new());
    let flag = Arc::new(AtomicBool::new(false));

    let waiter = {
        let queue = Arc::clone(&queue);
        let flag = Arc::clone(&flag);
        thread::spawn(move || {
            let ctx = ProcessContext::enter();
            let started = Instant::now();
            let outcome =
                queue.wait_timeout(&ctx, || flag.load(Ordering::Acquire), Duration::from_secs(10));
            (outcome, started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(20));
    flag.store(true, Ordering::Release);
    queue.notify_all();

    let (outcome, elapsed) = waiter.join().unwrap();
    assert_eq!(outcome, WaitOutcome::Signaled);
    assert!(elapsed < Duration::from_secs(5));
}

#[test]
fn notify_from_atomic_section_wakes_waiter() {
    let queue = Arc::new(WaitQueue::new());
    let flag = Arc::new(AtomicBool::new(false));

    let waiter = {
        let queue = Arc::clone(&queue);
        let flag = Arc::clone(&flag);
        thread::spawn(move || {
            let ctx = ProcessContext::enter();
            queue.wait_timeout(&ctx, || flag.load(Ordering::Acquire), Duration::from_secs(10))
        })
    };

    thread::sleep(Duration::from_millis(20));
    AtomicContext::enter(|_ctx| {
        flag.store(true, Ordering::Release);
        queue.notify_one();
    });

    assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled);
}

#[test]
fn stop_token_interrupts_periodic_wait() {
    let token = StopToken::new();
    let worker = {
        let token = Arc::clone(&token);
        thread::spawn(move || {
            let ctx = ProcessContext::enter();
            let mut cycles = 0u32;
            while !token.wait_timeout(&ctx, Duration::from_secs(5)).is_signaled() {
                cycles += 1;
            }
            cycles
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(token.request_stop());
    assert!(!token.request_stop());
    assert_eq!(worker.join().unwrap(), 0);
    assert!(token.is_stopped());
}
