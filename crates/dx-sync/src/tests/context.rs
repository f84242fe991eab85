use crate::context::{in_atomic, might_sleep, AtomicContext, ProcessContext};
use crate::lock::SpinLock;

#[test]
fn atomic_scope_is_tracked_and_restored() {
    assert!(!in_atomic());
    AtomicContext::enter(|_ctx| {
        assert!(in_atomic());
        AtomicContext::enter(|_nested| assert!(in_atomic()));
        assert!(in_atomic());
    });
    assert!(!in_atomic());
}

#[test]
fn holding_spin_lock_counts_as_atomic() {
    let lock = SpinLock::new(7u32);
    {
        let mut guard = lock.lock();
        *guard += 1;
        assert!(in_atomic());
    }
    assert!(!in_atomic());
    assert_eq!(lock.into_inner(), 8);
}

#[test]
fn try_lock_fails_while_held() {
    let lock = SpinLock::new(());
    let guard = lock.lock();
    assert!(lock.try_lock().is_none());
    drop(guard);
    assert!(lock.try_lock().is_some());
    assert!(!in_atomic());
}

#[test]
fn process_context_available_outside_atomic_sections() {
    let _ctx = ProcessContext::enter();
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "blocking operation attempted from atomic context")]
fn process_context_rejected_inside_atomic_section() {
    AtomicContext::enter(|_ctx| {
        let _ = ProcessContext::enter();
    });
}

#[cfg(not(debug_assertions))]
#[test]
fn might_sleep_inside_atomic_section_only_warns_in_release() {
    AtomicContext::enter(|_ctx| {
        might_sleep();
        assert!(in_atomic());
    });
    assert!(!in_atomic());
}
