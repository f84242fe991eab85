use crate::worker::{parse_worker_index, worker_name};

#[test]
fn names_round_trip_through_parser() {
    assert_eq!(worker_name(0), "thread/0");
    assert_eq!(worker_name(12), "thread/12");
    assert_eq!(parse_worker_index("thread/12"), Some(12));
}

#[test]
fn foreign_names_are_rejected() {
    assert_eq!(parse_worker_index("kworker/1"), None);
    assert_eq!(parse_worker_index("thread/"), None);
    assert_eq!(parse_worker_index("thread/x"), None);
    assert_eq!(parse_worker_index("thread/-1"), None);
}
