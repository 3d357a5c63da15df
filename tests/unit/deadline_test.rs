//! Tests for deadlines

use std::time::{Duration, Instant};

use prometheus_engine::core::Deadline;

#[test]
fn test_unreachable_deadline() {
    let deadline = Deadline::unreachable();
    assert!(!deadline.is_reachable());
    assert!(!deadline.is_reached());
    assert_eq!(deadline.time_left(), None);
}

#[test]
fn test_passed_deadline() {
    let deadline = Deadline::passed();
    assert!(deadline.is_reachable());
    assert!(deadline.is_reached());
    assert_eq!(deadline.time_left(), Some(Duration::ZERO));
}

#[test]
fn test_future_deadline_counts_down() {
    let deadline = Deadline::from_duration(Duration::from_secs(60));
    assert!(!deadline.is_reached());
    let left = deadline.time_left().unwrap();
    assert!(left <= Duration::from_secs(60));
    assert!(left > Duration::from_secs(50));
}

#[test]
fn test_from_instant_and_conversions() {
    let at = Instant::now() + Duration::from_secs(1);
    assert_eq!(Deadline::from_instant(at).instant(), Some(at));
    assert_eq!(Deadline::from(at), Deadline::from_instant(at));
    assert!(Deadline::from(Duration::from_secs(1)).is_reachable());
}
