//! Tests for shared utilities

use prometheus_ward::core::EngineError;
use prometheus_ward::util::clock::{hour_of_day, now_ms};
use prometheus_ward::util::serde::Urgency;

#[test]
fn test_now_ms_advances() {
    let a = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = now_ms();
    assert!(b > a);
}

#[test]
fn test_hour_of_day_is_utc() {
    // 2024-01-01T10:30:00Z
    assert_eq!(hour_of_day(1_704_105_000_000), 10);
}

#[test]
fn test_urgency_bounds() {
    assert_eq!(Urgency::new(1).unwrap(), Urgency::MIN);
    assert_eq!(Urgency::new(5).unwrap(), Urgency::MAX);
    assert!(matches!(Urgency::new(0), Err(EngineError::InvalidUrgency(0))));
    assert!(matches!(Urgency::new(6), Err(EngineError::InvalidUrgency(6))));
    assert!(Urgency::MAX > Urgency::new(3).unwrap());
}

#[test]
fn test_urgency_serde_validates() {
    let ok: Urgency = serde_json::from_str("4").unwrap();
    assert_eq!(ok.level(), 4);
    assert!(serde_json::from_str::<Urgency>("9").is_err());
    assert_eq!(serde_json::to_string(&Urgency::MAX).unwrap(), "5");
}

#[test]
fn test_init_tracing_is_idempotent() {
    prometheus_ward::util::telemetry::init_tracing();
    prometheus_ward::util::telemetry::init_tracing();
    tracing::info!("tracing initialised twice without panicking");
}
