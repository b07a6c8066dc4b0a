//! Tests for error display and conversions

use prometheus_ward::core::{AppResult, EngineError};

#[test]
fn test_engine_error_display() {
    let err = EngineError::QueueFull("max depth 3".into());
    assert_eq!(err.to_string(), "queue full: max depth 3");

    let err = EngineError::InvalidState {
        id: 9,
        expected: "IN_PROGRESS",
        actual: "WAITING",
    };
    assert_eq!(err.to_string(), "request 9 is WAITING, expected IN_PROGRESS");

    let err = EngineError::InvalidUrgency(7);
    assert_eq!(err.to_string(), "invalid urgency 7, expected 1..=5");

    let err = EngineError::ChannelClosed("balancer");
    assert_eq!(err.to_string(), "channel closed: balancer");
}

#[test]
fn test_engine_error_into_app_result() {
    fn fails() -> AppResult<()> {
        Err(EngineError::Storage("disk full".into()))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert_eq!(err.to_string(), "storage error: disk full");
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::Storage(_))
    ));
}
