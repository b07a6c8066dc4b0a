//! Tests for configuration validation

use prometheus_ward::config::{
    BalancerConfig, CoordinatorConfig, EngineConfig, FaultConfig, PredictorConfig,
};

#[test]
fn test_coordinator_config_validation() {
    assert!(CoordinatorConfig::default().validate().is_ok());

    let invalid = CoordinatorConfig {
        max_queue_depth: 0,
        ..CoordinatorConfig::default()
    };
    assert!(invalid.validate().is_err());

    let invalid = CoordinatorConfig {
        reply_timeout_ms: 0,
        ..CoordinatorConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_balancer_config_validation() {
    assert!(BalancerConfig::default().validate().is_ok());
    let invalid = BalancerConfig {
        rebalance_interval_ms: 0,
        ..BalancerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_fault_config_validation() {
    let cfg = FaultConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.heartbeat_interval_ms, 5_000);
    assert_eq!(cfg.failure_threshold_ms, 15_000);
    assert_eq!(cfg.suspicion_window_ms(), 10_000);

    let invalid = FaultConfig {
        state_file: "  ".into(),
        ..FaultConfig::default()
    };
    assert!(invalid.validate().is_err());

    assert_eq!(cfg.recovery_timeout_ms, 5_000);
    let invalid = FaultConfig {
        recovery_timeout_ms: 0,
        ..FaultConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_predictor_config_validation() {
    assert!(PredictorConfig::default().validate().is_ok());
    let invalid = PredictorConfig {
        learning_rate: f64::NAN,
        ..PredictorConfig::default()
    };
    assert!(invalid.validate().is_err());
    let invalid = PredictorConfig {
        window_size: 0,
        ..PredictorConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_engine_config_from_json_fills_defaults() {
    let cfg = EngineConfig::from_json_str(
        r#"{
            "coordinator": { "max_queue_depth": 5, "reply_timeout_ms": 100 },
            "balancer": { "strategy": "least_loaded" },
            "predictor": { "seed": 7 }
        }"#,
    )
    .expect("valid config");
    assert_eq!(cfg.coordinator.max_queue_depth, 5);
    assert_eq!(cfg.coordinator.reply_timeout_ms, 100);
    assert_eq!(cfg.coordinator.dispatch_interval_ms, 5_000);
    assert_eq!(cfg.balancer.strategy, "least_loaded");
    assert_eq!(cfg.predictor.seed, Some(7));
    assert_eq!(cfg.fault, FaultConfig::default());
}

#[test]
fn test_engine_config_from_json_rejects_invalid() {
    let err = EngineConfig::from_json_str(r#"{ "coordinator": { "max_queue_depth": 0 } }"#)
        .unwrap_err();
    assert!(err.starts_with("coordinator invalid"));

    let err = EngineConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_state_dir_override() {
    let mut cfg = EngineConfig::default();
    cfg.apply_overrides(|key| match key {
        "WARD_STATE_DIR" => Some("/var/lib/ward".into()),
        "WARD_COMPENSATE_ON_FAILURE" => Some("false".into()),
        _ => None,
    })
    .expect("overrides apply");
    assert_eq!(cfg.fault.state_dir.as_deref(), Some("/var/lib/ward"));
    assert!(!cfg.coordinator.compensate_on_failure);
}
