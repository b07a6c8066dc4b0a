//! Integration tests for failure detection and recovery.
//!
//! Time is driven explicitly: every heartbeat and detection tick carries its
//! own timestamp in milliseconds.

use std::collections::BTreeMap;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_ward::config::FaultConfig;
use prometheus_ward::core::{ActorLifecycle, EngineError, PersistedState, StateStore};
use prometheus_ward::fault::{FaultToleranceManager, HealthStatus};
use prometheus_ward::infra::{InMemoryLifecycle, InMemoryStateStore, JsonFileStore};
use serde_json::{json, Value};

/// Lifecycle whose spawns never complete.
struct StuckLifecycle;

#[async_trait]
impl ActorLifecycle for StuckLifecycle {
    async fn spawn(
        &self,
        _name: &str,
        _actor_type: &str,
        _args: &[Value],
    ) -> Result<(), EngineError> {
        pending().await
    }
}

fn manager(store: Arc<dyn StateStore>, lifecycle: &InMemoryLifecycle) -> FaultToleranceManager {
    FaultToleranceManager::new(FaultConfig::default(), store, Arc::new(lifecycle.clone()))
}

fn room_state(owner: &str) -> PersistedState {
    let mut snapshot = BTreeMap::new();
    snapshot.insert("occupied".to_string(), json!(false));
    PersistedState {
        owner: owner.into(),
        actor_type: "RoomAgent".into(),
        args: vec![json!(owner), json!("SURGERY"), json!(2)],
        snapshot,
        saved_at_ms: 0,
    }
}

#[tokio::test]
async fn test_silent_room_is_recovered_from_snapshot() {
    let lifecycle = InMemoryLifecycle::new();
    let mut m = manager(Arc::new(InMemoryStateStore::new()), &lifecycle);
    let mut notices = m.subscribe();

    m.on_register("R7", "RoomAgent", 0);
    m.on_state_snapshot(room_state("R7"), 0);
    m.on_heartbeat("R7", 5_000);
    m.on_heartbeat("R7", 10_000);

    assert!(m.detection_tick(15_000).await.suspected.is_empty());

    let report = m.detection_tick(20_001).await;
    assert_eq!(report.suspected, vec!["R7".to_string()]);
    assert_eq!(m.record("R7").unwrap().status, HealthStatus::Suspected);

    let report = m.detection_tick(26_000).await;
    assert_eq!(report.failed, vec!["R7".to_string()]);
    assert_eq!(
        report.recovered,
        vec![("R7".to_string(), "R7_recovered_26000".to_string())]
    );

    let spawns = lifecycle.spawns();
    assert_eq!(spawns.len(), 1);
    assert_eq!(spawns[0].actor_type, "RoomAgent");
    assert_eq!(spawns[0].args, vec![json!("R7"), json!("SURGERY"), json!(2)]);

    let record = m.record("R7").unwrap();
    assert_eq!(record.status, HealthStatus::Recovered);
    assert_eq!(record.recovery_count, 1);

    let notice = notices.try_recv().expect("recovery notice");
    assert_eq!(notice.failed, "R7");
    assert_eq!(notice.replacement, "R7_recovered_26000");
}

#[tokio::test]
async fn test_failure_is_reported_once() {
    let lifecycle = InMemoryLifecycle::new();
    lifecycle.fail_next(1);
    let mut m = manager(Arc::new(InMemoryStateStore::new()), &lifecycle);
    m.on_register("D1", "DoctorAgent", 0);

    let first = m.detection_tick(16_000).await;
    assert_eq!(first.failed, vec!["D1".to_string()]);
    assert_eq!(first.recovery_failures, vec!["D1".to_string()]);

    // Retry is not due before the backoff elapses.
    let early = m.detection_tick(16_500).await;
    assert!(early.failed.is_empty());
    assert!(early.recovery_failures.is_empty());
    assert_eq!(lifecycle.spawns().len(), 1);

    let retry = m.detection_tick(17_000).await;
    assert!(retry.failed.is_empty());
    assert_eq!(retry.recovered.len(), 1);
    assert_eq!(lifecycle.successful_spawns().len(), 1);
}

#[tokio::test]
async fn test_recovery_escalates_after_repeated_failures() {
    let lifecycle = InMemoryLifecycle::new();
    lifecycle.fail_next(4);
    let mut m = manager(Arc::new(InMemoryStateStore::new()), &lifecycle);
    m.on_register("E1", "EquipmentAgent", 0);

    // Backoff doubles from one second: retries at +1s, +2s, +4s.
    for at in [16_000, 17_000, 19_000] {
        let report = m.detection_tick(at).await;
        assert!(report.escalated.is_empty(), "escalated too early at {at}");
    }
    let report = m.detection_tick(23_000).await;
    assert_eq!(report.escalated, vec!["E1".to_string()]);

    let record = m.record("E1").unwrap();
    assert!(record.escalated);
    assert_eq!(record.failed_recovery_count, 4);
    assert_eq!(lifecycle.spawns().len(), 4);

    m.detection_tick(60_000).await;
    assert_eq!(lifecycle.spawns().len(), 4);

    assert!(m.reset_escalation("E1"));
    let report = m.detection_tick(61_000).await;
    assert_eq!(report.recovered.len(), 1);
    assert_eq!(m.record("E1").unwrap().status, HealthStatus::Recovered);
}

#[tokio::test]
async fn test_system_failure_when_most_actors_fail() {
    let lifecycle = InMemoryLifecycle::new();
    lifecycle.fail_next(100);
    let mut m = manager(Arc::new(InMemoryStateStore::new()), &lifecycle);
    for actor in ["A", "B", "C"] {
        m.on_register(actor, "DoctorAgent", 0);
    }
    m.on_heartbeat("A", 14_000);

    let report = m.detection_tick(16_000).await;
    assert_eq!(report.failed.len(), 2);
    assert!(report.system_failure);
    assert!(m.system_failure());

    m.on_heartbeat("B", 16_100);
    let report = m.detection_tick(16_200).await;
    assert!(!report.system_failure);
    assert_eq!(m.record("B").unwrap().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_unknown_type_is_filled_from_snapshot() {
    let lifecycle = InMemoryLifecycle::new();
    let mut m = manager(Arc::new(InMemoryStateStore::new()), &lifecycle);
    m.on_heartbeat("R2", 0);
    assert_eq!(m.record("R2").unwrap().actor_type, "Unknown");

    m.on_state_snapshot(room_state("R2"), 100);
    assert_eq!(m.record("R2").unwrap().actor_type, "RoomAgent");
    assert_eq!(m.persisted_state("R2").unwrap().saved_at_ms, 100);
}

#[tokio::test]
async fn test_state_survives_restart_through_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StateStore> =
        Arc::new(JsonFileStore::new(dir.path(), "agent_states.json").unwrap());

    let lifecycle = InMemoryLifecycle::new();
    let mut first = manager(Arc::clone(&store), &lifecycle);
    first.on_state_snapshot(room_state("R7"), 500);
    first.flush().unwrap();
    assert!(dir.path().join("agent_states.json").exists());
    assert!(!dir.path().join("agent_states.json.tmp").exists());

    let mut second = manager(store, &lifecycle);
    let restored = second.persisted_state("R7").expect("state reloaded");
    assert_eq!(restored.snapshot["occupied"], json!(false));
    assert_eq!(restored.saved_at_ms, 500);

    second.on_heartbeat("R7", 1_000);
    assert_eq!(second.record("R7").unwrap().actor_type, "RoomAgent");
    second.detection_tick(17_000).await;
    assert_eq!(
        lifecycle.spawns()[0].args,
        vec![json!("R7"), json!("SURGERY"), json!(2)]
    );
}

#[tokio::test]
async fn test_stuck_spawn_times_out_and_escalates() {
    let mut m = FaultToleranceManager::new(
        FaultConfig {
            recovery_timeout_ms: 50,
            ..FaultConfig::default()
        },
        Arc::new(InMemoryStateStore::new()),
        Arc::new(StuckLifecycle),
    );
    m.on_register("R7", "RoomAgent", 0);

    let report = tokio::time::timeout(Duration::from_secs(2), m.detection_tick(16_000))
        .await
        .expect("detection tick must not hang on a stuck spawn");
    assert_eq!(report.failed, vec!["R7".to_string()]);
    assert_eq!(report.recovery_failures, vec!["R7".to_string()]);
    assert!(report.recovered.is_empty());

    let record = m.record("R7").unwrap();
    assert_eq!(record.status, HealthStatus::Failed);
    assert_eq!(record.failed_recovery_count, 1);

    // Timed-out attempts count toward escalation like any failed spawn.
    let mut escalated = Vec::new();
    for at in [17_000, 19_000, 23_000] {
        let report = tokio::time::timeout(Duration::from_secs(2), m.detection_tick(at))
            .await
            .expect("detection tick must not hang on a stuck spawn");
        escalated = report.escalated;
    }
    assert_eq!(escalated, vec!["R7".to_string()]);
    assert!(m.record("R7").unwrap().escalated);

    m.on_heartbeat("R7", 24_000);
    assert_eq!(m.record("R7").unwrap().status, HealthStatus::Healthy);
}
