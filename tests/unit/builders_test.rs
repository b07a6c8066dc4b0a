//! Tests for the engine builder

use std::collections::BTreeMap;
use std::sync::Arc;

use prometheus_ward::builders::EngineBuilder;
use prometheus_ward::config::EngineConfig;
use prometheus_ward::core::{EngineError, PersistedState, StateStore};
use prometheus_ward::infra::{InMemoryDirectory, InMemoryStateStore, JsonFileStore};
use prometheus_ward::util::clock::now_ms;
use serde_json::json;

fn snapshot(owner: &str) -> PersistedState {
    PersistedState {
        owner: owner.into(),
        actor_type: "RoomAgent".into(),
        args: vec![json!("R7"), json!(2)],
        snapshot: BTreeMap::new(),
        saved_at_ms: 0,
    }
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let mut cfg = EngineConfig::default();
    cfg.coordinator.max_queue_depth = 0;
    let result = EngineBuilder::new(cfg, Arc::new(InMemoryDirectory::new())).build();
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[tokio::test]
async fn test_uses_supplied_store_and_flushes_on_shutdown() {
    let store = InMemoryStateStore::new();
    let engine = EngineBuilder::new(EngineConfig::default(), Arc::new(InMemoryDirectory::new()))
        .store(Arc::new(store.clone()))
        .build()
        .expect("engine builds");

    engine.fault.snapshot(snapshot("R7"), now_ms()).await.unwrap();
    engine.fault.flush().await.unwrap();
    assert_eq!(store.load().unwrap()["R7"].args, vec![json!("R7"), json!(2)]);

    let before = store.save_count();
    engine.shutdown().await;
    assert!(store.save_count() > before);
}

#[tokio::test]
async fn test_state_dir_selects_json_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = EngineConfig::default();
    cfg.fault.state_dir = Some(dir.path().to_string_lossy().into_owned());

    let engine = EngineBuilder::new(cfg, Arc::new(InMemoryDirectory::new()))
        .build()
        .expect("engine builds");
    engine.fault.snapshot(snapshot("R7"), now_ms()).await.unwrap();
    engine.fault.flush().await.unwrap();
    engine.shutdown().await;

    let file = JsonFileStore::at(dir.path().join("agent_states.json"));
    let states = file.load().unwrap();
    assert_eq!(states["R7"].actor_type, "RoomAgent");
}

#[tokio::test]
async fn test_handles_fail_after_shutdown() {
    let engine = EngineBuilder::new(EngineConfig::default(), Arc::new(InMemoryDirectory::new()))
        .build()
        .expect("engine builds");
    let coordinator = engine.coordinator.clone();
    engine.shutdown().await;
    assert!(matches!(
        coordinator.stats().await,
        Err(EngineError::ChannelClosed("coordinator"))
    ));
}

#[tokio::test]
async fn test_migration_hints_are_opt_in() {
    let mut engine =
        EngineBuilder::new(EngineConfig::default(), Arc::new(InMemoryDirectory::new()))
            .build()
            .expect("engine builds");
    assert!(engine.take_migrations().is_none());
    engine.shutdown().await;

    let mut engine =
        EngineBuilder::new(EngineConfig::default(), Arc::new(InMemoryDirectory::new()))
            .migrations(8)
            .build()
            .expect("engine builds");
    assert!(engine.take_migrations().is_some());
    assert!(engine.take_migrations().is_none());
    engine.shutdown().await;
}
