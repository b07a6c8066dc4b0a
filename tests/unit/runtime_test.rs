//! Tests for the tokio spawner and component services

use std::sync::Arc;
use std::time::Duration;

use prometheus_ward::balancer::{LoadBalancer, SelectionContext};
use prometheus_ward::config::{BalancerConfig, CoordinatorConfig, PredictorConfig};
use prometheus_ward::coordinator::{AllocationCoordinator, CoordinatorEvent};
use prometheus_ward::core::{
    Category, EngineError, Request, RequestStatus, ResourceKind, Spawn, Specialization,
};
use prometheus_ward::infra::{InMemoryDirectory, InMemoryMailbox, InMemoryQueue, LocalResource};
use prometheus_ward::predictor::{PredictionInput, WaitTimePredictor};
use prometheus_ward::runtime::{spawn_balancer, spawn_coordinator, spawn_predictor, TokioSpawner};
use prometheus_ward::util::serde::Urgency;
use tokio::sync::watch;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::current().expect("inside a runtime");

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_tokio_spawner_requires_runtime() {
    assert!(TokioSpawner::current().is_err());
}

#[tokio::test]
async fn test_balancer_service_tracks_events() {
    let balancer = LoadBalancer::new(BalancerConfig {
        strategy: "least_loaded".into(),
        ..BalancerConfig::default()
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, task) = spawn_balancer(balancer, shutdown_rx);
    handle.register("D1", ResourceKind::Doctor).await.unwrap();
    handle.register("D2", ResourceKind::Doctor).await.unwrap();

    handle
        .event(CoordinatorEvent::Assigned {
            resource_id: "D1".into(),
            kind: ResourceKind::Doctor,
            request_id: 1,
        })
        .await
        .unwrap();
    let picked = handle
        .select(
            ResourceKind::Doctor,
            SelectionContext::for_request(9, Urgency::new(3).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(picked.as_deref(), Some("D2"));

    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.instances.len(), 2);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_predictor_service_answers_with_interval() {
    let predictor = WaitTimePredictor::new(&PredictorConfig {
        seed: Some(3),
        ..PredictorConfig::default()
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, task) =
        spawn_predictor(predictor, std::time::Duration::from_secs(60), shutdown_rx);

    let prediction = handle
        .predict(PredictionInput {
            urgency: Urgency::new(3).unwrap(),
            queue_size: 4,
            hour_of_day: 10,
            availability: 0.5,
        })
        .await
        .unwrap();
    assert!(prediction.wait >= 1.0);
    assert!(prediction.lower <= prediction.wait && prediction.wait <= prediction.upper);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_coordinator_service_submits_dispatches_and_completes() {
    let directory = InMemoryDirectory::new();
    directory.register(LocalResource::doctor("D1", Specialization::General));
    directory.register(LocalResource::room("R1", 1));
    let config = CoordinatorConfig {
        dispatch_interval_ms: 10,
        reply_timeout_ms: 200,
        ..CoordinatorConfig::default()
    };
    let coordinator = AllocationCoordinator::new(
        config.clone(),
        InMemoryQueue::new(config.max_queue_depth),
        InMemoryMailbox::new(),
        Arc::new(directory),
        TokioSpawner::current().expect("inside a runtime"),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, task) = spawn_coordinator(coordinator, None, shutdown_rx);

    let request = Request::new(1, "P1", Category::Checkup, Urgency::new(3).unwrap(), 0);
    assert_eq!(handle.submit(request.clone()).await.unwrap(), 1);
    assert!(matches!(
        handle.submit(request).await,
        Err(EngineError::DuplicateRequest(1))
    ));

    let mut stats = handle.stats().await.unwrap();
    for _ in 0..200 {
        if stats.successful_allocations == 1 && stats.in_flight == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        stats = handle.stats().await.unwrap();
    }
    assert_eq!(stats.successful_allocations, 1);
    assert_eq!(stats.queue_length, 0);

    let done = handle.complete(1, 60_000).await.unwrap();
    assert_eq!(done.status, RequestStatus::Completed);
    assert!(matches!(
        handle.complete(1, 61_000).await,
        Err(EngineError::UnknownRequest(1))
    ));

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}
