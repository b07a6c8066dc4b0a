//! Builder wiring the four components into running services.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::balancer::{LoadBalancer, MigrationHint};
use crate::config::EngineConfig;
use crate::coordinator::AllocationCoordinator;
use crate::core::{ActorLifecycle, Directory, EngineError, SharedMetricsSink, StateStore};
use crate::fault::FaultToleranceManager;
use crate::infra::{InMemoryLifecycle, InMemoryMailbox, InMemoryQueue, InMemoryStateStore, JsonFileStore};
use crate::predictor::WaitTimePredictor;
use crate::runtime::{
    spawn_balancer, spawn_coordinator, spawn_event_router, spawn_fault_manager, spawn_predictor,
    BalancerHandle, CoordinatorHandle, FaultHandle, PredictorHandle, TokioSpawner,
};

/// Assembles an [`Engine`] from configuration and collaborators.
///
/// Only the directory is required. Without a state store the builder uses
/// [`JsonFileStore`] when `fault.state_dir` is set and an
/// [`InMemoryStateStore`] otherwise. Without a lifecycle it uses
/// [`InMemoryLifecycle`]. Rebalance hints are only kept when requested with
/// [`EngineBuilder::migrations`].
pub struct EngineBuilder {
    config: EngineConfig,
    directory: Arc<dyn Directory>,
    store: Option<Arc<dyn StateStore>>,
    lifecycle: Option<Arc<dyn ActorLifecycle>>,
    metrics: Option<SharedMetricsSink>,
    migrations: Option<usize>,
}

impl EngineBuilder {
    /// Start a builder over `directory`.
    pub fn new(config: EngineConfig, directory: Arc<dyn Directory>) -> Self {
        Self {
            config,
            directory,
            store: None,
            lifecycle: None,
            metrics: None,
            migrations: None,
        }
    }

    /// Persist actor state in `store`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Respawn failed actors through `lifecycle`.
    #[must_use]
    pub fn lifecycle(mut self, lifecycle: Arc<dyn ActorLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Publish every component's metrics to `sink`.
    #[must_use]
    pub fn metrics(mut self, sink: SharedMetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Keep up to `capacity` unread rebalance hints for
    /// [`Engine::take_migrations`]. Further hints are dropped until read.
    #[must_use]
    pub fn migrations(mut self, capacity: usize) -> Self {
        self.migrations = Some(capacity.max(1));
        self
    }

    /// Validate the configuration and spawn every service on the current
    /// tokio runtime.
    pub fn build(self) -> Result<Engine, EngineError> {
        self.config.validate().map_err(EngineError::Config)?;
        let spawner = TokioSpawner::current()?;
        let store: Arc<dyn StateStore> = match (self.store, &self.config.fault.state_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(JsonFileStore::new(dir, &self.config.fault.state_file)?),
            (None, None) => Arc::new(InMemoryStateStore::new()),
        };
        let lifecycle = self
            .lifecycle
            .unwrap_or_else(|| Arc::new(InMemoryLifecycle::new()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut fault = FaultToleranceManager::new(self.config.fault.clone(), store, lifecycle);
        let mut balancer = LoadBalancer::new(self.config.balancer.clone())
            .with_directory(Arc::clone(&self.directory));
        let mut migrations = None;
        if let Some(capacity) = self.migrations {
            let (tx, rx) = mpsc::channel::<MigrationHint>(capacity);
            balancer = balancer.with_migration_channel(tx);
            migrations = Some(rx);
        }
        let mut predictor = WaitTimePredictor::new(&self.config.predictor);
        let mut coordinator = AllocationCoordinator::new(
            self.config.coordinator.clone(),
            InMemoryQueue::new(self.config.coordinator.max_queue_depth),
            InMemoryMailbox::new(),
            Arc::clone(&self.directory),
            spawner,
        )
        .with_events(events_tx);
        if let Some(sink) = self.metrics {
            fault = fault.with_metrics(Arc::clone(&sink));
            balancer = balancer.with_metrics(Arc::clone(&sink));
            predictor = predictor.with_metrics(Arc::clone(&sink));
            coordinator = coordinator.with_metrics(sink);
        }
        let mailbox = coordinator.mailbox();
        let recoveries = fault.subscribe();

        let (fault, fault_task) = spawn_fault_manager(fault, shutdown_rx.clone());
        let (balancer, balancer_task) = spawn_balancer(balancer, shutdown_rx.clone());
        let (predictor, predictor_task) = spawn_predictor(
            predictor,
            self.config.coordinator.metrics_interval(),
            shutdown_rx.clone(),
        );
        let (coordinator, coordinator_task) =
            spawn_coordinator(coordinator, Some(recoveries), shutdown_rx);
        let router = spawn_event_router(events_rx, balancer.clone(), predictor.clone());

        tracing::info!("engine started");
        Ok(Engine {
            coordinator,
            balancer,
            fault,
            predictor,
            mailbox,
            migrations,
            shutdown: shutdown_tx,
            tasks: vec![coordinator_task, balancer_task, fault_task, predictor_task, router],
        })
    }
}

/// Running engine: one service task per component plus the event router.
pub struct Engine {
    /// Allocation coordinator.
    pub coordinator: CoordinatorHandle,
    /// Load balancer.
    pub balancer: BalancerHandle,
    /// Fault tolerance manager.
    pub fault: FaultHandle,
    /// Wait-time predictor.
    pub predictor: PredictorHandle,
    mailbox: Arc<Mutex<InMemoryMailbox>>,
    migrations: Option<mpsc::Receiver<MigrationHint>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Mailbox holding every allocation notice.
    pub fn mailbox(&self) -> Arc<Mutex<InMemoryMailbox>> {
        Arc::clone(&self.mailbox)
    }

    /// Take the receiver of rebalance hints. Returns `None` after the first
    /// call, or when the builder was not asked to keep hints.
    pub fn take_migrations(&mut self) -> Option<mpsc::Receiver<MigrationHint>> {
        self.migrations.take()
    }

    /// Stop every service and wait for them. The fault manager flushes state
    /// on the way out.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        // The router ends once the coordinator, the last event sender, is gone.
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "service task ended abnormally");
            }
        }
        tracing::info!("engine stopped");
    }
}
