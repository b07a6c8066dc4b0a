//! Service tasks: each component runs in its own task, owns its state and
//! reacts to commands and periodic ticks.

use std::future::pending;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::balancer::LoadBalancer;
use crate::coordinator::{AllocationCoordinator, CoordinatorEvent};
use crate::core::{Mailbox, RequestQueue, Spawn};
use crate::fault::{FaultToleranceManager, RecoveryNotice};
use crate::predictor::WaitTimePredictor;
use crate::runtime::api::{
    BalancerCommand, BalancerHandle, CoordinatorCommand, CoordinatorHandle, FaultCommand,
    FaultHandle, Prediction, PredictorCommand, PredictorHandle,
};
use crate::util::clock::now_ms;

/// Capacity of every service command channel.
pub const COMMAND_CAPACITY: usize = 256;

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_notice(rx: &mut Option<broadcast::Receiver<RecoveryNotice>>) -> RecoveryNotice {
    loop {
        let Some(inner) = rx.as_mut() else {
            return pending().await;
        };
        match inner.recv().await {
            Ok(notice) => return notice,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "recovery notices dropped");
            }
            Err(broadcast::error::RecvError::Closed) => *rx = None,
        }
    }
}

/// Run the coordinator: dispatch every `dispatch_interval`, rediscover every
/// `discovery_interval` and whenever a recovery notice arrives.
pub fn spawn_coordinator<Q, M, S>(
    coordinator: AllocationCoordinator<Q, M, S>,
    recoveries: Option<broadcast::Receiver<RecoveryNotice>>,
    mut shutdown: watch::Receiver<bool>,
) -> (CoordinatorHandle, JoinHandle<()>)
where
    Q: RequestQueue + 'static,
    M: Mailbox + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel(COMMAND_CAPACITY);
    let mut recoveries = recoveries;
    let task = tokio::spawn(async move {
        let config = coordinator.config().clone();
        let mut dispatch = ticker(config.dispatch_interval());
        let mut discovery = ticker(config.discovery_interval());
        let mut metrics = ticker(config.metrics_interval());
        info!("coordinator service started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                cmd = rx.recv() => match cmd {
                    None => break,
                    Some(CoordinatorCommand::Submit { request, reply }) => {
                        let _ = reply.send(coordinator.submit(request));
                    }
                    Some(CoordinatorCommand::Complete { id, now_ms, reply }) => {
                        let coordinator = coordinator.clone();
                        tokio::spawn(async move {
                            let _ = reply.send(coordinator.on_completion(id, now_ms).await);
                        });
                    }
                    Some(CoordinatorCommand::Stats { reply }) => {
                        let _ = reply.send(coordinator.stats());
                    }
                    Some(CoordinatorCommand::Refresh) => {
                        coordinator.refresh_discovery();
                    }
                },
                _ = dispatch.tick() => {
                    coordinator.dispatch_tick(now_ms());
                }
                _ = discovery.tick() => {
                    coordinator.refresh_discovery();
                }
                _ = metrics.tick() => coordinator.publish_metrics(),
                notice = next_notice(&mut recoveries) => {
                    info!(failed = %notice.failed, replacement = %notice.replacement, "rediscovering after recovery");
                    coordinator.refresh_discovery();
                }
            }
        }
        info!("coordinator service stopped");
    });
    (CoordinatorHandle { tx }, task)
}

/// Run the balancer with its discovery, monitor, rebalance and metrics ticks.
pub fn spawn_balancer(
    mut balancer: LoadBalancer,
    mut shutdown: watch::Receiver<bool>,
) -> (BalancerHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(COMMAND_CAPACITY);
    let task = tokio::spawn(async move {
        let config = balancer.config().clone();
        let mut discovery = ticker(config.discovery_interval());
        let mut monitor = ticker(config.monitor_interval());
        let mut rebalance = ticker(config.rebalance_interval());
        let mut metrics = ticker(config.metrics_interval());
        // Intervals fire at once; skip the first rebalance so loads can build.
        rebalance.reset();
        info!(strategy = %balancer.strategy(), "balancer service started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                cmd = rx.recv() => match cmd {
                    None => break,
                    Some(cmd) => apply_balancer_command(&mut balancer, cmd),
                },
                _ = discovery.tick() => balancer.discover_all(),
                _ = monitor.tick() => balancer.monitor_tick(),
                _ = rebalance.tick() => {
                    let hints = balancer.rebalance();
                    if !hints.is_empty() {
                        debug!(hints = hints.len(), "rebalance produced migration hints");
                    }
                }
                _ = metrics.tick() => balancer.publish_metrics(),
            }
        }
        info!("balancer service stopped");
    });
    (BalancerHandle { tx }, task)
}

fn apply_balancer_command(balancer: &mut LoadBalancer, cmd: BalancerCommand) {
    match cmd {
        BalancerCommand::Select { kind, ctx, reply } => {
            let _ = reply.send(balancer.select(kind, &ctx));
        }
        BalancerCommand::Register { id, kind } => balancer.register_instance(id, kind),
        BalancerCommand::Event(CoordinatorEvent::Assigned {
            resource_id,
            kind,
            request_id,
        }) => balancer.record_assignment(&resource_id, kind, request_id),
        BalancerCommand::Event(CoordinatorEvent::Released { resource_id, .. }) => {
            balancer.record_release(&resource_id);
        }
        BalancerCommand::Event(CoordinatorEvent::WaitObserved(_)) => {}
        BalancerCommand::Rebalance { reply } => {
            let _ = reply.send(balancer.rebalance());
        }
        BalancerCommand::SetStrategy(kind) => balancer.set_strategy(kind),
        BalancerCommand::Metrics { reply } => {
            let _ = reply.send(balancer.metrics());
        }
    }
}

/// Run the fault manager: detection every heartbeat interval, state flush
/// every flush interval and once more on shutdown.
pub fn spawn_fault_manager(
    mut manager: FaultToleranceManager,
    mut shutdown: watch::Receiver<bool>,
) -> (FaultHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(COMMAND_CAPACITY);
    let task = tokio::spawn(async move {
        let config = manager.config().clone();
        let mut detection = ticker(config.heartbeat_interval());
        let mut flush = ticker(config.flush_interval());
        flush.reset();
        info!("fault manager service started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                cmd = rx.recv() => match cmd {
                    None => break,
                    Some(FaultCommand::Heartbeat { actor, now_ms }) => manager.on_heartbeat(&actor, now_ms),
                    Some(FaultCommand::Register { actor, actor_type, now_ms }) => {
                        manager.on_register(&actor, &actor_type, now_ms);
                    }
                    Some(FaultCommand::Snapshot { state, now_ms }) => manager.on_state_snapshot(state, now_ms),
                    Some(FaultCommand::Tick { now_ms, reply }) => {
                        let _ = reply.send(manager.detection_tick(now_ms).await);
                    }
                    Some(FaultCommand::Record { actor, reply }) => {
                        let _ = reply.send(manager.record(&actor).cloned());
                    }
                    Some(FaultCommand::ResetEscalation { actor }) => {
                        manager.reset_escalation(&actor);
                    }
                    Some(FaultCommand::Flush { reply }) => {
                        let _ = reply.send(manager.flush());
                    }
                },
                _ = detection.tick() => {
                    manager.detection_tick(now_ms()).await;
                    manager.publish_metrics();
                }
                _ = flush.tick() => {
                    let _ = manager.flush();
                }
            }
        }
        let _ = manager.flush();
        info!("fault manager service stopped");
    });
    (FaultHandle { tx }, task)
}

/// Run the predictor, publishing fit metrics every `metrics_interval`.
pub fn spawn_predictor(
    mut predictor: WaitTimePredictor,
    metrics_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> (PredictorHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(COMMAND_CAPACITY);
    let task = tokio::spawn(async move {
        let mut metrics = ticker(metrics_interval);
        info!(window = predictor.window_len(), "predictor service started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                cmd = rx.recv() => match cmd {
                    None => break,
                    Some(PredictorCommand::Predict { input, reply }) => {
                        let wait = predictor.predict(&input);
                        let (lower, upper) = predictor.confidence_interval(wait);
                        let _ = reply.send(Prediction { wait, lower, upper });
                    }
                    Some(PredictorCommand::Update(observation)) => predictor.update(observation),
                    Some(PredictorCommand::Metrics { reply }) => {
                        let _ = reply.send(predictor.model_metrics());
                    }
                },
                _ = metrics.tick() => predictor.publish_metrics(),
            }
        }
        info!("predictor service stopped");
    });
    (PredictorHandle { tx }, task)
}

/// Forward coordinator events: load changes to the balancer, observed waits
/// to the predictor. Ends when every event sender is dropped.
pub fn spawn_event_router(
    mut events: mpsc::UnboundedReceiver<CoordinatorEvent>,
    balancer: BalancerHandle,
    predictor: PredictorHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let routed = match event {
                CoordinatorEvent::WaitObserved(observation) => predictor.update(observation).await,
                other => balancer.event(other).await,
            };
            if let Err(e) = routed {
                debug!(error = %e, "event router stopping");
                break;
            }
        }
    })
}
