//! Command messages and clonable handles for the component services.
//!
//! Every service owns its component and is reached only through these
//! handles. Replies travel back on `oneshot` channels.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::balancer::{BalancerMetrics, MigrationHint, SelectionContext, StrategyKind};
use crate::coordinator::{CoordinatorEvent, CoordinatorStats};
use crate::core::{EngineError, PersistedState, Request, ResourceKind};
use crate::fault::{DetectionReport, HealthRecord};
use crate::predictor::{ModelMetrics, Observation, PredictionInput};
use crate::util::serde::{ActorId, RequestId, ResourceId};

type Reply<T> = oneshot::Sender<T>;

/// Commands accepted by the coordinator service.
pub enum CoordinatorCommand {
    /// Queue a request.
    Submit {
        /// Request to queue.
        request: Request,
        /// Queue depth or rejection.
        reply: Reply<Result<usize, EngineError>>,
    },
    /// Complete an in-progress request.
    Complete {
        /// Request id.
        id: RequestId,
        /// Completion time.
        now_ms: u128,
        /// Completed request or error.
        reply: Reply<Result<Request, EngineError>>,
    },
    /// Fetch the statistics report.
    Stats {
        /// Report.
        reply: Reply<CoordinatorStats>,
    },
    /// Rebuild the discovery cache now.
    Refresh,
}

/// Commands accepted by the balancer service.
pub enum BalancerCommand {
    /// Pick an instance.
    Select {
        /// Kind wanted.
        kind: ResourceKind,
        /// Request context.
        ctx: SelectionContext,
        /// Chosen instance.
        reply: Reply<Option<ResourceId>>,
    },
    /// Track an instance directly.
    Register {
        /// Instance id.
        id: ResourceId,
        /// Instance kind.
        kind: ResourceKind,
    },
    /// Apply a coordinator load event.
    Event(CoordinatorEvent),
    /// Rebalance now.
    Rebalance {
        /// Hints produced.
        reply: Reply<Vec<MigrationHint>>,
    },
    /// Replace the strategy.
    SetStrategy(StrategyKind),
    /// Fetch counters and loads.
    Metrics {
        /// Snapshot.
        reply: Reply<BalancerMetrics>,
    },
}

/// Commands accepted by the fault manager service.
pub enum FaultCommand {
    /// Liveness signal.
    Heartbeat {
        /// Sender.
        actor: ActorId,
        /// Send time.
        now_ms: u128,
    },
    /// Registration with a declared type.
    Register {
        /// Actor.
        actor: ActorId,
        /// Declared type.
        actor_type: String,
        /// Registration time.
        now_ms: u128,
    },
    /// State snapshot.
    Snapshot {
        /// Snapshot.
        state: PersistedState,
        /// Receive time.
        now_ms: u128,
    },
    /// Run detection now.
    Tick {
        /// Tick time.
        now_ms: u128,
        /// Report.
        reply: Reply<DetectionReport>,
    },
    /// Fetch a health record.
    Record {
        /// Actor or incarnation name.
        actor: ActorId,
        /// Record, if tracked.
        reply: Reply<Option<HealthRecord>>,
    },
    /// Re-enable automatic recovery after escalation.
    ResetEscalation {
        /// Actor.
        actor: ActorId,
    },
    /// Flush persisted state now.
    Flush {
        /// Store result.
        reply: Reply<Result<(), EngineError>>,
    },
}

/// A wait-time estimate with its 95% interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Point estimate.
    pub wait: f64,
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

/// Commands accepted by the predictor service.
pub enum PredictorCommand {
    /// Estimate a wait.
    Predict {
        /// State to estimate for.
        input: PredictionInput,
        /// Estimate.
        reply: Reply<Prediction>,
    },
    /// Learn from an observed wait.
    Update(Observation),
    /// Fetch fit metrics.
    Metrics {
        /// Metrics.
        reply: Reply<ModelMetrics>,
    },
}

async fn round_trip<C, T>(
    tx: &mpsc::Sender<C>,
    name: &'static str,
    make: impl FnOnce(Reply<T>) -> C,
) -> Result<T, EngineError> {
    let (reply, rx) = oneshot::channel();
    tx.send(make(reply))
        .await
        .map_err(|_| EngineError::ChannelClosed(name))?;
    rx.await.map_err(|_| EngineError::ChannelClosed(name))
}

async fn tell<C>(tx: &mpsc::Sender<C>, name: &'static str, cmd: C) -> Result<(), EngineError> {
    tx.send(cmd)
        .await
        .map_err(|_| EngineError::ChannelClosed(name))
}

/// Handle to the coordinator service.
#[derive(Clone)]
pub struct CoordinatorHandle {
    pub(crate) tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    const NAME: &'static str = "coordinator";

    /// Queue a request; returns the queue depth.
    pub async fn submit(&self, request: Request) -> Result<usize, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| CoordinatorCommand::Submit {
            request,
            reply,
        })
        .await?
    }

    /// Complete an in-progress request.
    pub async fn complete(&self, id: RequestId, now_ms: u128) -> Result<Request, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| CoordinatorCommand::Complete {
            id,
            now_ms,
            reply,
        })
        .await?
    }

    /// Statistics report.
    pub async fn stats(&self) -> Result<CoordinatorStats, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| CoordinatorCommand::Stats { reply }).await
    }

    /// Rebuild the discovery cache.
    pub async fn refresh(&self) -> Result<(), EngineError> {
        tell(&self.tx, Self::NAME, CoordinatorCommand::Refresh).await
    }
}

/// Handle to the balancer service.
#[derive(Clone)]
pub struct BalancerHandle {
    pub(crate) tx: mpsc::Sender<BalancerCommand>,
}

impl BalancerHandle {
    const NAME: &'static str = "balancer";

    /// Pick an instance of `kind`.
    pub async fn select(
        &self,
        kind: ResourceKind,
        ctx: SelectionContext,
    ) -> Result<Option<ResourceId>, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| BalancerCommand::Select { kind, ctx, reply }).await
    }

    /// Track an instance.
    pub async fn register(&self, id: impl Into<ResourceId>, kind: ResourceKind) -> Result<(), EngineError> {
        tell(&self.tx, Self::NAME, BalancerCommand::Register { id: id.into(), kind }).await
    }

    /// Forward a coordinator event.
    pub async fn event(&self, event: CoordinatorEvent) -> Result<(), EngineError> {
        tell(&self.tx, Self::NAME, BalancerCommand::Event(event)).await
    }

    /// Rebalance now.
    pub async fn rebalance(&self) -> Result<Vec<MigrationHint>, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| BalancerCommand::Rebalance { reply }).await
    }

    /// Replace the strategy.
    pub async fn set_strategy(&self, kind: StrategyKind) -> Result<(), EngineError> {
        tell(&self.tx, Self::NAME, BalancerCommand::SetStrategy(kind)).await
    }

    /// Counters and loads.
    pub async fn metrics(&self) -> Result<BalancerMetrics, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| BalancerCommand::Metrics { reply }).await
    }
}

/// Handle to the fault manager service.
#[derive(Clone)]
pub struct FaultHandle {
    pub(crate) tx: mpsc::Sender<FaultCommand>,
}

impl FaultHandle {
    const NAME: &'static str = "fault manager";

    /// Send a heartbeat.
    pub async fn heartbeat(&self, actor: impl Into<ActorId>, now_ms: u128) -> Result<(), EngineError> {
        tell(&self.tx, Self::NAME, FaultCommand::Heartbeat { actor: actor.into(), now_ms }).await
    }

    /// Register an actor with its type.
    pub async fn register(
        &self,
        actor: impl Into<ActorId>,
        actor_type: impl Into<String>,
        now_ms: u128,
    ) -> Result<(), EngineError> {
        let cmd = FaultCommand::Register {
            actor: actor.into(),
            actor_type: actor_type.into(),
            now_ms,
        };
        tell(&self.tx, Self::NAME, cmd).await
    }

    /// Store a state snapshot.
    pub async fn snapshot(&self, state: PersistedState, now_ms: u128) -> Result<(), EngineError> {
        tell(&self.tx, Self::NAME, FaultCommand::Snapshot { state, now_ms }).await
    }

    /// Run detection now.
    pub async fn tick(&self, now_ms: u128) -> Result<DetectionReport, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| FaultCommand::Tick { now_ms, reply }).await
    }

    /// Health record of an actor.
    pub async fn record(&self, actor: impl Into<ActorId>) -> Result<Option<HealthRecord>, EngineError> {
        let actor = actor.into();
        round_trip(&self.tx, Self::NAME, |reply| FaultCommand::Record { actor, reply }).await
    }

    /// Re-enable recovery of an escalated actor.
    pub async fn reset_escalation(&self, actor: impl Into<ActorId>) -> Result<(), EngineError> {
        tell(&self.tx, Self::NAME, FaultCommand::ResetEscalation { actor: actor.into() }).await
    }

    /// Flush persisted state.
    pub async fn flush(&self) -> Result<(), EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| FaultCommand::Flush { reply }).await?
    }
}

/// Handle to the predictor service.
#[derive(Clone)]
pub struct PredictorHandle {
    pub(crate) tx: mpsc::Sender<PredictorCommand>,
}

impl PredictorHandle {
    const NAME: &'static str = "predictor";

    /// Estimate a wait.
    pub async fn predict(&self, input: PredictionInput) -> Result<Prediction, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| PredictorCommand::Predict { input, reply }).await
    }

    /// Learn from an observed wait.
    pub async fn update(&self, observation: Observation) -> Result<(), EngineError> {
        tell(&self.tx, Self::NAME, PredictorCommand::Update(observation)).await
    }

    /// Fit metrics.
    pub async fn metrics(&self) -> Result<ModelMetrics, EngineError> {
        round_trip(&self.tx, Self::NAME, |reply| PredictorCommand::Metrics { reply }).await
    }
}
