//! Heartbeat monitoring, failure detection and recovery from persisted state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::config::FaultConfig;
use crate::core::{ActorLifecycle, EngineError, MetricEvent, PersistedState, SharedMetricsSink, StateStore};
use crate::fault::health::{HealthRecord, HealthStatus, UNKNOWN_ACTOR_TYPE};
use crate::util::serde::ActorId;

const NOTICE_CAPACITY: usize = 64;

/// Broadcast when a failed actor has been replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryNotice {
    /// Original actor name.
    pub failed: ActorId,
    /// Name of the new incarnation.
    pub replacement: ActorId,
    /// Actor type.
    pub actor_type: String,
    /// Recovery time.
    pub at_ms: u128,
}

/// What one detection tick changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Newly SUSPECTED actors.
    pub suspected: Vec<ActorId>,
    /// Newly FAILED actors.
    pub failed: Vec<ActorId>,
    /// (original, replacement) pairs recovered on this tick.
    pub recovered: Vec<(ActorId, ActorId)>,
    /// Actors whose recovery attempt failed on this tick.
    pub recovery_failures: Vec<ActorId>,
    /// Actors escalated on this tick.
    pub escalated: Vec<ActorId>,
    /// More than half of tracked actors are FAILED.
    pub system_failure: bool,
}

/// Constructor arguments for a type with no persisted state.
pub fn default_args(actor_type: &str) -> Vec<Value> {
    match actor_type {
        "DoctorAgent" => vec![json!("D_REC"), json!("Recovered Doctor"), json!("General")],
        "RoomAgent" => vec![json!("R_REC"), json!("CONSULTATION"), json!(1)],
        "EquipmentAgent" => vec![json!("E_REC"), json!("XRAY")],
        _ => Vec::new(),
    }
}

/// Tracks actor liveness and respawns silent actors.
pub struct FaultToleranceManager {
    config: FaultConfig,
    records: BTreeMap<ActorId, HealthRecord>,
    aliases: HashMap<ActorId, ActorId>,
    states: HashMap<ActorId, PersistedState>,
    store: Arc<dyn StateStore>,
    lifecycle: Arc<dyn ActorLifecycle>,
    notices: broadcast::Sender<RecoveryNotice>,
    metrics: Option<SharedMetricsSink>,
    system_failure: bool,
}

impl FaultToleranceManager {
    /// Build a manager, loading persisted state from `store`. A load error is
    /// logged and the manager starts empty.
    pub fn new(
        config: FaultConfig,
        store: Arc<dyn StateStore>,
        lifecycle: Arc<dyn ActorLifecycle>,
    ) -> Self {
        let states = match store.load() {
            Ok(states) => {
                tracing::info!(count = states.len(), "loaded persisted actor states");
                states
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load persisted actor states");
                HashMap::new()
            }
        };
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            config,
            records: BTreeMap::new(),
            aliases: HashMap::new(),
            states,
            store,
            lifecycle,
            notices,
            metrics: None,
            system_failure: false,
        }
    }

    /// Attach a metrics sink.
    pub fn with_metrics(mut self, sink: SharedMetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Settings this manager runs with.
    pub const fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Receive a notice for every successful recovery.
    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryNotice> {
        self.notices.subscribe()
    }

    /// Sender side of the recovery notices.
    pub fn notice_sender(&self) -> broadcast::Sender<RecoveryNotice> {
        self.notices.clone()
    }

    fn resolve(&self, actor: &str) -> ActorId {
        self.aliases
            .get(actor)
            .cloned()
            .unwrap_or_else(|| actor.to_owned())
    }

    /// Heartbeat from `actor` or one of its incarnations.
    pub fn on_heartbeat(&mut self, actor: &str, now_ms: u128) {
        let key = self.resolve(actor);
        let known_type = self.states.get(&key).map(|s| s.actor_type.clone());
        let record = self.records.entry(key.clone()).or_insert_with(|| {
            tracing::info!(actor = %key, "monitoring new actor");
            HealthRecord::new(
                key.clone(),
                known_type.unwrap_or_else(|| UNKNOWN_ACTOR_TYPE.into()),
                now_ms,
            )
        });
        if record.status != HealthStatus::Healthy {
            tracing::info!(actor = %key, from = %record.status, "actor healthy again");
        }
        record.beat(now_ms);
    }

    /// Registration with a declared type.
    pub fn on_register(&mut self, actor: &str, actor_type: &str, now_ms: u128) {
        let key = self.resolve(actor);
        let record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| HealthRecord::new(key.clone(), actor_type, now_ms));
        record.actor_type = actor_type.to_owned();
        record.beat(now_ms);
        tracing::info!(actor = %key, actor_type, "actor registered");
    }

    /// Overwrite the persisted state of an actor.
    pub fn on_state_snapshot(&mut self, mut state: PersistedState, now_ms: u128) {
        let key = self.resolve(&state.owner);
        if let Some(record) = self.records.get_mut(&key) {
            if record.actor_type == UNKNOWN_ACTOR_TYPE {
                record.actor_type.clone_from(&state.actor_type);
            }
        }
        state.owner.clone_from(&key);
        state.saved_at_ms = now_ms;
        tracing::debug!(actor = %key, "state snapshot stored");
        self.states.insert(key, state);
    }

    /// Persisted state of an actor.
    pub fn persisted_state(&self, actor: &str) -> Option<&PersistedState> {
        self.states.get(&self.resolve(actor))
    }

    /// Health record of an actor or one of its incarnations.
    pub fn record(&self, actor: &str) -> Option<&HealthRecord> {
        self.records.get(&self.resolve(actor))
    }

    /// Every record, ordered by actor name.
    pub fn records(&self) -> impl Iterator<Item = &HealthRecord> {
        self.records.values()
    }

    /// Whether the last tick found more than half the actors FAILED.
    pub const fn system_failure(&self) -> bool {
        self.system_failure
    }

    /// Allow automatic recovery of an escalated actor again.
    pub fn reset_escalation(&mut self, actor: &str) -> bool {
        let key = self.resolve(actor);
        match self.records.get_mut(&key) {
            Some(record) if record.escalated => {
                record.escalated = false;
                record.consecutive_failures = 0;
                record.next_retry_ms = None;
                tracing::info!(actor = %key, "escalation reset");
                true
            }
            _ => false,
        }
    }

    /// Classify every actor, recover the failed ones and check system health.
    pub async fn detection_tick(&mut self, now_ms: u128) -> DetectionReport {
        let mut report = DetectionReport::default();
        let suspicion = u128::from(self.config.suspicion_window_ms());
        let threshold = u128::from(self.config.failure_threshold_ms);

        let mut to_recover = Vec::new();
        for (key, record) in &mut self.records {
            if record.escalated {
                continue;
            }
            let silence = record.silence_ms(now_ms);
            match record.status {
                HealthStatus::Failed => {
                    if record.next_retry_ms.is_none_or(|t| t <= now_ms) {
                        to_recover.push(key.clone());
                    }
                }
                _ if silence > threshold => {
                    record.status = HealthStatus::Failed;
                    tracing::warn!(actor = %key, silence_ms = %silence, "actor failed");
                    report.failed.push(key.clone());
                    to_recover.push(key.clone());
                }
                HealthStatus::Healthy | HealthStatus::Recovered if silence > suspicion => {
                    record.status = HealthStatus::Suspected;
                    tracing::warn!(actor = %key, silence_ms = %silence, "actor suspected");
                    report.suspected.push(key.clone());
                }
                _ => {}
            }
        }

        for key in to_recover {
            self.recover(&key, now_ms, &mut report).await;
        }

        self.check_system(&mut report);
        tracing::debug!(
            tracked = self.records.len(),
            failed = report.failed.len(),
            suspected = report.suspected.len(),
            "detection tick"
        );
        report
    }

    async fn recover(&mut self, key: &str, now_ms: u128, report: &mut DetectionReport) {
        let Some(record) = self.records.get(key) else {
            return;
        };
        let persisted = self.states.get(key);
        let actor_type = if record.actor_type == UNKNOWN_ACTOR_TYPE {
            persisted.map_or_else(|| record.actor_type.clone(), |s| s.actor_type.clone())
        } else {
            record.actor_type.clone()
        };
        let args = persisted.map_or_else(|| default_args(&actor_type), |s| s.args.clone());
        let name = format!("{key}_recovered_{now_ms}");

        let limit = self.config.recovery_timeout();
        let spawn = self.lifecycle.spawn(&name, &actor_type, &args);
        let outcome = match tokio::time::timeout(limit, spawn).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Recovery(format!(
                "spawn of {name} timed out after {}ms",
                limit.as_millis()
            ))),
        };

        let max_attempts = self.config.max_recovery_attempts;
        let backoff = u128::from(self.config.recovery_backoff_ms);
        let Some(record) = self.records.get_mut(key) else {
            return;
        };
        match outcome {
            Ok(()) => {
                record.status = HealthStatus::Recovered;
                record.recovery_count += 1;
                record.consecutive_failures = 0;
                record.next_retry_ms = None;
                record.last_heartbeat_ms = now_ms;
                if let Some(old) = record.incarnation.replace(name.clone()) {
                    self.aliases.remove(&old);
                }
                self.aliases.insert(name.clone(), key.to_owned());
                tracing::info!(actor = %key, replacement = %name, %actor_type, "actor recovered");
                let notice = RecoveryNotice {
                    failed: key.to_owned(),
                    replacement: name.clone(),
                    actor_type,
                    at_ms: now_ms,
                };
                // No subscribers is not an error.
                let _ = self.notices.send(notice);
                report.recovered.push((key.to_owned(), name));
            }
            Err(e) => {
                record.failed_recovery_count += 1;
                record.consecutive_failures += 1;
                report.recovery_failures.push(key.to_owned());
                if record.consecutive_failures > max_attempts {
                    record.escalated = true;
                    record.next_retry_ms = None;
                    tracing::error!(
                        actor = %key,
                        attempts = record.consecutive_failures,
                        error = %e,
                        "recovery escalated: manual intervention required"
                    );
                    report.escalated.push(key.to_owned());
                } else {
                    let exp = record.consecutive_failures.saturating_sub(1).min(16);
                    let delay = backoff.saturating_mul(1u128 << exp);
                    record.next_retry_ms = Some(now_ms.saturating_add(delay));
                    tracing::warn!(
                        actor = %key,
                        attempts = record.consecutive_failures,
                        retry_in_ms = %delay,
                        error = %e,
                        "recovery failed"
                    );
                }
            }
        }
    }

    fn check_system(&mut self, report: &mut DetectionReport) {
        let total = self.records.len();
        let failed = self
            .records
            .values()
            .filter(|r| r.status == HealthStatus::Failed)
            .count();
        let system_failure = total > 0 && failed * 2 > total;
        if system_failure && !self.system_failure {
            tracing::error!(failed, total, "system-wide failure: more than half of actors failed");
        } else if !system_failure && self.system_failure {
            tracing::info!(failed, total, "system-wide failure cleared");
        }
        self.system_failure = system_failure;
        report.system_failure = system_failure;
        if let Some(sink) = &self.metrics {
            sink.record(MetricEvent::gauge("fault.failed_actors", failed as f64));
            sink.record(MetricEvent::gauge(
                "fault.system_failure",
                if system_failure { 1.0 } else { 0.0 },
            ));
        }
    }

    /// Write every persisted state to the store. Errors are logged and the
    /// in-memory copy is kept.
    pub fn flush(&self) -> Result<(), EngineError> {
        self.store.save(&self.states).map_err(|e| {
            tracing::error!(error = %e, "failed to flush actor states");
            e
        })?;
        tracing::debug!(count = self.states.len(), "actor states flushed");
        Ok(())
    }

    /// Push per-status counts to the attached sink.
    pub fn publish_metrics(&self) {
        let Some(sink) = &self.metrics else {
            return;
        };
        let count = |s: HealthStatus| self.records.values().filter(|r| r.status == s).count() as f64;
        sink.record(MetricEvent::gauge("fault.tracked", self.records.len() as f64));
        sink.record(MetricEvent::gauge("fault.healthy", count(HealthStatus::Healthy)));
        sink.record(MetricEvent::gauge("fault.suspected", count(HealthStatus::Suspected)));
        sink.record(MetricEvent::gauge("fault.recovered", count(HealthStatus::Recovered)));
        let recoveries: u32 = self.records.values().map(|r| r.recovery_count).sum();
        sink.record(MetricEvent::gauge("fault.recoveries", f64::from(recoveries)));
    }
}
