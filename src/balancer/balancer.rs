//! Load tracking, instance selection and rebalancing across redundant pools.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::balancer::load::LoadRecord;
use crate::balancer::strategy::{SelectionContext, SelectionStrategy, StrategyKind};
use crate::config::BalancerConfig;
use crate::core::{Directory, MetricEvent, ResourceKind, SharedMetricsSink};
use crate::util::clock::now_ms;
use crate::util::serde::{RequestId, ResourceId};

/// Advisory request to move one unit of work between instances of a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationHint {
    /// Instance kind.
    pub kind: ResourceKind,
    /// Overloaded source.
    pub from: ResourceId,
    /// Underloaded target.
    pub to: ResourceId,
}

/// Snapshot of balancer counters and loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancerMetrics {
    /// Active strategy name.
    pub strategy: String,
    /// `select` calls.
    pub total_requests: u64,
    /// `select` calls that returned an instance.
    pub successful_allocations: u64,
    /// `successful_allocations / total_requests`, 0.0 with no requests.
    pub success_rate: f64,
    /// Population variance of current loads.
    pub load_variance: f64,
    /// Every tracked record, ordered by id.
    pub instances: Vec<LoadRecord>,
}

/// Spreads requests across instances and reports skew.
pub struct LoadBalancer {
    config: BalancerConfig,
    strategy_kind: StrategyKind,
    strategy: Box<dyn SelectionStrategy>,
    directory: Option<Arc<dyn Directory>>,
    pools: HashMap<ResourceKind, Vec<ResourceId>>,
    records: BTreeMap<ResourceId, LoadRecord>,
    total_requests: u64,
    successful_allocations: u64,
    migrations: Option<mpsc::Sender<MigrationHint>>,
    metrics: Option<SharedMetricsSink>,
}

impl LoadBalancer {
    /// Balancer using the strategy named in `config`.
    pub fn new(config: BalancerConfig) -> Self {
        let strategy_kind = StrategyKind::parse_or_default(&config.strategy);
        Self {
            strategy: strategy_kind.build(),
            strategy_kind,
            config,
            directory: None,
            pools: HashMap::new(),
            records: BTreeMap::new(),
            total_requests: 0,
            successful_allocations: 0,
            migrations: None,
            metrics: None,
        }
    }

    /// Discover instances from `directory`.
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Forward rebalance hints to `tx`. Hints that do not fit are dropped.
    pub fn with_migration_channel(mut self, tx: mpsc::Sender<MigrationHint>) -> Self {
        self.migrations = Some(tx);
        self
    }

    /// Attach a metrics sink for `publish_metrics`.
    pub fn with_metrics(mut self, sink: SharedMetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Settings this balancer runs with.
    pub const fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Active strategy.
    pub const fn strategy(&self) -> StrategyKind {
        self.strategy_kind
    }

    /// Replace the strategy. Strategy state (cursors, weights) starts fresh.
    pub fn set_strategy(&mut self, kind: StrategyKind) {
        self.strategy_kind = kind;
        self.strategy = kind.build();
        tracing::info!(strategy = %kind, "balancing strategy changed");
    }

    /// Refresh the instance list of `kind`. Returns the instance count.
    pub fn discover(&mut self, kind: ResourceKind) -> usize {
        let Some(directory) = self.directory.clone() else {
            return self.pools.get(&kind).map_or(0, Vec::len);
        };
        let now = now_ms();
        let ids: Vec<ResourceId> = directory
            .lookup(kind)
            .iter()
            .map(|h| h.id().to_owned())
            .collect();
        for id in &ids {
            self.records
                .entry(id.clone())
                .or_insert_with(|| LoadRecord::new(id.clone(), kind, now));
        }
        tracing::debug!(%kind, count = ids.len(), "discovered instances");
        let count = ids.len();
        self.pools.insert(kind, ids);
        count
    }

    /// Refresh every kind.
    pub fn discover_all(&mut self) {
        for kind in ResourceKind::all() {
            self.discover(kind);
        }
    }

    /// Track an instance without going through the directory.
    pub fn register_instance(&mut self, id: impl Into<ResourceId>, kind: ResourceKind) {
        let id = id.into();
        let pool = self.pools.entry(kind).or_default();
        if !pool.contains(&id) {
            pool.push(id.clone());
        }
        self.records
            .entry(id.clone())
            .or_insert_with(|| LoadRecord::new(id, kind, now_ms()));
    }

    /// Pick an instance of `kind`, skipping overloaded ones. `None` when
    /// nothing is viable; the caller keeps the request queued.
    pub fn select(&mut self, kind: ResourceKind, ctx: &SelectionContext) -> Option<ResourceId> {
        self.total_requests += 1;
        let threshold = self.config.overload_threshold;
        let candidates: Vec<&LoadRecord> = self
            .pools
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .filter(|r| !r.is_overloaded(threshold))
            .collect();
        if candidates.is_empty() {
            tracing::debug!(%kind, request = ?ctx.request_id, "no viable instance");
            return None;
        }
        let index = self.strategy.select(kind, &candidates, ctx);
        let chosen = candidates.get(index).map(|r| r.resource_id.clone())?;
        self.successful_allocations += 1;
        tracing::debug!(%kind, resource = %chosen, strategy = self.strategy.name(), "selected");
        Some(chosen)
    }

    /// A request was bound to `id`.
    pub fn record_assignment(&mut self, id: &str, kind: ResourceKind, request: RequestId) {
        if !self.records.contains_key(id) {
            self.register_instance(id, kind);
        }
        if let Some(record) = self.records.get_mut(id) {
            record.increment(now_ms());
            record.allocations += 1;
            record.update_average();
            tracing::debug!(resource = id, request, load = record.current_load, "assignment recorded");
        }
    }

    /// A request released `id`.
    pub fn record_release(&mut self, id: &str) {
        if let Some(record) = self.records.get_mut(id) {
            record.decrement(now_ms());
            record.update_average();
        }
    }

    /// Decay every moving average toward its current load.
    pub fn monitor_tick(&mut self) {
        for record in self.records.values_mut() {
            record.update_average();
        }
    }

    /// Pair overloaded instances (> 1.5 × mean) with underloaded ones
    /// (< 0.5 × mean) within each kind, moving one unit per pair.
    pub fn rebalance(&mut self) -> Vec<MigrationHint> {
        let now = now_ms();
        let mut hints = Vec::new();
        let mut kinds: Vec<ResourceKind> = self.pools.keys().copied().collect();
        kinds.sort();
        for kind in kinds {
            let ids = self.pools.get(&kind).cloned().unwrap_or_default();
            let loads: Vec<(ResourceId, u32)> = ids
                .iter()
                .filter_map(|id| self.records.get(id).map(|r| (id.clone(), r.current_load)))
                .collect();
            if loads.is_empty() {
                continue;
            }
            let mean = f64::from(loads.iter().map(|(_, l)| *l).sum::<u32>()) / loads.len() as f64;
            let overloaded: Vec<ResourceId> = loads
                .iter()
                .filter(|(_, l)| f64::from(*l) > mean * 1.5)
                .map(|(id, _)| id.clone())
                .collect();
            let mut underloaded: Vec<ResourceId> = loads
                .iter()
                .filter(|(_, l)| f64::from(*l) < mean * 0.5)
                .map(|(id, _)| id.clone())
                .collect();
            if overloaded.is_empty() || underloaded.is_empty() {
                continue;
            }
            tracing::info!(
                %kind,
                overloaded = overloaded.len(),
                underloaded = underloaded.len(),
                "rebalancing"
            );
            for from in overloaded {
                let Some(to) = underloaded.first().cloned() else {
                    break;
                };
                if let Some(src) = self.records.get_mut(&from) {
                    src.decrement(now);
                }
                let target_load = self.records.get_mut(&to).map_or(0, |dst| {
                    dst.increment(now);
                    dst.current_load
                });
                if f64::from(target_load) >= mean {
                    underloaded.remove(0);
                }
                tracing::info!(%kind, from = %from, to = %to, "migration requested");
                hints.push(MigrationHint { kind, from, to });
            }
        }
        if let Some(tx) = &self.migrations {
            for hint in &hints {
                match tx.try_send(hint.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(dropped)) => {
                        tracing::warn!(
                            from = %dropped.from,
                            to = %dropped.to,
                            "migration channel full, dropping hint"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::warn!("migration channel closed, dropping hints");
                        self.migrations = None;
                        break;
                    }
                }
            }
        }
        hints
    }

    /// Record for an instance.
    pub fn record(&self, id: &str) -> Option<&LoadRecord> {
        self.records.get(id)
    }

    /// Counters and loads.
    pub fn metrics(&self) -> BalancerMetrics {
        let success_rate = if self.total_requests == 0 {
            0.0
        } else {
            self.successful_allocations as f64 / self.total_requests as f64
        };
        BalancerMetrics {
            strategy: self.strategy.name().to_owned(),
            total_requests: self.total_requests,
            successful_allocations: self.successful_allocations,
            success_rate,
            load_variance: self.load_variance(),
            instances: self.records.values().cloned().collect(),
        }
    }

    /// Push counters and per-instance loads to the attached sink.
    pub fn publish_metrics(&self) {
        let m = self.metrics();
        tracing::info!(
            strategy = %m.strategy,
            total = m.total_requests,
            successful = m.successful_allocations,
            success_rate = m.success_rate,
            variance = m.load_variance,
            "load balancer metrics"
        );
        let Some(sink) = &self.metrics else {
            return;
        };
        sink.record(MetricEvent::gauge("balancer.total_requests", m.total_requests as f64));
        sink.record(MetricEvent::gauge("balancer.success_rate", m.success_rate));
        sink.record(MetricEvent::gauge("balancer.load_variance", m.load_variance));
        for rec in &m.instances {
            sink.record(MetricEvent::gauge(
                format!("balancer.load.{}", rec.resource_id),
                f64::from(rec.current_load),
            ));
        }
    }

    fn load_variance(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let n = self.records.len() as f64;
        let mean = self
            .records
            .values()
            .map(|r| f64::from(r.current_load))
            .sum::<f64>()
            / n;
        self.records
            .values()
            .map(|r| (f64::from(r.current_load) - mean).powi(2))
            .sum::<f64>()
            / n
    }
}
