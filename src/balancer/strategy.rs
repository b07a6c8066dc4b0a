//! Pluggable instance-selection strategies.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::balancer::load::LoadRecord;
use crate::core::ResourceKind;
use crate::util::serde::{RequestId, ResourceId, Urgency};

/// What the caller knows about the request being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionContext {
    /// Request being placed, when there is one.
    pub request_id: Option<RequestId>,
    /// Its urgency.
    pub urgency: Urgency,
}

impl SelectionContext {
    /// Context for a request.
    pub const fn for_request(request_id: RequestId, urgency: Urgency) -> Self {
        Self {
            request_id: Some(request_id),
            urgency,
        }
    }
}

/// Picks one candidate out of the viable (non-overloaded) instances of a kind.
///
/// `candidates` is never empty and keeps discovery order. The return value is
/// an index into it.
pub trait SelectionStrategy: Send {
    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Choose a candidate.
    fn select(
        &mut self,
        kind: ResourceKind,
        candidates: &[&LoadRecord],
        ctx: &SelectionContext,
    ) -> usize;
}

/// Strategy selector parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Cyclic order.
    #[default]
    RoundRobin,
    /// Lowest current load.
    LeastLoaded,
    /// Weighted round robin from average load.
    WeightedRoundRobin,
    /// Current plus half the average, favouring urgent requests.
    Adaptive,
}

impl StrategyKind {
    /// Parse a configured name, falling back to round robin.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(strategy = name, "unknown balancing strategy, using round robin");
            Self::RoundRobin
        })
    }

    /// Fresh strategy instance.
    pub fn build(self) -> Box<dyn SelectionStrategy> {
        match self {
            Self::RoundRobin => Box::new(RoundRobin::default()),
            Self::LeastLoaded => Box::new(LeastLoaded),
            Self::WeightedRoundRobin => Box::new(WeightedRoundRobin::default()),
            Self::Adaptive => Box::new(Adaptive),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "least_loaded" | "leastconnections" | "least_connections" => Ok(Self::LeastLoaded),
            "weighted" | "weighted_round_robin" => Ok(Self::WeightedRoundRobin),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(format!("unknown strategy `{other}`")),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RoundRobin => "round_robin",
            Self::LeastLoaded => "least_loaded",
            Self::WeightedRoundRobin => "weighted_round_robin",
            Self::Adaptive => "adaptive",
        })
    }
}

/// Cyclic index per kind, modulo the candidate count.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: HashMap<ResourceKind, usize>,
}

impl SelectionStrategy for RoundRobin {
    fn name(&self) -> &'static str {
        "Round Robin"
    }

    fn select(&mut self, kind: ResourceKind, candidates: &[&LoadRecord], _ctx: &SelectionContext) -> usize {
        let cursor = self.cursors.entry(kind).or_default();
        let index = *cursor % candidates.len();
        *cursor = cursor.wrapping_add(1);
        index
    }
}

/// Minimum current load; the first candidate wins ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoaded;

impl SelectionStrategy for LeastLoaded {
    fn name(&self) -> &'static str {
        "Least Loaded"
    }

    fn select(&mut self, _kind: ResourceKind, candidates: &[&LoadRecord], _ctx: &SelectionContext) -> usize {
        let mut best = 0;
        for (i, rec) in candidates.iter().enumerate().skip(1) {
            if rec.current_load < candidates[best].current_load {
                best = i;
            }
        }
        best
    }
}

/// Weight fixed at first sight as `max(1, 10 - floor(average))`.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    weights: HashMap<ResourceId, (i64, i64)>,
}

impl WeightedRoundRobin {
    fn initial_weight(record: &LoadRecord) -> i64 {
        // Saturating float-to-int cast; averages are small non-negative values.
        (10 - record.average_load.floor() as i64).max(1)
    }
}

impl SelectionStrategy for WeightedRoundRobin {
    fn name(&self) -> &'static str {
        "Weighted Round Robin"
    }

    fn select(&mut self, _kind: ResourceKind, candidates: &[&LoadRecord], _ctx: &SelectionContext) -> usize {
        for rec in candidates {
            self.weights
                .entry(rec.resource_id.clone())
                .or_insert_with(|| {
                    let w = Self::initial_weight(rec);
                    (w, w)
                });
        }
        let current = |rec: &LoadRecord| self.weights.get(&rec.resource_id).map_or(0, |w| w.1);
        let mut best = 0;
        for (i, rec) in candidates.iter().enumerate().skip(1) {
            if current(*rec) > current(candidates[best]) {
                best = i;
            }
        }
        if let Some((weight, current)) = self.weights.get_mut(&candidates[best].resource_id) {
            *current -= 1;
            if *current <= 0 {
                *current = *weight;
            }
        }
        best
    }
}

/// Minimises `current + 0.5 * average`, scaled by 0.8 for urgency 4 and above.
#[derive(Debug, Default, Clone, Copy)]
pub struct Adaptive;

impl Adaptive {
    /// Score of a candidate; lower is better.
    pub fn score(record: &LoadRecord, urgency: Urgency) -> f64 {
        let score = 0.5f64.mul_add(record.average_load, f64::from(record.current_load));
        if urgency.level() >= 4 {
            score * 0.8
        } else {
            score
        }
    }
}

impl SelectionStrategy for Adaptive {
    fn name(&self) -> &'static str {
        "Adaptive"
    }

    fn select(&mut self, _kind: ResourceKind, candidates: &[&LoadRecord], ctx: &SelectionContext) -> usize {
        let mut best = 0;
        let mut best_score = Self::score(candidates[0], ctx.urgency);
        for (i, rec) in candidates.iter().enumerate().skip(1) {
            let score = Self::score(rec, ctx.urgency);
            if score < best_score {
                best = i;
                best_score = score;
            }
        }
        best
    }
}
