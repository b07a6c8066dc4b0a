//! Load balancing across redundant resource pools.

#[allow(clippy::module_inception)]
pub mod balancer;
pub mod load;
pub mod strategy;

pub use balancer::{BalancerMetrics, LoadBalancer, MigrationHint};
pub use load::LoadRecord;
pub use strategy::{
    Adaptive, LeastLoaded, RoundRobin, SelectionContext, SelectionStrategy, StrategyKind,
    WeightedRoundRobin,
};
