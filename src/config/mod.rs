//! Configuration models for the coordinator, balancer, fault manager and predictor.

pub mod engine;

pub use engine::{BalancerConfig, CoordinatorConfig, EngineConfig, FaultConfig, PredictorConfig};
