//! Fault tolerance: heartbeat-based failure detection and recovery of failed
//! actors from persisted state.

pub mod health;
pub mod manager;

pub use health::{HealthRecord, HealthStatus};
pub use manager::{default_args, DetectionReport, FaultToleranceManager, RecoveryNotice};
