//! Runtime adapters: the tokio spawner, component services and their
//! message-passing API.

pub mod api;
pub mod service;
pub mod tokio_spawner;

pub use api::{
    BalancerCommand, BalancerHandle, CoordinatorCommand, CoordinatorHandle, FaultCommand,
    FaultHandle, Prediction, PredictorCommand, PredictorHandle,
};
pub use service::{
    spawn_balancer, spawn_coordinator, spawn_event_router, spawn_fault_manager, spawn_predictor,
    COMMAND_CAPACITY,
};
pub use tokio_spawner::TokioSpawner;
