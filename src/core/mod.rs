//! Core engine abstractions: domain model, errors, collaborator traits and metrics.

pub mod error;
pub mod metrics;
pub mod model;
pub mod ports;
pub mod resource;

pub use error::{AppResult, EngineError};
pub use metrics::{
    InMemoryMetricsSink, MetricEvent, MetricsSink, SharedMetricsSink, TracingMetricsSink,
};
pub use model::{
    Bindings, Category, DispatchContext, EquipmentKind, Request, RequestStatus,
    ResourceDescriptor, ResourceKind, Specialization,
};
pub use ports::{
    ActorLifecycle, AllocationNotice, Mailbox, PersistedState, RequestQueue, Spawn, StateStore,
};
pub use resource::{
    AllocateReply, AllocationOutcome, Availability, AvailabilityReply, Directory, ReleaseReply,
    ResourceHandle, SharedHandle,
};
