//! Allocation coordination: urgency-ordered queue and per-request negotiation
//! of doctor, room and equipment.

#[allow(clippy::module_inception)]
pub mod coordinator;
pub mod negotiation;

pub use coordinator::{AllocationCoordinator, CoordinatorStats};
pub use negotiation::{CoordinatorEvent, DispatchOutcome, NegotiationPhase};
