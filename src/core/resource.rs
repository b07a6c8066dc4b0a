//! Resource handle protocol and directory lookup.
//!
//! A resource unit answers three messages: an availability check, an
//! allocation and a release. Units decide locally whether to accept work, so
//! two negotiations racing for the same unit are resolved by the unit itself.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::model::{Category, ResourceKind};
use crate::util::serde::{RequestId, ResourceId};

/// Answer to an availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    /// Free and suitable for the category.
    Available,
    /// Held, unsuitable, or otherwise refusing.
    Busy,
}

/// Reply to an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReply {
    /// Replying unit.
    pub resource_id: ResourceId,
    /// Its answer.
    pub status: Availability,
}

/// Result of an allocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationOutcome {
    /// The unit is now held by the request.
    Allocated,
    /// The unit refused, usually because another request won it first.
    NotAvailable,
}

/// Reply to an allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateReply {
    /// Replying unit.
    pub resource_id: ResourceId,
    /// Outcome.
    pub outcome: AllocationOutcome,
}

/// Acknowledgement of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReply {
    /// Released unit.
    pub resource_id: ResourceId,
}

/// A live resource unit reachable over the bus.
#[async_trait]
pub trait ResourceHandle: Send + Sync {
    /// Unit identifier.
    fn id(&self) -> &str;

    /// Unit kind.
    fn kind(&self) -> ResourceKind;

    /// Ask whether the unit can take a request of this category.
    async fn check_availability(&self, category: Category) -> AvailabilityReply;

    /// Ask the unit to hold itself for `request`.
    async fn allocate(&self, request: RequestId, category: Category) -> AllocateReply;

    /// Free the unit if `request` holds it. Always acknowledged.
    async fn release(&self, request: RequestId) -> ReleaseReply;
}

/// Shared handle type used by caches and the directory.
pub type SharedHandle = Arc<dyn ResourceHandle>;

/// Capability lookup: every live unit of a kind.
pub trait Directory: Send + Sync {
    /// Handles currently registered for `kind`.
    fn lookup(&self, kind: ResourceKind) -> Vec<SharedHandle>;
}
