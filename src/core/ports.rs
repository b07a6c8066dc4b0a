//! Collaborator traits: queue, mailbox, state store, actor lifecycle, spawner.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::model::{Category, Request};
use crate::core::EngineError;
use crate::util::serde::{ActorId, RequestId, RequesterId, ResourceId};

/// Abstraction for pending-request queue backends.
///
/// Implementations order by urgency (highest first), then arrival time, then
/// insertion order, and refuse any request that is not WAITING.
pub trait RequestQueue: Send {
    /// Enqueue a waiting request if space permits.
    fn enqueue(&mut self, request: Request) -> Result<(), EngineError>;
    /// Put back a request whose negotiation failed. Ignores the depth limit so
    /// a popped request is never lost.
    fn requeue(&mut self, request: Request) -> Result<(), EngineError>;
    /// Pop the head.
    fn dequeue(&mut self) -> Result<Option<Request>, EngineError>;
    /// Maximum depth accepted by `enqueue`.
    fn max_depth(&self) -> usize;
    /// Current depth.
    fn len(&self) -> usize;
    /// Whether nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Message delivered to a requester once every resource is bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationNotice {
    /// Allocated request.
    pub request_id: RequestId,
    /// Recipient.
    pub requester: RequesterId,
    /// Request category.
    pub category: Category,
    /// Bound doctor.
    pub doctor: ResourceId,
    /// Bound room.
    pub room: ResourceId,
    /// Bound equipment, when the category needs one.
    pub equipment: Option<ResourceId>,
    /// Delivery time in milliseconds since epoch.
    pub delivered_at_ms: u128,
}

/// Abstraction for requester notification backends.
pub trait Mailbox: Send {
    /// Deliver an allocation notice.
    fn deliver(&mut self, notice: AllocationNotice) -> Result<(), EngineError>;
}

/// Snapshot an actor publishes so it can be rebuilt after a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Owning actor name.
    pub owner: ActorId,
    /// Declared actor type, e.g. `RoomAgent`.
    pub actor_type: String,
    /// Constructor arguments used to respawn the actor.
    pub args: Vec<Value>,
    /// Free-form key/value state.
    #[serde(default)]
    pub snapshot: BTreeMap<String, Value>,
    /// When the snapshot was taken.
    pub saved_at_ms: u128,
}

/// Keyed store of persisted actor state, read and written wholesale.
pub trait StateStore: Send + Sync {
    /// Load every persisted state. An absent store yields an empty map.
    fn load(&self) -> Result<HashMap<ActorId, PersistedState>, EngineError>;
    /// Replace the stored collection.
    fn save(&self, states: &HashMap<ActorId, PersistedState>) -> Result<(), EngineError>;
}

/// Actor lifecycle substrate used to respawn failed actors.
#[async_trait]
pub trait ActorLifecycle: Send + Sync {
    /// Start a new actor instance.
    async fn spawn(&self, name: &str, actor_type: &str, args: &[Value]) -> Result<(), EngineError>;
}

/// Abstraction for spawning work on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
