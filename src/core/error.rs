//! Error types for engine operations.

use thiserror::Error;

use crate::util::serde::{RequestId, ResourceId};

/// Errors produced by engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pending queue is at its configured depth.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// A request with this id is already live.
    #[error("duplicate request: {0}")]
    DuplicateRequest(RequestId),
    /// No live request has this id.
    #[error("unknown request: {0}")]
    UnknownRequest(RequestId),
    /// The request is not in the state the operation requires.
    #[error("request {id} is {actual}, expected {expected}")]
    InvalidState {
        /// Request id.
        id: RequestId,
        /// Status required by the operation.
        expected: &'static str,
        /// Status the request actually has.
        actual: &'static str,
    },
    /// Urgency outside 1..=5.
    #[error("invalid urgency {0}, expected 1..=5")]
    InvalidUrgency(u8),
    /// The request already holds a resource of this kind.
    #[error("request {request} already holds {kind} {resource}")]
    AlreadyBound {
        /// Request id.
        request: RequestId,
        /// Kind that is already bound.
        kind: String,
        /// Resource currently bound for that kind.
        resource: ResourceId,
    },
    /// Persisted state could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
    /// An actor could not be respawned.
    #[error("recovery failed: {0}")]
    Recovery(String),
    /// A component service is no longer running.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
    /// Configuration rejected by validation.
    #[error("config error: {0}")]
    Config(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
