//! Shared identifier and value types used across the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::EngineError;

/// Unique request identifier.
pub type RequestId = u64;

/// Resource instance identifier (doctor id, room id, device id).
pub type ResourceId = String;

/// Identifier of a monitored actor.
pub type ActorId = String;

/// Identity of the party that submitted a request and receives its notices.
pub type RequesterId = String;

/// Urgency level, 1 (routine) to 5 (critical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Urgency(u8);

impl Urgency {
    /// Lowest urgency.
    pub const MIN: Self = Self(1);
    /// Highest urgency; requests at this level are expedited.
    pub const MAX: Self = Self(5);

    /// Validate and wrap an urgency level.
    pub fn new(level: u8) -> Result<Self, EngineError> {
        if (Self::MIN.0..=Self::MAX.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(EngineError::InvalidUrgency(level))
        }
    }

    /// Raw level.
    pub const fn level(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Urgency {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Urgency> for u8 {
    fn from(value: Urgency) -> Self {
        value.0
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
