//! Per-actor health bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::serde::ActorId;

/// Actor type used when nothing better is known.
pub const UNKNOWN_ACTOR_TYPE: &str = "Unknown";

/// Liveness state of a monitored actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// Heartbeats arriving on time.
    Healthy,
    /// Silent for longer than the suspicion window.
    Suspected,
    /// Silent past the failure threshold.
    Failed,
    /// Replaced by a new incarnation that has not yet sent a heartbeat.
    Recovered,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "HEALTHY",
            Self::Suspected => "SUSPECTED",
            Self::Failed => "FAILED",
            Self::Recovered => "RECOVERED",
        })
    }
}

/// Health record of one logical actor, across incarnations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Original actor name; the key for persisted state.
    pub actor_id: ActorId,
    /// Declared actor type.
    pub actor_type: String,
    /// Last heartbeat, or the recovery time after a respawn.
    pub last_heartbeat_ms: u128,
    /// Current state.
    pub status: HealthStatus,
    /// Successful recoveries.
    pub recovery_count: u32,
    /// Failed recovery attempts.
    pub failed_recovery_count: u32,
    /// Failed attempts since the last success or heartbeat.
    pub consecutive_failures: u32,
    /// Earliest time of the next recovery attempt while FAILED.
    pub next_retry_ms: Option<u128>,
    /// Automatic recovery given up.
    pub escalated: bool,
    /// Name of the live incarnation, if the actor was respawned.
    pub incarnation: Option<ActorId>,
}

impl HealthRecord {
    /// Fresh healthy record.
    pub fn new(actor_id: impl Into<ActorId>, actor_type: impl Into<String>, now_ms: u128) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type: actor_type.into(),
            last_heartbeat_ms: now_ms,
            status: HealthStatus::Healthy,
            recovery_count: 0,
            failed_recovery_count: 0,
            consecutive_failures: 0,
            next_retry_ms: None,
            escalated: false,
            incarnation: None,
        }
    }

    /// Milliseconds since the last heartbeat.
    pub const fn silence_ms(&self, now_ms: u128) -> u128 {
        now_ms.saturating_sub(self.last_heartbeat_ms)
    }

    /// Name currently answering for this actor.
    pub fn live_name(&self) -> &str {
        self.incarnation.as_deref().unwrap_or(&self.actor_id)
    }

    /// Heartbeat received: back to HEALTHY, retries cleared.
    pub fn beat(&mut self, now_ms: u128) {
        self.last_heartbeat_ms = now_ms;
        self.status = HealthStatus::Healthy;
        self.consecutive_failures = 0;
        self.next_retry_ms = None;
        self.escalated = false;
    }
}
