//! Recording actor lifecycle for development and tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::{ActorLifecycle, EngineError};

/// One spawn the lifecycle was asked to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRecord {
    /// New instance name.
    pub name: String,
    /// Actor type.
    pub actor_type: String,
    /// Constructor arguments.
    pub args: Vec<Value>,
    /// Whether the spawn was reported as successful.
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct LifecycleState {
    spawns: Vec<SpawnRecord>,
    failures_left: usize,
}

/// Lifecycle that records spawn requests and can be told to fail.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLifecycle {
    state: Arc<Mutex<LifecycleState>>,
}

impl InMemoryLifecycle {
    /// Lifecycle where every spawn succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` spawn attempts.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failures_left = n;
    }

    /// Every spawn attempted so far.
    pub fn spawns(&self) -> Vec<SpawnRecord> {
        self.state.lock().spawns.clone()
    }

    /// Successful spawns only.
    pub fn successful_spawns(&self) -> Vec<SpawnRecord> {
        self.state
            .lock()
            .spawns
            .iter()
            .filter(|s| s.succeeded)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ActorLifecycle for InMemoryLifecycle {
    async fn spawn(&self, name: &str, actor_type: &str, args: &[Value]) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let succeeded = if state.failures_left > 0 {
            state.failures_left -= 1;
            false
        } else {
            true
        };
        state.spawns.push(SpawnRecord {
            name: name.to_owned(),
            actor_type: actor_type.to_owned(),
            args: args.to_vec(),
            succeeded,
        });
        if succeeded {
            Ok(())
        } else {
            Err(EngineError::Recovery(format!("spawn of {name} refused")))
        }
    }
}
