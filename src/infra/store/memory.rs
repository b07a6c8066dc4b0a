//! In-memory state store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{EngineError, PersistedState, StateStore};
use crate::util::serde::ActorId;

/// Volatile store. Clones share contents, so tests can inspect what was flushed.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    states: Arc<Mutex<HashMap<ActorId, PersistedState>>>,
    saves: Arc<Mutex<usize>>,
}

impl InMemoryStateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with states, as if loaded from a previous run.
    pub fn seeded(states: impl IntoIterator<Item = PersistedState>) -> Self {
        let store = Self::new();
        store
            .states
            .lock()
            .extend(states.into_iter().map(|s| (s.owner.clone(), s)));
        store
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self) -> Result<HashMap<ActorId, PersistedState>, EngineError> {
        Ok(self.states.lock().clone())
    }

    fn save(&self, states: &HashMap<ActorId, PersistedState>) -> Result<(), EngineError> {
        *self.states.lock() = states.clone();
        *self.saves.lock() += 1;
        Ok(())
    }
}
