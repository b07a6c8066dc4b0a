//! In-memory directory of live resource handles.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{Directory, ResourceKind, SharedHandle};

/// Registry keyed by resource kind. Clones share the registry.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    entries: Arc<RwLock<HashMap<ResourceKind, Vec<SharedHandle>>>>,
}

impl InMemoryDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under its kind. Replaces any handle with the same id.
    pub fn register(&self, handle: SharedHandle) {
        let mut entries = self.entries.write();
        let list = entries.entry(handle.kind()).or_default();
        list.retain(|h| h.id() != handle.id());
        list.push(handle);
    }

    /// Remove a handle by id. Returns whether one was removed.
    pub fn deregister(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let mut removed = false;
        for list in entries.values_mut() {
            let before = list.len();
            list.retain(|h| h.id() != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Number of registered handles across all kinds.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Directory for InMemoryDirectory {
    fn lookup(&self, kind: ResourceKind) -> Vec<SharedHandle> {
        self.entries.read().get(&kind).cloned().unwrap_or_default()
    }
}
