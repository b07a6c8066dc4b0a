//! In-memory mailbox backend.

use std::collections::HashMap;

use crate::core::{AllocationNotice, EngineError, Mailbox};
use crate::util::serde::RequesterId;

/// Simple in-memory mailbox for development/testing.
#[derive(Debug, Default)]
pub struct InMemoryMailbox {
    notices: HashMap<RequesterId, Vec<AllocationNotice>>,
}

impl InMemoryMailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch notices for a requester, optionally since a timestamp.
    pub fn fetch(
        &self,
        requester: &str,
        since_ms: Option<u128>,
        limit: usize,
    ) -> Vec<AllocationNotice> {
        self.notices
            .get(requester)
            .map(|notices| {
                notices
                    .iter()
                    .filter(|n| since_ms.is_none_or(|s| n.delivered_at_ms >= s))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total notices delivered.
    pub fn len(&self) -> usize {
        self.notices.values().map(Vec::len).sum()
    }

    /// Whether nothing was delivered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Mailbox for InMemoryMailbox {
    fn deliver(&mut self, notice: AllocationNotice) -> Result<(), EngineError> {
        self.notices
            .entry(notice.requester.clone())
            .or_default()
            .push(notice);
        Ok(())
    }
}
