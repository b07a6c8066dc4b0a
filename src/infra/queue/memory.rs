//! In-memory pending-request queue ordered by urgency and arrival.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::{EngineError, Request, RequestQueue, RequestStatus};

/// Heap entry: highest urgency first, then earliest arrival, then insertion order.
struct QueuedRequest {
    seq: u64,
    request: Request,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: earlier arrival and lower seq must compare greater.
        self.request
            .urgency
            .cmp(&other.request.urgency)
            .then_with(|| other.request.arrival_ms.cmp(&self.request.arrival_ms))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// In-memory queue storing waiting requests in a binary heap.
pub struct InMemoryQueue {
    max_depth: usize,
    next_seq: u64,
    requests: BinaryHeap<QueuedRequest>,
}

impl InMemoryQueue {
    /// Create a queue accepting at most `max_depth` submissions.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            next_seq: 0,
            requests: BinaryHeap::with_capacity(max_depth.min(1024)),
        }
    }

    /// Request ids in dequeue order, without consuming the queue.
    pub fn snapshot_ids(&self) -> Vec<u64> {
        let mut entries: Vec<&QueuedRequest> = self.requests.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|e| e.request.id).collect()
    }

    fn push(&mut self, request: Request) -> Result<(), EngineError> {
        if request.status != RequestStatus::Waiting {
            return Err(EngineError::InvalidState {
                id: request.id,
                expected: RequestStatus::Waiting.as_str(),
                actual: request.status.as_str(),
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.requests.push(QueuedRequest { seq, request });
        Ok(())
    }
}

impl RequestQueue for InMemoryQueue {
    fn enqueue(&mut self, request: Request) -> Result<(), EngineError> {
        if self.len() >= self.max_depth {
            return Err(EngineError::QueueFull("max queue depth reached".into()));
        }
        self.push(request)
    }

    fn requeue(&mut self, request: Request) -> Result<(), EngineError> {
        self.push(request)
    }

    fn dequeue(&mut self) -> Result<Option<Request>, EngineError> {
        Ok(self.requests.pop().map(|q| q.request))
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.requests.len()
    }
}
