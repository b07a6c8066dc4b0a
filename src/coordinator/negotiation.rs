//! Bid collection and negotiation bookkeeping types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::core::{AllocationNotice, Availability, Category, ResourceKind, SharedHandle};
use crate::predictor::Observation;
use crate::util::serde::{RequestId, ResourceId};

/// Step a negotiation is in; carried on tracing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    /// Availability checks out to every instance of a kind.
    Discover(ResourceKind),
    /// Allocate sent to the winning instance.
    Bind(ResourceKind),
    /// Every kind bound; notifying the requester.
    Finalize,
    /// A step failed; releasing what was bound.
    Compensate,
    /// Returning the request to the queue.
    Requeue,
}

impl fmt::Display for NegotiationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discover(kind) => write!(f, "discover:{kind}"),
            Self::Bind(kind) => write!(f, "bind:{kind}"),
            Self::Finalize => f.write_str("finalize"),
            Self::Compensate => f.write_str("compensate"),
            Self::Requeue => f.write_str("requeue"),
        }
    }
}

/// Load and learning events emitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordinatorEvent {
    /// A resource was bound to a request.
    Assigned {
        /// Bound resource.
        resource_id: ResourceId,
        /// Its kind.
        kind: ResourceKind,
        /// Holding request.
        request_id: RequestId,
    },
    /// A resource was released by a request.
    Released {
        /// Released resource.
        resource_id: ResourceId,
        /// Its kind.
        kind: ResourceKind,
        /// Former holder.
        request_id: RequestId,
    },
    /// A completed request's wait, for the predictor.
    WaitObserved(Observation),
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing queued, or no instance of the primary kind known.
    Idle,
    /// Every required resource bound.
    Allocated(AllocationNotice),
    /// A step failed and the request went back to the queue.
    Requeued {
        /// Requeued request.
        request_id: RequestId,
        /// Kind whose step failed.
        failed_kind: ResourceKind,
    },
}

/// Outcome of an availability round.
pub(crate) struct BidRound {
    pub winner: Option<SharedHandle>,
    pub replies: usize,
}

/// Send an availability check to every handle concurrently and wait until all
/// replied, `timeout` elapsed, or the first CONFIRM arrived.
pub(crate) async fn collect_bids(
    handles: &[SharedHandle],
    category: Category,
    timeout: Duration,
) -> BidRound {
    let mut set = JoinSet::new();
    for handle in handles {
        let handle = SharedHandle::clone(handle);
        set.spawn(async move {
            let reply = handle.check_availability(category).await;
            (handle, reply)
        });
    }

    let deadline = Instant::now() + timeout;
    let mut round = BidRound {
        winner: None,
        replies: 0,
    };
    loop {
        tokio::select! {
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok((handle, reply))) => {
                    round.replies += 1;
                    if reply.status == Availability::Available {
                        round.winner = Some(handle);
                        break;
                    }
                }
                Some(Err(e)) => {
                    round.replies += 1;
                    tracing::warn!(error = %e, "availability check task failed");
                }
            },
            () = tokio::time::sleep_until(deadline) => {
                tracing::debug!(
                    replies = round.replies,
                    expected = handles.len(),
                    "availability round timed out"
                );
                break;
            }
        }
    }
    set.abort_all();
    round
}
