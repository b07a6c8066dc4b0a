//! Allocation coordinator: priority queue of pending requests plus one
//! sequential negotiation per dispatched request.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::coordinator::negotiation::{collect_bids, CoordinatorEvent, DispatchOutcome, NegotiationPhase};
use crate::core::{
    AllocationNotice, AllocationOutcome, Directory, DispatchContext, EngineError, Mailbox,
    MetricEvent, Request, RequestQueue, RequestStatus, ResourceKind, SharedHandle,
    SharedMetricsSink, Spawn,
};
use crate::predictor::{Observation, PredictionInput};
use crate::util::clock::hour_of_day;
use crate::util::serde::{RequestId, ResourceId};

/// Statistics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Requests waiting in the queue.
    pub queue_length: usize,
    /// Negotiations currently running.
    pub in_flight: u64,
    /// Negotiations started.
    pub processed: u64,
    /// Negotiations that bound every resource.
    pub successful_allocations: u64,
    /// Negotiations that ended in a requeue.
    pub failed_allocations: u64,
    /// Requests completed.
    pub completed: u64,
    /// Mean wait of successful allocations, in milliseconds.
    pub average_wait_ms: f64,
    /// Cached instance count per kind.
    pub known_resources: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    in_flight: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    completed: AtomicU64,
    total_wait_ms: AtomicU64,
}

/// Converts waiting requests into fully resourced ones.
///
/// Cloning is cheap and every clone shares the queue, live requests and
/// discovery cache, so negotiations can run on spawned tasks.
pub struct AllocationCoordinator<Q, M, S> {
    config: CoordinatorConfig,
    /// Pending requests, head popped atomically by one negotiation at a time.
    queue: Arc<Mutex<Q>>,
    /// Every request not yet completed, by id.
    live: Arc<Mutex<HashMap<RequestId, Request>>>,
    /// Handles per kind from the last discovery.
    cache: Arc<RwLock<HashMap<ResourceKind, Vec<SharedHandle>>>>,
    directory: Arc<dyn Directory>,
    mailbox: Arc<Mutex<M>>,
    events: Option<mpsc::UnboundedSender<CoordinatorEvent>>,
    metrics: Option<SharedMetricsSink>,
    counters: Arc<Counters>,
    spawner: S,
}

impl<Q, M, S: Clone> Clone for AllocationCoordinator<Q, M, S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            queue: Arc::clone(&self.queue),
            live: Arc::clone(&self.live),
            cache: Arc::clone(&self.cache),
            directory: Arc::clone(&self.directory),
            mailbox: Arc::clone(&self.mailbox),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            counters: Arc::clone(&self.counters),
            spawner: self.spawner.clone(),
        }
    }
}

impl<Q, M, S> AllocationCoordinator<Q, M, S> {
    /// Create a coordinator from components.
    pub fn new(
        config: CoordinatorConfig,
        queue: Q,
        mailbox: M,
        directory: Arc<dyn Directory>,
        spawner: S,
    ) -> Self {
        Self {
            config,
            queue: Arc::new(Mutex::new(queue)),
            live: Arc::new(Mutex::new(HashMap::new())),
            cache: Arc::new(RwLock::new(HashMap::new())),
            directory,
            mailbox: Arc::new(Mutex::new(mailbox)),
            events: None,
            metrics: None,
            counters: Arc::new(Counters::default()),
            spawner,
        }
    }

    /// Emit load and wait events to `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Attach a metrics sink.
    pub fn with_metrics(mut self, sink: SharedMetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Shared mailbox, for reading delivered notices.
    pub fn mailbox(&self) -> Arc<Mutex<M>> {
        Arc::clone(&self.mailbox)
    }

    /// Configuration in use.
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Copy of a live request.
    pub fn request(&self, id: RequestId) -> Option<Request> {
        self.live.lock().get(&id).cloned()
    }

    /// Rebuild every per-kind cache from the directory. Returns the number of
    /// cached handles.
    pub fn refresh_discovery(&self) -> usize {
        let mut fresh = HashMap::new();
        for kind in ResourceKind::all() {
            let handles = self.directory.lookup(kind);
            if !handles.is_empty() {
                fresh.insert(kind, handles);
            }
        }
        let total = fresh.values().map(Vec::len).sum();
        *self.cache.write() = fresh;
        tracing::debug!(handles = total, "discovery cache refreshed");
        total
    }

    fn handles(&self, kind: ResourceKind) -> Vec<SharedHandle> {
        self.cache.read().get(&kind).cloned().unwrap_or_default()
    }

    fn find_handle(&self, kind: ResourceKind, id: &str) -> Option<SharedHandle> {
        self.handles(kind)
            .into_iter()
            .find(|h| h.id() == id)
            .or_else(|| self.directory.lookup(kind).into_iter().find(|h| h.id() == id))
    }

    fn emit(&self, event: CoordinatorEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                tracing::debug!("coordinator event receiver dropped");
            }
        }
    }
}

impl<Q, M, S> AllocationCoordinator<Q, M, S>
where
    Q: RequestQueue + 'static,
    M: Mailbox + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Validate and queue a request. Returns the queue depth.
    pub fn submit(&self, request: Request) -> Result<usize, EngineError> {
        if request.status != RequestStatus::Waiting {
            return Err(EngineError::InvalidState {
                id: request.id,
                expected: RequestStatus::Waiting.as_str(),
                actual: request.status.as_str(),
            });
        }
        let id = request.id;
        {
            let mut live = self.live.lock();
            if live.contains_key(&id) {
                return Err(EngineError::DuplicateRequest(id));
            }
            live.insert(id, request.clone());
        }
        let depth = {
            let mut queue = self.queue.lock();
            match queue.enqueue(request) {
                Ok(()) => queue.len(),
                Err(e) => {
                    drop(queue);
                    self.live.lock().remove(&id);
                    tracing::warn!(request = id, error = %e, "request rejected");
                    return Err(e);
                }
            }
        };
        tracing::info!(request = id, depth, "request queued");
        Ok(depth)
    }

    /// Queue length.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    fn ready(&self) -> bool {
        !self.queue.lock().is_empty() && !self.handles(ResourceKind::Doctor).is_empty()
    }

    fn pop_head(&self) -> Option<Request> {
        if !self.ready() {
            return None;
        }
        match self.queue.lock().dequeue() {
            Ok(head) => head,
            Err(e) => {
                tracing::error!(error = %e, "queue dequeue failed");
                None
            }
        }
    }

    /// Pop the head and negotiate it on the spawner. Returns whether a
    /// negotiation was started.
    pub fn dispatch_tick(&self, now_ms: u128) -> bool {
        let Some(request) = self.pop_head() else {
            return false;
        };
        let this = self.clone();
        self.spawner.spawn(async move {
            this.negotiate(request, now_ms).await;
        });
        true
    }

    /// Pop the head and negotiate it inline.
    pub async fn dispatch_next(&self, now_ms: u128) -> DispatchOutcome {
        match self.pop_head() {
            Some(request) => self.negotiate(request, now_ms).await,
            None => DispatchOutcome::Idle,
        }
    }

    fn doctor_availability(&self) -> f64 {
        let known: HashSet<String> = self
            .handles(ResourceKind::Doctor)
            .iter()
            .map(|h| h.id().to_owned())
            .collect();
        if known.is_empty() {
            return 0.0;
        }
        let held = self
            .live
            .lock()
            .values()
            .filter_map(|r| r.bindings.doctor.as_ref())
            .filter(|id| known.contains(*id))
            .count();
        (known.len() - held.min(known.len())) as f64 / known.len() as f64
    }

    async fn negotiate(&self, mut request: Request, now_ms: u128) -> DispatchOutcome {
        let conversation = Uuid::new_v4();
        let span = tracing::info_span!("negotiation", request = request.id, %conversation);
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);

        request.attempts += 1;
        request.dispatch = Some(DispatchContext {
            queue_len: self.queue_len() + 1,
            availability: self.doctor_availability(),
        });
        let outcome = self.run_steps(request, now_ms).instrument(span).await;

        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
        outcome
    }

    async fn run_steps(&self, mut request: Request, now_ms: u128) -> DispatchOutcome {
        let timeout = self.config.reply_timeout();
        let mut failed_kind = None;
        // Allocate timeouts may still land later; these get a release too.
        let mut unconfirmed: Vec<(ResourceKind, SharedHandle)> = Vec::new();

        for kind in request.required_kinds() {
            tracing::debug!(phase = %NegotiationPhase::Discover(kind), "step");
            let handles = self.handles(kind);
            let round = collect_bids(&handles, request.category, timeout).await;
            let Some(winner) = round.winner else {
                tracing::warn!(%kind, replies = round.replies, instances = handles.len(), "no instance confirmed");
                failed_kind = Some(kind);
                break;
            };

            tracing::debug!(phase = %NegotiationPhase::Bind(kind), resource = winner.id(), "step");
            match tokio::time::timeout(timeout, winner.allocate(request.id, request.category)).await {
                Ok(reply) if reply.outcome == AllocationOutcome::Allocated => {
                    if let Err(e) = request.bind(kind, reply.resource_id.clone()) {
                        tracing::error!(error = %e, "binding rejected");
                        unconfirmed.push((kind, winner));
                        failed_kind = Some(kind);
                        break;
                    }
                    self.emit(CoordinatorEvent::Assigned {
                        resource_id: reply.resource_id,
                        kind,
                        request_id: request.id,
                    });
                }
                Ok(reply) => {
                    tracing::warn!(%kind, resource = %reply.resource_id, "lost allocation race");
                    failed_kind = Some(kind);
                    break;
                }
                Err(_) => {
                    tracing::warn!(%kind, resource = winner.id(), "allocation timed out");
                    unconfirmed.push((kind, winner));
                    failed_kind = Some(kind);
                    break;
                }
            }
        }

        match failed_kind {
            None if request.fully_bound() => self.finalize(request, now_ms),
            None => {
                // Unreachable with the fixed kind table; treated as a failed doctor step.
                self.fail(request, ResourceKind::Doctor, unconfirmed).await
            }
            Some(kind) => self.fail(request, kind, unconfirmed).await,
        }
    }

    fn finalize(&self, mut request: Request, now_ms: u128) -> DispatchOutcome {
        tracing::debug!(phase = %NegotiationPhase::Finalize, "step");
        let waiting_ms = now_ms.saturating_sub(request.arrival_ms);
        request.status = RequestStatus::InProgress;
        request.waiting_ms = Some(waiting_ms);

        let notice = AllocationNotice {
            request_id: request.id,
            requester: request.requester.clone(),
            category: request.category,
            doctor: request.bindings.doctor.clone().unwrap_or_default(),
            room: request.bindings.room.clone().unwrap_or_default(),
            equipment: request.bindings.equipment.clone(),
            delivered_at_ms: now_ms,
        };
        if let Err(e) = self.mailbox.lock().deliver(notice.clone()) {
            tracing::error!(request = request.id, error = %e, "failed to notify requester");
        }
        self.counters.successes.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_wait_ms
            .fetch_add(u64::try_from(waiting_ms).unwrap_or(u64::MAX), Ordering::Relaxed);
        tracing::info!(
            request = request.id,
            category = %request.category,
            urgency = %request.urgency,
            doctor = %notice.doctor,
            room = %notice.room,
            equipment = ?notice.equipment,
            waiting_ms = %waiting_ms,
            "resources allocated"
        );
        self.live.lock().insert(request.id, request);
        DispatchOutcome::Allocated(notice)
    }

    async fn fail(
        &self,
        mut request: Request,
        failed_kind: ResourceKind,
        unconfirmed: Vec<(ResourceKind, SharedHandle)>,
    ) -> DispatchOutcome {
        if self.config.compensate_on_failure {
            tracing::debug!(phase = %NegotiationPhase::Compensate, "step");
            for (kind, id) in request.bound_resources() {
                self.release_one(kind, &id, request.id).await;
            }
            for (kind, handle) in unconfirmed {
                let release = handle.release(request.id);
                if tokio::time::timeout(self.config.reply_timeout(), release).await.is_err() {
                    tracing::warn!(
                        resource = %handle.id(),
                        %kind,
                        request = request.id,
                        "release of unconfirmed resource timed out"
                    );
                }
            }
        }
        request.bindings.clear();
        request.status = RequestStatus::Waiting;
        self.counters.failures.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(phase = %NegotiationPhase::Requeue, "step");
        let id = request.id;
        self.live.lock().insert(id, request.clone());
        let requeued = self.queue.lock().requeue(request);
        match requeued {
            Ok(()) => {
                tracing::warn!(request = id, kind = %failed_kind, "allocation failed, request requeued");
            }
            Err(e) => {
                tracing::error!(request = id, error = %e, "requeue failed, dropping request");
                self.live.lock().remove(&id);
            }
        }
        DispatchOutcome::Requeued {
            request_id: id,
            failed_kind,
        }
    }

    async fn release_one(&self, kind: ResourceKind, id: &ResourceId, request: RequestId) {
        let Some(handle) = self.find_handle(kind, id) else {
            tracing::warn!(resource = %id, "cannot release unknown resource");
            return;
        };
        match tokio::time::timeout(self.config.reply_timeout(), handle.release(request)).await {
            Ok(reply) => tracing::debug!(resource = %reply.resource_id, request, "released"),
            Err(_) => tracing::warn!(resource = %id, request, "release timed out"),
        }
        self.emit(CoordinatorEvent::Released {
            resource_id: id.clone(),
            kind,
            request_id: request,
        });
    }

    /// Mark an in-progress request COMPLETED, release its resources and emit
    /// its wait observation. Returns the completed request.
    pub async fn on_completion(&self, id: RequestId, now_ms: u128) -> Result<Request, EngineError> {
        let mut request = {
            let mut live = self.live.lock();
            let request = live.get(&id).ok_or(EngineError::UnknownRequest(id))?;
            if request.status != RequestStatus::InProgress {
                return Err(EngineError::InvalidState {
                    id,
                    expected: RequestStatus::InProgress.as_str(),
                    actual: request.status.as_str(),
                });
            }
            live.remove(&id).ok_or(EngineError::UnknownRequest(id))?
        };
        request.status = RequestStatus::Completed;

        for (kind, resource) in request.bound_resources() {
            self.release_one(kind, &resource, id).await;
        }
        self.counters.completed.fetch_add(1, Ordering::Relaxed);

        if let (Some(ctx), Some(waiting_ms)) = (request.dispatch, request.waiting_ms) {
            let unit = self.config.wait_time_unit_ms as f64;
            self.emit(CoordinatorEvent::WaitObserved(Observation {
                input: PredictionInput {
                    urgency: request.urgency,
                    queue_size: ctx.queue_len,
                    hour_of_day: hour_of_day(request.arrival_ms),
                    availability: ctx.availability,
                },
                actual_wait: waiting_ms as f64 / unit,
            }));
        }
        tracing::info!(
            request = id,
            held_ms = %now_ms.saturating_sub(request.arrival_ms),
            "request completed"
        );
        Ok(request)
    }

    /// Counters and cache sizes.
    pub fn stats(&self) -> CoordinatorStats {
        let successes = self.counters.successes.load(Ordering::Relaxed);
        let total_wait = self.counters.total_wait_ms.load(Ordering::Relaxed);
        let known_resources = self
            .cache
            .read()
            .iter()
            .map(|(kind, handles)| (kind.to_string(), handles.len()))
            .collect();
        CoordinatorStats {
            queue_length: self.queue_len(),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            successful_allocations: successes,
            failed_allocations: self.counters.failures.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            average_wait_ms: if successes == 0 {
                0.0
            } else {
                total_wait as f64 / successes as f64
            },
            known_resources,
        }
    }

    /// Push the statistics report to the attached sink.
    pub fn publish_metrics(&self) {
        let stats = self.stats();
        tracing::info!(
            queue = stats.queue_length,
            processed = stats.processed,
            successful = stats.successful_allocations,
            failed = stats.failed_allocations,
            average_wait_ms = stats.average_wait_ms,
            "coordinator statistics"
        );
        let Some(sink) = &self.metrics else {
            return;
        };
        sink.record(MetricEvent::gauge("coordinator.queue_length", stats.queue_length as f64));
        sink.record(MetricEvent::gauge("coordinator.in_flight", stats.in_flight as f64));
        sink.record(MetricEvent::gauge(
            "coordinator.successful_allocations",
            stats.successful_allocations as f64,
        ));
        sink.record(MetricEvent::gauge(
            "coordinator.failed_allocations",
            stats.failed_allocations as f64,
        ));
        sink.record(MetricEvent::gauge("coordinator.completed", stats.completed as f64));
        sink.record(MetricEvent::sample("coordinator.average_wait_ms", stats.average_wait_ms));
    }
}
