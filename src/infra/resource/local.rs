//! In-process resource unit with an accept/refuse gate.
//!
//! The gate is the only double-booking guard in the system: allocation
//! succeeds only while the unit is free and suitable, under one lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{
    AllocateReply, AllocationOutcome, Availability, AvailabilityReply, Category, ReleaseReply,
    ResourceDescriptor, ResourceHandle, ResourceKind, Specialization,
};
use crate::util::serde::RequestId;

/// Resource unit living in the current process.
pub struct LocalResource {
    id: String,
    kind: ResourceKind,
    specialization: Option<Specialization>,
    state: Mutex<ResourceDescriptor>,
    latency: Mutex<Option<Duration>>,
    responsive: AtomicBool,
}

impl LocalResource {
    /// Doctor with a specialisation.
    pub fn doctor(id: impl Into<String>, specialization: Specialization) -> Arc<Self> {
        Arc::new(Self::build(id.into(), ResourceKind::Doctor, 1, Some(specialization)))
    }

    /// Treatment room.
    pub fn room(id: impl Into<String>, capacity: u32) -> Arc<Self> {
        Arc::new(Self::build(id.into(), ResourceKind::Room, capacity, None))
    }

    /// Unit of any kind with capacity 1 and no specialisation.
    pub fn unit(id: impl Into<String>, kind: ResourceKind) -> Arc<Self> {
        Arc::new(Self::build(id.into(), kind, 1, None))
    }

    fn build(
        id: String,
        kind: ResourceKind,
        capacity: u32,
        specialization: Option<Specialization>,
    ) -> Self {
        Self {
            state: Mutex::new(ResourceDescriptor::new(id.clone(), kind, capacity)),
            id,
            kind,
            specialization,
            latency: Mutex::new(None),
            responsive: AtomicBool::new(true),
        }
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// An unresponsive unit never answers checks or allocations.
    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::Release);
    }

    /// Current descriptor.
    pub fn descriptor(&self) -> ResourceDescriptor {
        self.state.lock().clone()
    }

    /// Request holding the unit.
    pub fn holder(&self) -> Option<RequestId> {
        self.state.lock().holder
    }

    fn suits(&self, category: Category) -> bool {
        self.specialization.is_none_or(|s| s.suits(category))
    }

    async fn reply_delay(&self) {
        if !self.responsive.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ResourceHandle for LocalResource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn check_availability(&self, category: Category) -> AvailabilityReply {
        self.reply_delay().await;
        let state = self.state.lock();
        let status = if state.available && state.holder.is_none() && self.suits(category) {
            Availability::Available
        } else {
            Availability::Busy
        };
        AvailabilityReply {
            resource_id: self.id.clone(),
            status,
        }
    }

    async fn allocate(&self, request: RequestId, category: Category) -> AllocateReply {
        self.reply_delay().await;
        let mut state = self.state.lock();
        let outcome = if state.available && state.holder.is_none() && self.suits(category) {
            state.available = false;
            state.holder = Some(request);
            state.usage_count += 1;
            AllocationOutcome::Allocated
        } else {
            AllocationOutcome::NotAvailable
        };
        tracing::debug!(resource = %self.id, request, ?outcome, "allocate");
        AllocateReply {
            resource_id: self.id.clone(),
            outcome,
        }
    }

    async fn release(&self, request: RequestId) -> ReleaseReply {
        let mut state = self.state.lock();
        if state.holder == Some(request) {
            state.holder = None;
            state.available = true;
        }
        ReleaseReply {
            resource_id: self.id.clone(),
        }
    }
}
