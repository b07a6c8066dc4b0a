//! # Prometheus Ward
//!
//! Urgency-aware allocation of typed resources (doctors, rooms, equipment)
//! with load balancing, heartbeat-based fault tolerance and wait-time
//! prediction.
//!
//! The engine is four cooperating components, each running as its own task
//! and reached only through message handles:
//!
//! - **Allocation coordinator**: queues patient requests by urgency and
//!   arrival, then negotiates doctor, room and required equipment one kind at
//!   a time. A failed step releases what was bound and requeues the request.
//! - **Load balancer**: tracks per-instance load with an exponential moving
//!   average, selects instances with a pluggable strategy and reports skew as
//!   migration hints.
//! - **Fault tolerance manager**: marks silent actors suspected, then failed,
//!   and respawns them from their persisted arguments with bounded retries.
//! - **Wait-time predictor**: a linear model pre-trained on synthetic data and
//!   adapted online from observed waits.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_ward::builders::EngineBuilder;
//! use prometheus_ward::config::EngineConfig;
//! use prometheus_ward::core::{Category, EquipmentKind, Request, ResourceKind, Specialization};
//! use prometheus_ward::infra::{InMemoryDirectory, LocalResource};
//! use prometheus_ward::util::{now_ms, Urgency};
//!
//! let directory = InMemoryDirectory::new();
//! directory.register(LocalResource::doctor("D1", Specialization::Emergency));
//! directory.register(LocalResource::room("R1", 1));
//! directory.register(LocalResource::unit("ECG1", ResourceKind::Equipment(EquipmentKind::Ecg)));
//!
//! let engine = EngineBuilder::new(EngineConfig::from_env()?, Arc::new(directory)).build()?;
//! let request = Request::new(1, "P1", Category::Emergency, Urgency::new(5)?, now_ms());
//! engine.coordinator.submit(request).await?;
//! ```
//!
//! For complete scenarios, see `tests/allocation_test.rs` and
//! `tests/fault_tolerance_test.rs`.

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core domain model, errors, collaborator traits and metrics.
pub mod core;
/// Configuration models for every component.
pub mod config;
/// Builders to construct the engine from configuration.
pub mod builders;
/// Allocation coordination.
pub mod coordinator;
/// Load balancing.
pub mod balancer;
/// Fault detection and recovery.
pub mod fault;
/// Wait-time prediction.
pub mod predictor;
/// Infrastructure adapters for queues, mailboxes, stores and resources.
pub mod infra;
/// Runtime services and message API.
pub mod runtime;
/// Shared utilities.
pub mod util;
