//! Actor lifecycle backends.

pub mod memory;

pub use memory::InMemoryLifecycle;
