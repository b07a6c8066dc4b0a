//! Persisted actor-state backends.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryStateStore;
