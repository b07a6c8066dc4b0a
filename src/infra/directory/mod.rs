//! Directory backends.

pub mod memory;

pub use memory::InMemoryDirectory;
