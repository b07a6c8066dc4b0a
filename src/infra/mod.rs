//! Infrastructure adapters for queues, mailboxes, state stores, directories,
//! resource units and actor lifecycle.

pub mod directory;
pub mod lifecycle;
pub mod mailbox;
pub mod queue;
pub mod resource;
pub mod store;

pub use directory::InMemoryDirectory;
pub use lifecycle::InMemoryLifecycle;
pub use mailbox::InMemoryMailbox;
pub use queue::InMemoryQueue;
pub use resource::LocalResource;
pub use store::{InMemoryStateStore, JsonFileStore};
