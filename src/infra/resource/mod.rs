//! In-process resource units.

pub mod local;

pub use local::LocalResource;
