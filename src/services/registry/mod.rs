//! In-memory registry module
//!
//! - `types`: instance records and the service table
//! - `service`: `MemoryRegistry` and its `Discovery` implementation
//! - `cleanup`: optional background reaper for long-expired instances

pub mod cleanup;
pub mod service;
pub mod types;

pub use service::MemoryRegistry;
pub use types::{InstanceRecord, RegistryStats, ServiceInstances, ServiceTable};
