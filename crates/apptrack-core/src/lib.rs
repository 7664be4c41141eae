//! apptrack core - platform-independent registry of running applications
//!
//! This crate provides the entry model, the behavior store and change bus,
//! the snapshot builder, the live registry and the service that serializes
//! every update to it. Platform crates supply the process sources.

pub mod behavior;
pub mod config;
pub mod entry;
pub mod error;
pub mod notifier;
pub mod process;
pub mod registry;
pub mod service;
pub mod snapshot;

pub use behavior::*;
pub use config::*;
pub use entry::*;
pub use error::*;
pub use notifier::*;
pub use process::*;
pub use registry::*;
pub use service::{RegistryHandle, RegistryService, RegistrySnapshot};
pub use snapshot::*;
