//! Keeps a metadata handler in sync with the namespaces, pods, endpoints, services and
//! nodes of a Kubernetes cluster: one full listing per kind, then a long-lived watch
//! whose changes are forwarded as `Envelope`s.

pub mod cluster;
pub mod config;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod lister;
pub mod utils;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::MetadataController;
pub use envelope::{Envelope, EventType, ResourceKind, ResourceObject, ResourceVersion};
pub use error::Error;
pub use handler::MetadataHandler;
