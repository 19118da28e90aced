//! Port definitions (interfaces for external systems)
//!
//! Ports define the boundaries between the application layer and
//! infrastructure. Adapters in the infrastructure layer implement these.

pub mod audit_sink;
pub mod model_backend;
pub mod progress;
