//! Infrastructure layer for shelfscan
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: HTTP vision-model providers behind a routing
//! [`ModelBackend`](shelfscan_application::ModelBackend), audit sinks, and
//! configuration file loading.

pub mod config;
pub mod logging;
pub mod providers;

// Re-export commonly used types
pub use config::{
    ConfigError, ConfigLoader, FileConfig, FileOutputConfig, FileProviderConfig,
    FileProvidersConfig, FileRunConfig, FileStageConfig,
};
pub use logging::{JsonlAuditSink, TracingAuditSink};
pub use providers::{
    ProviderAdapter, ProviderKind,
    error::ProviderError,
    pricing::{ModelPrice, PricingTable},
    routing::{RoutingBackend, RoutingTable},
};
