//! Application-level configuration.
//!
//! This module provides configuration types that control how use cases behave:
//!
//! - [`ExtractionConfig`] — the per-run configuration (budgets, stages, models)
//! - [`StageConfig`] — fields and models of one pipeline stage
//! - [`ExecutionParams`] — timeouts and loop control

pub mod execution_params;
pub mod extraction_config;

pub use execution_params::ExecutionParams;
pub use extraction_config::{ExtractionConfig, StageConfig};
