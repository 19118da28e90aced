//! Application layer for shelfscan
//!
//! This crate contains use cases, port definitions, and run configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::{ExecutionParams, ExtractionConfig, StageConfig};
pub use ports::{
    audit_sink::{AuditSink, CompositeAuditSink, NoAuditSink},
    model_backend::{ModelBackend, ModelCallFailure, ModelReply, ModelRequest},
    progress::{NoProgress, ProgressNotifier},
};
pub use use_cases::execute_stage::{StageExecutor, StageInput};
pub use use_cases::run_extraction::{
    RunExtractionError, RunExtractionInput, RunExtractionUseCase, RunOutcome, RunStatus,
};
