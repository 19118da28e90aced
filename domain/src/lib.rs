//! Domain layer for shelfscan
//!
//! This crate contains the core business logic, entities, and value objects.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Dynamic schemas
//!
//! Each extraction stage declares its output as a tree of [`FieldSpec`]s.
//! The [`SchemaBuilder`] flattens redundant wrappers, resolves field types
//! and compiles a [`StageSchema`] that both constrains the prompt and
//! validates every model response.
//!
//! ## Consensus
//!
//! Several vision models answer each stage. The [`ConsensusResolver`]
//! reconciles their outputs field by field into one [`StageResult`] with an
//! agreement-weighted confidence, recording every disagreement.
//!
//! ## Runs
//!
//! An [`OrchestrationRun`] walks `pending → structure → products → details →
//! visual_validation` and ends `completed`, `failed` or `escalated`, with
//! every transition recorded as an [`AuditEntry`].

pub mod config;
pub mod consensus;
pub mod core;
pub mod extraction;
pub mod prompt;
pub mod schema;

// Re-export commonly used types
pub use config::{ConfigIssue, ConfigIssueCode, OutputFormat, Severity};
pub use consensus::{ConsensusPolicy, ConsensusResolver, EscalationPolicy};
pub use core::{
    error::{ErrorKind, FailureReason, ModelCallError, SchemaDefinitionError},
    model::ModelId,
};
pub use extraction::{
    AuditEntry, Decision, ExtractionAttempt, FieldDisagreement, ImageInput, OrchestrationRun,
    Resolution, RetryContext, RunState, Stage, StageOutputs, StageResult, StageStatus,
    VisualReport,
    cost::{CostInfo, CostLedger},
};
pub use prompt::{ExtractionPromptTemplate, StagePromptInput};
pub use schema::{FieldSpec, FieldType, SchemaBuilder, StageSchema};
