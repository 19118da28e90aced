//! Error taxonomy shared across the extraction pipeline
//!
//! - [`SchemaDefinitionError`]: malformed field specifications, fatal at build time
//! - [`ModelCallError`]: scoped to a single model call, recovered by fallback/retry
//! - [`FailureReason`]: run-level exhaustion conditions, terminal

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A field specification tree that cannot be turned into a schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaDefinitionError {
    #[error("Stage '{stage}' declares no fields and is not marked comparison-only")]
    NoFields { stage: String },

    #[error("Field at '{path}' has an empty name")]
    EmptyName { path: String },

    #[error("Duplicate field '{name}' in '{scope}'")]
    DuplicateField { scope: String, name: String },

    #[error("Enum field '{path}' declares no allowed values")]
    MissingAllowedValues { path: String },

    #[error("List field '{path}' declares no item type")]
    MissingItemType { path: String },

    #[error("List field '{path}' holds lists directly; wrap the inner list in an object")]
    NestedListItem { path: String },

    #[error("Structural field '{path}' declares no nested fields")]
    MissingNestedFields { path: String },

    #[error("Field '{path}' is conditionally required on unknown sibling '{sibling}'")]
    UnknownConditionField { path: String, sibling: String },

    #[error("Failed to compile schema for stage '{stage}': {message}")]
    Compile { stage: String, message: String },
}

/// Coarse classification of a model call failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    QuotaExceeded,
    Timeout,
    MalformedOutput,
    TransportError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MalformedOutput => "malformed_output",
            ErrorKind::TransportError => "transport_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure of one model call
///
/// Carries enough detail (raw output, validation errors) for the next
/// attempt's retry context to describe what went wrong.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelCallError {
    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("Timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Malformed output: {}", .validation_errors.join("; "))]
    MalformedOutput {
        raw_output: String,
        validation_errors: Vec<String>,
    },

    #[error("Transport error: {message}")]
    TransportError { message: String },
}

impl ModelCallError {
    pub fn quota(message: impl Into<String>) -> Self {
        ModelCallError::QuotaExceeded {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ModelCallError::TransportError {
            message: message.into(),
        }
    }

    pub fn malformed(raw_output: impl Into<String>, validation_errors: Vec<String>) -> Self {
        ModelCallError::MalformedOutput {
            raw_output: raw_output.into(),
            validation_errors,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelCallError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            ModelCallError::Timeout { .. } => ErrorKind::Timeout,
            ModelCallError::MalformedOutput { .. } => ErrorKind::MalformedOutput,
            ModelCallError::TransportError { .. } => ErrorKind::TransportError,
        }
    }

    /// Whether the slot should be handed to a fallback model
    ///
    /// Quota exhaustion and per-call timeouts are properties of the model,
    /// not of the prompt, so a substitute model gets one try.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            ModelCallError::QuotaExceeded { .. } | ModelCallError::Timeout { .. }
        )
    }

    /// Raw model output, when the failure happened after a response arrived
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            ModelCallError::MalformedOutput { raw_output, .. } => Some(raw_output),
            _ => None,
        }
    }
}

/// Why a run ended in `failed`
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("Cost budget exhausted: spent ${spent:.4} of ${budget:.4}")]
    BudgetExceeded { spent: f64, budget: f64 },

    #[error(
        "Iteration limit of {limit} reached before target accuracy (best accuracy {best_accuracy:.2})"
    )]
    IterationLimitExceeded { limit: u32, best_accuracy: f64 },

    #[error("All configured models failed for stage '{stage}'")]
    AllModelsFailed { stage: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run exceeded its wall-clock limit of {limit_ms} ms")]
    RunTimeout { limit_ms: u64 },
}

impl FailureReason {
    /// Check if this reason represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FailureReason::Cancelled)
    }
}
