//! Input, outcome and error types for the RunExtraction use case.

use crate::config::ExtractionConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfscan_domain::extraction::IllegalTransition;
use shelfscan_domain::{
    AuditEntry, ConfigIssue, CostInfo, FailureReason, ImageInput, OrchestrationRun, RunState,
    SchemaDefinitionError,
};
use thiserror::Error;

/// Errors that prevent a run from starting or indicate a broken state machine
///
/// Run-level exhaustion (budget, iterations, cancellation) is not an error:
/// it ends the run as `failed` and is reported in [`RunOutcome`].
#[derive(Error, Debug)]
pub enum RunExtractionError {
    #[error("Invalid extraction configuration: {}", format_issues(.0))]
    InvalidConfig(Vec<ConfigIssue>),

    #[error("Schema definition error: {0}")]
    SchemaDefinition(#[from] SchemaDefinitionError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

fn format_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Input for the RunExtraction use case
#[derive(Debug, Clone)]
pub struct RunExtractionInput {
    /// Already-resolved image; the core does no fetching
    pub image: ImageInput,
    pub config: ExtractionConfig,
}

impl RunExtractionInput {
    pub fn new(image: ImageInput, config: ExtractionConfig) -> Self {
        Self { image, config }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Escalated,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Completion record returned to the caller once a run is terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// Assembled result; the best partial result when not completed
    pub final_result: Option<Value>,
    pub final_accuracy: f64,
    pub total_cost: CostInfo,
    pub total_iterations: u32,
    /// Human-readable reason when not completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalated_fields: Vec<String>,
    pub audit_log: Vec<AuditEntry>,
}

impl RunOutcome {
    /// Build the completion record from a terminal run
    pub(super) fn from_run(run: &OrchestrationRun) -> Self {
        let status = match run.state() {
            RunState::Completed => RunStatus::Completed,
            RunState::Escalated => RunStatus::Escalated,
            _ => RunStatus::Failed,
        };

        let (final_result, final_accuracy) = match status {
            RunStatus::Completed => (
                Some(run.outputs().assemble()),
                run.last_accuracy().unwrap_or(0.0),
            ),
            _ => match run.best() {
                Some(best) => (Some(best.value.clone()), best.accuracy),
                None if !run.outputs().is_empty() => (Some(run.outputs().assemble()), 0.0),
                None => (None, 0.0),
            },
        };

        let reason = match status {
            RunStatus::Completed => None,
            RunStatus::Escalated => Some(format!(
                "Models disagreed on fields that require human review: {}",
                run.escalated_fields().join(", ")
            )),
            RunStatus::Failed => run.failure().map(ToString::to_string),
        };

        Self {
            run_id: run.id().to_string(),
            status,
            final_result,
            final_accuracy,
            total_cost: run.ledger().spent(),
            total_iterations: run.iteration(),
            reason,
            failure: run.failure().cloned(),
            escalated_fields: run.escalated_fields().to_vec(),
            audit_log: run.audit_log().to_vec(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
