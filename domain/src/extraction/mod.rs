//! Extraction pipeline entities
//!
//! [`OrchestrationRun`] 1—* [`StageResult`] 1—* [`ExtractionAttempt`].

pub mod assembly;
pub mod attempt;
pub mod cost;
pub mod image;
pub mod result;
pub mod retry;
pub mod run;
pub mod stage;
pub mod visual;

pub use assembly::StageOutputs;
pub use attempt::ExtractionAttempt;
pub use cost::{CostInfo, CostLedger, Reservation};
pub use image::ImageInput;
pub use result::{Candidate, FieldDisagreement, Resolution, StageResult, StageStatus};
pub use retry::RetryContext;
pub use run::{AuditEntry, Decision, IllegalTransition, OrchestrationRun, PartialResult, RunState};
pub use stage::Stage;
pub use visual::{VisualIssue, VisualReport, normalize_score};

/// Get current timestamp in milliseconds
pub(crate) fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
