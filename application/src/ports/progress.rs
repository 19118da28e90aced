//! Progress notification port
//!
//! Defines the interface for reporting progress during an extraction run.

use shelfscan_domain::{AuditEntry, ErrorKind, ModelId, Stage, StageResult};

/// Callback for progress updates during an extraction run
///
/// Implementations live in the presentation layer (CLI) and can display
/// progress in various ways.
pub trait ProgressNotifier: Send + Sync {
    /// Called when a stage starts with the number of model slots
    fn on_stage_start(&self, stage: Stage, iteration: u32, models: usize);

    /// Called when one model call finishes
    fn on_attempt_complete(&self, stage: Stage, model: &ModelId, error: Option<ErrorKind>);

    /// Called after consensus for a stage
    fn on_stage_complete(&self, _result: &StageResult) {}

    /// Called after every state transition
    fn on_transition(&self, _entry: &AuditEntry) {}
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl ProgressNotifier for NoProgress {
    fn on_stage_start(&self, _stage: Stage, _iteration: u32, _models: usize) {}
    fn on_attempt_complete(&self, _stage: Stage, _model: &ModelId, _error: Option<ErrorKind>) {}
}
