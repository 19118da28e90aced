//! Orchestration run entity and its state graph
//!
//! ```text
//! pending ──▶ structure ──▶ products ──▶ details ──▶ visual_validation ──▶ completed
//!               ▲   ↺          ▲   ↺        ▲   ↺          │   ↺
//!               │              └────────────┴──────────────┤  feedback cycle
//!               └──────────────────────────────────────────┘  restart
//!
//! any stage ──▶ failed | escalated
//! ```
//!
//! Every transition appends an immutable [`AuditEntry`].

use super::assembly::StageOutputs;
use super::cost::CostLedger;
use super::result::StageResult;
use super::stage::Stage;
use crate::core::error::FailureReason;
use crate::core::model::ModelId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Structure,
    Products,
    Details,
    VisualValidation,
    Completed,
    Failed,
    Escalated,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Escalated)
    }

    pub fn stage(self) -> Option<Stage> {
        match self {
            Self::Structure => Some(Stage::Structure),
            Self::Products => Some(Stage::Products),
            Self::Details => Some(Stage::Details),
            Self::VisualValidation => Some(Stage::VisualValidation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Structure => "structure",
            Self::Products => "products",
            Self::Details => "details",
            Self::VisualValidation => "visual_validation",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
        }
    }
}

impl From<Stage> for RunState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Structure => Self::Structure,
            Stage::Products => Self::Products,
            Stage::Details => Self::Details,
            Stage::VisualValidation => Self::VisualValidation,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn is_legal_transition(from: RunState, to: RunState) -> bool {
    use RunState::*;

    if from.stage().is_some() && matches!(to, Failed | Escalated) {
        return true;
    }

    matches!(
        (from, to),
        (Pending, Structure)
            | (Pending, Failed)
            // Stage retries
            | (Structure, Structure)
            | (Products, Products)
            | (Details, Details)
            | (VisualValidation, VisualValidation)
            // Forward progress
            | (Structure, Products)
            | (Products, Details)
            | (Details, VisualValidation)
            // Without a visual validation stage the pass ends after details
            | (Details, Completed)
            | (Details, Structure)
            // After visual validation: done, feedback cycle, or restart
            | (VisualValidation, Completed)
            | (VisualValidation, Products)
            | (VisualValidation, Details)
            | (VisualValidation, Structure)
    )
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal run transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: RunState,
    pub to: RunState,
}

/// What the state machine decided at a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Start,
    Advance,
    RetryStage,
    FeedbackCycle,
    Restart,
    Complete,
    Fail,
    Escalate,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Start => "start",
            Decision::Advance => "advance",
            Decision::RetryStage => "retry_stage",
            Decision::FeedbackCycle => "feedback_cycle",
            Decision::Restart => "restart",
            Decision::Complete => "complete",
            Decision::Fail => "fail",
            Decision::Escalate => "escalate",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub run_id: String,
    pub sequence: u32,
    /// Stage the decision was made about
    pub stage: Option<Stage>,
    pub iteration: u32,
    pub from: RunState,
    pub to: RunState,
    pub decision: Decision,
    pub reasoning: String,
    pub models_used: Vec<ModelId>,
    /// Stage result that led to the decision, attempts included
    pub stage_result: Option<StageResult>,
    /// USD spent since the previous entry
    pub cost_delta: f64,
    pub cumulative_cost: f64,
    pub accuracy: Option<f64>,
    pub accuracy_delta: Option<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// Best assembled result seen so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    pub value: Value,
    pub accuracy: f64,
}

/// The top-level unit of extraction work
///
/// Mutated only by the orchestration state machine; terminal once the state
/// reaches completed, failed or escalated.
#[derive(Debug, Clone)]
pub struct OrchestrationRun {
    id: String,
    state: RunState,
    iteration: u32,
    max_iterations: u32,
    feedback_cycles: u32,
    ledger: CostLedger,
    stage_results: BTreeMap<Stage, Vec<StageResult>>,
    outputs: StageOutputs,
    audit_log: Vec<AuditEntry>,
    best: Option<PartialResult>,
    last_accuracy: Option<f64>,
    failure: Option<FailureReason>,
    escalated_fields: Vec<String>,
}

impl OrchestrationRun {
    pub fn new(id: impl Into<String>, max_iterations: u32, cost_budget: f64) -> Self {
        Self {
            id: id.into(),
            state: RunState::Pending,
            iteration: 0,
            max_iterations,
            feedback_cycles: 0,
            ledger: CostLedger::new(cost_budget),
            stage_results: BTreeMap::new(),
            outputs: StageOutputs::new(),
            audit_log: Vec::new(),
            best: None,
            last_accuracy: None,
            failure: None,
            escalated_fields: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Iterations consumed so far
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn feedback_cycles(&self) -> u32 {
        self.feedback_cycles
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut CostLedger {
        &mut self.ledger
    }

    pub fn outputs(&self) -> &StageOutputs {
        &self.outputs
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    pub fn stage_results(&self, stage: Stage) -> &[StageResult] {
        self.stage_results.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest_result(&self, stage: Stage) -> Option<&StageResult> {
        self.stage_results(stage).last()
    }

    pub fn best(&self) -> Option<&PartialResult> {
        self.best.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn escalated_fields(&self) -> &[String] {
        &self.escalated_fields
    }

    pub fn last_accuracy(&self) -> Option<f64> {
        self.last_accuracy
    }

    /// Consume one iteration of the budget, `false` when none remain
    pub fn try_consume_iteration(&mut self) -> bool {
        if self.iteration >= self.max_iterations {
            return false;
        }
        self.iteration += 1;
        true
    }

    pub fn iterations_remaining(&self) -> u32 {
        self.max_iterations.saturating_sub(self.iteration)
    }

    pub fn start_feedback_cycle(&mut self) {
        self.feedback_cycles += 1;
    }

    /// Append a stage result to its stage's chain
    pub fn record_stage_result(&mut self, result: StageResult) {
        self.stage_results.entry(result.stage).or_default().push(result);
    }

    /// Accept a stage's reconciled value into the assembled result
    pub fn accept_output(&mut self, stage: Stage, value: Value) {
        self.outputs.set(stage, value);
    }

    /// Keep the assembled result if it beats the best seen so far
    pub fn note_partial(&mut self, accuracy: f64) {
        if self.outputs.is_empty() {
            return;
        }
        if self.beats_best(accuracy) {
            self.best = Some(PartialResult {
                value: self.outputs.assemble(),
                accuracy,
            });
        }
    }

    /// Like [`note_partial`](Self::note_partial), with `value` standing in
    /// for `stage`'s output
    ///
    /// Used for stage results that fell short of acceptance; the accepted
    /// outputs are left untouched.
    pub fn note_candidate(&mut self, stage: Stage, value: Value, accuracy: f64) {
        if !stage.is_extraction() || !self.beats_best(accuracy) {
            return;
        }
        let mut outputs = self.outputs.clone();
        outputs.set(stage, value);
        self.best = Some(PartialResult {
            value: outputs.assemble(),
            accuracy,
        });
    }

    fn beats_best(&self, accuracy: f64) -> bool {
        self.best.as_ref().is_none_or(|best| accuracy > best.accuracy)
    }

    pub fn set_failure(&mut self, reason: FailureReason) {
        self.failure = Some(reason);
    }

    pub fn set_escalated_fields(&mut self, fields: Vec<String>) {
        self.escalated_fields = fields;
    }

    /// Move to `to`, recording the decision in the audit log
    pub fn transition(
        &mut self,
        to: RunState,
        decision: Decision,
        reasoning: impl Into<String>,
        stage_result: Option<StageResult>,
        accuracy: Option<f64>,
    ) -> Result<&AuditEntry, IllegalTransition> {
        let from = self.state;
        if !is_legal_transition(from, to) {
            return Err(IllegalTransition { from, to });
        }

        let cumulative_cost = self.ledger.spent().usd;
        let previous_cost = self
            .audit_log
            .last()
            .map(|entry| entry.cumulative_cost)
            .unwrap_or(0.0);
        let accuracy_delta = match (accuracy, self.last_accuracy) {
            (Some(now), Some(before)) => Some(now - before),
            (Some(now), None) => Some(now),
            _ => None,
        };
        if accuracy.is_some() {
            self.last_accuracy = accuracy;
        }

        let entry = AuditEntry {
            run_id: self.id.clone(),
            sequence: self.audit_log.len() as u32 + 1,
            stage: stage_result
                .as_ref()
                .map(|r| r.stage)
                .or_else(|| from.stage())
                .or_else(|| to.stage()),
            iteration: self.iteration,
            from,
            to,
            decision,
            reasoning: reasoning.into(),
            models_used: stage_result
                .as_ref()
                .map(StageResult::models_used)
                .unwrap_or_default(),
            stage_result,
            cost_delta: (cumulative_cost - previous_cost).max(0.0),
            cumulative_cost,
            accuracy,
            accuracy_delta,
            timestamp: super::current_timestamp(),
        };

        self.state = to;
        self.audit_log.push(entry);
        Ok(&self.audit_log[self.audit_log.len() - 1])
    }
}
