//! Stage results produced by the consensus resolver

use super::attempt::ExtractionAttempt;
use super::cost::CostInfo;
use super::stage::Stage;
use crate::core::model::ModelId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// No attempt produced a valid result
    Failed,
}

/// How a conflicting field was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Highest-priority model's value won
    Priority,
    /// Value from the attempt passing more cross-field consistency checks
    ConsistencyChecks,
    /// Still tied; flagged for human review
    Unresolved,
    /// Visual validation reports merged into one
    Combined,
}

/// One model's value for a disputed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub model: ModelId,
    pub value: Value,
}

/// Record of models disagreeing on a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDisagreement {
    pub field: String,
    /// Chosen value, `null` when unresolved
    pub chosen: Value,
    pub chosen_model: Option<ModelId>,
    pub candidates: Vec<Candidate>,
    pub resolution: Resolution,
}

impl FieldDisagreement {
    pub fn is_unresolved(&self) -> bool {
        self.resolution == Resolution::Unresolved
    }
}

/// Consensus output for one stage within one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub status: StageStatus,
    /// Reconciled value (`null` when failed)
    pub value: Value,
    /// Fraction of successful models agreeing with the chosen value, per field
    pub field_agreement: BTreeMap<String, f64>,
    pub disagreements: Vec<FieldDisagreement>,
    pub attempts: Vec<ExtractionAttempt>,
    /// Overall confidence in `[0, 1]`
    pub confidence: f64,
    /// Model slots skipped because the cost budget was reached
    #[serde(default)]
    pub budget_refused: usize,
}

impl StageResult {
    /// A result with no successful attempt
    pub fn failed(stage: Stage, attempts: Vec<ExtractionAttempt>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            value: Value::Null,
            field_agreement: BTreeMap::new(),
            disagreements: Vec::new(),
            attempts,
            confidence: 0.0,
            budget_refused: 0,
        }
    }

    pub fn with_budget_refused(mut self, refused: usize) -> Self {
        self.budget_refused = refused;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }

    pub fn successful_attempts(&self) -> impl Iterator<Item = &ExtractionAttempt> {
        self.attempts.iter().filter(|a| a.is_success())
    }

    pub fn failed_attempts(&self) -> impl Iterator<Item = &ExtractionAttempt> {
        self.attempts.iter().filter(|a| !a.is_success())
    }

    pub fn unresolved_fields(&self) -> Vec<&str> {
        self.disagreements
            .iter()
            .filter(|d| d.is_unresolved())
            .map(|d| d.field.as_str())
            .collect()
    }

    pub fn has_unresolved(&self) -> bool {
        self.disagreements.iter().any(FieldDisagreement::is_unresolved)
    }

    /// Fields whose agreement is below `threshold`
    pub fn low_confidence_fields(&self, threshold: f64) -> Vec<String> {
        self.field_agreement
            .iter()
            .filter(|(_, score)| **score < threshold)
            .map(|(field, _)| field.clone())
            .collect()
    }

    /// Models that were actually called, in call order
    pub fn models_used(&self) -> Vec<ModelId> {
        let mut models: Vec<ModelId> = Vec::new();
        for attempt in &self.attempts {
            if !models.contains(&attempt.model) {
                models.push(attempt.model.clone());
            }
        }
        models
    }

    pub fn total_cost(&self) -> CostInfo {
        self.attempts.iter().map(|a| a.cost).sum()
    }
}
