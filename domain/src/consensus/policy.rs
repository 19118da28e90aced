//! Consensus and escalation policies

use crate::core::model::ModelId;
use crate::extraction::result::StageResult;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_AGREEMENT_BONUS: f64 = 0.05;

/// How multiple models' outputs for one stage are reconciled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusPolicy {
    /// Models in descending priority; empty means no priority ordering
    #[serde(default)]
    pub priority: Vec<ModelId>,
    /// Confidence assumed for an attempt that reports none
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
    /// Confidence added per additional agreeing model
    #[serde(default = "default_agreement_bonus")]
    pub agreement_bonus: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_agreement_bonus() -> f64 {
    DEFAULT_AGREEMENT_BONUS
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            priority: Vec::new(),
            default_confidence: DEFAULT_CONFIDENCE,
            agreement_bonus: DEFAULT_AGREEMENT_BONUS,
        }
    }
}

impl ConsensusPolicy {
    pub fn with_priority(mut self, priority: Vec<ModelId>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn has_priority(&self) -> bool {
        !self.priority.is_empty()
    }

    /// Position of `model` in the priority order; unlisted models rank last
    pub fn rank(&self, model: &ModelId) -> usize {
        self.priority
            .iter()
            .position(|m| m == model)
            .unwrap_or(self.priority.len())
    }
}

/// When an unresolved disagreement ends the run as `escalated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default = "default_true")]
    pub escalate_on_unresolved: bool,
    /// Restrict escalation to these fields; empty means every field
    #[serde(default)]
    pub review_fields: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            escalate_on_unresolved: true,
            review_fields: Vec::new(),
        }
    }
}

impl EscalationPolicy {
    pub fn never() -> Self {
        Self {
            escalate_on_unresolved: false,
            review_fields: Vec::new(),
        }
    }

    /// Unresolved fields in `result` that require human review
    pub fn fields_requiring_review(&self, result: &StageResult) -> Vec<String> {
        if !self.escalate_on_unresolved {
            return Vec::new();
        }
        result
            .unresolved_fields()
            .into_iter()
            .filter(|field| {
                self.review_fields.is_empty() || self.review_fields.iter().any(|f| f == field)
            })
            .map(str::to_string)
            .collect()
    }
}
