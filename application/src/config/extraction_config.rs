//! Per-run extraction configuration.
//!
//! Built once at process start (from file config or by the embedding
//! caller), validated, and passed by reference to the use cases. Immutable
//! for the lifetime of a run.

use crate::config::ExecutionParams;
use shelfscan_domain::{
    ConfigIssue, ConfigIssueCode, ConsensusPolicy, EscalationPolicy, FieldSpec, ModelId, Stage,
};
use std::collections::BTreeMap;

/// Fields and models of one pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    /// Models called concurrently for this stage
    pub models: Vec<ModelId>,
    /// Static substitution order used on quota or timeout failures
    pub fallback_models: Vec<ModelId>,
    /// Consensus priority; empty means tie-break by consistency checks
    pub priority: Vec<ModelId>,
    /// Minimum stage confidence to advance
    pub min_confidence: f64,
    /// Stage compares results instead of extracting; may declare no fields
    pub comparison_only: bool,
    pub fields: Vec<FieldSpec>,
    /// Replaces the built-in stage task text
    pub instructions: Option<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            fallback_models: Vec::new(),
            priority: Vec::new(),
            min_confidence: 0.6,
            comparison_only: false,
            fields: Vec::new(),
            instructions: None,
        }
    }
}

impl StageConfig {
    pub fn new(models: Vec<ModelId>, fields: Vec<FieldSpec>) -> Self {
        Self {
            models,
            fields,
            ..Default::default()
        }
    }

    /// A comparison-only stage without fields (visual validation)
    pub fn comparison(models: Vec<ModelId>) -> Self {
        Self {
            models,
            comparison_only: true,
            ..Default::default()
        }
    }

    pub fn with_fallbacks(mut self, fallback_models: Vec<ModelId>) -> Self {
        self.fallback_models = fallback_models;
        self
    }

    pub fn with_priority(mut self, priority: Vec<ModelId>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Consensus policy for this stage
    pub fn consensus_policy(&self, execution: &ExecutionParams) -> ConsensusPolicy {
        ConsensusPolicy {
            priority: self.priority.clone(),
            default_confidence: execution.default_confidence,
            agreement_bonus: execution.agreement_bonus,
        }
    }
}

/// Configuration of one extraction run
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// System prompt; the built-in one when `None`
    pub system: Option<String>,
    /// Aggregate accuracy required to complete
    pub target_accuracy: f64,
    /// Iteration budget (pipeline passes, stage retries and feedback cycles)
    pub max_iterations: u32,
    /// Cost budget in USD
    pub cost_budget: f64,
    pub temperature: f64,
    pub stages: BTreeMap<Stage, StageConfig>,
    pub execution: ExecutionParams,
    pub escalation: EscalationPolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            system: None,
            target_accuracy: 0.9,
            max_iterations: 6,
            cost_budget: 1.0,
            temperature: 0.0,
            stages: BTreeMap::new(),
            execution: ExecutionParams::default(),
            escalation: EscalationPolicy::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn with_stage(mut self, stage: Stage, config: StageConfig) -> Self {
        self.stages.insert(stage, config);
        self
    }

    pub fn with_target_accuracy(mut self, target: f64) -> Self {
        self.target_accuracy = target;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_cost_budget(mut self, budget: f64) -> Self {
        self.cost_budget = budget;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionParams) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_escalation(mut self, escalation: EscalationPolicy) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageConfig> {
        self.stages.get(&stage)
    }

    /// Whether `stage` takes part in the pipeline
    ///
    /// Extraction stages always run; visual validation only runs when it
    /// has models configured.
    pub fn is_stage_active(&self, stage: Stage) -> bool {
        match stage {
            Stage::VisualValidation => self
                .stage(stage)
                .is_some_and(|config| !config.models.is_empty()),
            _ => true,
        }
    }

    /// Validate the configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if !(self.target_accuracy > 0.0 && self.target_accuracy <= 1.0) {
            issues.push(out_of_range("target_accuracy", self.target_accuracy));
        }
        if self.max_iterations == 0 {
            issues.push(out_of_range("max_iterations", self.max_iterations));
        }
        if self.cost_budget <= 0.0 {
            issues.push(out_of_range("cost_budget", self.cost_budget));
        }

        for stage in Stage::EXTRACTION {
            let models_missing = self.stage(stage).is_none_or(|config| config.models.is_empty());
            if models_missing {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::MissingStageModels {
                        stage: stage.to_string(),
                    },
                    format!("stages.{}.models must list at least one model", stage),
                ));
            }
        }

        for (stage, config) in &self.stages {
            if !(0.0..=1.0).contains(&config.min_confidence) {
                issues.push(out_of_range(
                    &format!("stages.{}.min_confidence", stage),
                    config.min_confidence,
                ));
            }
            for (index, model) in config
                .models
                .iter()
                .chain(&config.fallback_models)
                .chain(&config.priority)
                .enumerate()
            {
                if model.is_empty() {
                    issues.push(ConfigIssue::error(
                        ConfigIssueCode::EmptyModelName {
                            field: format!("stages.{}", stage),
                        },
                        format!("stages.{}: model entry {} is empty", stage, index + 1),
                    ));
                }
            }
        }

        issues
    }
}

fn out_of_range(field: &str, value: impl ToString) -> ConfigIssue {
    let value = value.to_string();
    ConfigIssue::error(
        ConfigIssueCode::OutOfRange {
            field: field.to_string(),
            value: value.clone(),
        },
        format!("{}: value {} is out of range", field, value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> ModelId {
        ModelId::new(name)
    }

    fn complete() -> ExtractionConfig {
        ExtractionConfig::default()
            .with_stage(
                Stage::Structure,
                StageConfig::new(vec![model("gpt-4o")], vec![FieldSpec::integer("total_shelves")]),
            )
            .with_stage(
                Stage::Products,
                StageConfig::new(vec![model("gpt-4o")], vec![FieldSpec::string("brand")]),
            )
            .with_stage(
                Stage::Details,
                StageConfig::new(vec![model("gpt-4o")], vec![FieldSpec::float("price")]),
            )
    }

    #[test]
    fn test_complete_config_is_valid() {
        let config = complete();
        assert!(config.validate().is_empty());
        assert!(!config.is_stage_active(Stage::VisualValidation));
        assert!(config.is_stage_active(Stage::Products));
    }

    #[test]
    fn test_missing_stage_models() {
        let config = ExtractionConfig::default();
        let issues = config.validate();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(ConfigIssue::is_error));
    }

    #[test]
    fn test_out_of_range_values() {
        let config = complete()
            .with_target_accuracy(1.5)
            .with_max_iterations(0)
            .with_cost_budget(0.0);
        let issues = config.validate();
        assert_eq!(issues.len(), 3);
        assert!(matches!(
            &issues[0].code,
            ConfigIssueCode::OutOfRange { field, .. } if field == "target_accuracy"
        ));
    }

    #[test]
    fn test_visual_stage_active_with_models() {
        let config = complete().with_stage(
            Stage::VisualValidation,
            StageConfig::comparison(vec![model("claude-sonnet-4")]),
        );
        assert!(config.is_stage_active(Stage::VisualValidation));
    }

    #[test]
    fn test_consensus_policy_from_stage() {
        let execution = ExecutionParams::default().with_default_confidence(0.5);
        let policy = StageConfig::default()
            .with_priority(vec![model("a")])
            .consensus_policy(&execution);
        assert_eq!(policy.default_confidence, 0.5);
        assert_eq!(policy.priority, vec![model("a")]);
    }
}
