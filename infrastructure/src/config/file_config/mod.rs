//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and converted into the application's
//! [`ExtractionConfig`] once, at startup.

mod output;
mod providers;
mod run;
mod stages;

pub use output::FileOutputConfig;
pub use providers::{FileProviderConfig, FileProvidersConfig};
pub use run::FileRunConfig;
pub use stages::FileStageConfig;

use serde::{Deserialize, Serialize};
use shelfscan_application::ExtractionConfig;
use shelfscan_domain::{ConfigIssue, ConfigIssueCode, EscalationPolicy, Stage};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration:\n{}", format_issues(.0))]
    Invalid(Vec<ConfigIssue>),
}

fn format_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Accuracy target, budgets and timeouts
    pub run: FileRunConfig,
    /// When field disagreements end the run for human review
    pub escalation: EscalationPolicy,
    /// Per-stage models and fields, keyed by stage name
    pub stages: BTreeMap<String, FileStageConfig>,
    pub output: FileOutputConfig,
    /// Provider credentials, routing and pricing
    pub providers: FileProvidersConfig,
}

impl FileConfig {
    /// Stage sections whose names parse as pipeline stages
    fn known_stages(&self) -> impl Iterator<Item = (Stage, &FileStageConfig)> {
        self.stages
            .iter()
            .filter_map(|(name, config)| name.parse::<Stage>().ok().map(|stage| (stage, config)))
    }

    /// Convert to a run configuration without validating it
    pub fn extraction_config(&self) -> ExtractionConfig {
        let stages = self
            .known_stages()
            .map(|(stage, config)| (stage, config.to_stage_config(stage)))
            .collect();

        ExtractionConfig {
            system: self.run.system_prompt.clone(),
            target_accuracy: self.run.target_accuracy,
            max_iterations: self.run.max_iterations,
            cost_budget: self.run.cost_budget,
            temperature: self.run.temperature,
            stages,
            execution: self.run.execution_params(),
            escalation: self.escalation.clone(),
        }
    }

    /// Validate and convert to a run configuration
    pub fn to_extraction_config(&self) -> Result<ExtractionConfig, ConfigError> {
        let errors: Vec<_> = self
            .validate()
            .into_iter()
            .filter(ConfigIssue::is_error)
            .collect();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        Ok(self.extraction_config())
    }

    /// Validate the entire configuration, returning all detected issues.
    ///
    /// Checks, in order:
    /// 1. Stage section names
    /// 2. Run limits and stage models (via [`ExtractionConfig::validate`])
    /// 3. Field specifications of every active stage
    /// 4. Provider routing and limits
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for name in self.stages.keys() {
            if name.parse::<Stage>().is_err() {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownStage { name: name.clone() },
                    format!("[stages.{}] is not a pipeline stage and is ignored", name),
                ));
            }
        }

        let extraction = self.extraction_config();
        issues.extend(extraction.validate());

        for (stage, config) in self.known_stages() {
            if extraction.is_stage_active(stage)
                && let Some(issue) = config.check_fields(stage)
            {
                issues.push(issue);
            }
        }

        issues.extend(self.providers.validate());
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfscan_domain::OutputFormat;

    const FULL: &str = r#"
[run]
target_accuracy = 0.85
max_iterations = 4
cost_budget = 0.25

[escalation]
review_fields = ["price"]

[stages.structure]
models = ["gpt-4o", "claude-sonnet-4-20250514"]

[[stages.structure.fields]]
name = "total_shelves"
type = "integer"

[stages.products]
models = ["gpt-4o"]
fallback_models = ["gemini-2.5-flash"]

[[stages.products.fields]]
name = "brand"
type = "string"

[stages.details]
models = ["gpt-4o"]

[[stages.details.fields]]
name = "price"
type = "float"
required = false

[stages.visual_validation]
models = ["claude-sonnet-4-20250514"]

[output]
format = "json"
"#;

    #[test]
    fn test_deserialize_full_config() {
        let config: FileConfig = toml::from_str(FULL).unwrap();
        assert!(config.validate().is_empty());
        assert_eq!(config.output.format, Some(OutputFormat::Json));

        let extraction = config.to_extraction_config().unwrap();
        assert_eq!(extraction.target_accuracy, 0.85);
        assert_eq!(extraction.max_iterations, 4);
        assert_eq!(extraction.escalation.review_fields, vec!["price".to_string()]);
        assert!(extraction.is_stage_active(Stage::VisualValidation));
        let products = extraction.stage(Stage::Products).unwrap();
        assert_eq!(products.fallback_models.len(), 1);
        assert!(extraction.stage(Stage::VisualValidation).unwrap().comparison_only);
    }

    #[test]
    fn test_default_config_reports_missing_stages() {
        let config = FileConfig::default();
        let issues = config.validate();
        assert_eq!(
            issues
                .iter()
                .filter(|i| matches!(i.code, ConfigIssueCode::MissingStageModels { .. }))
                .count(),
            3
        );
        assert!(matches!(
            config.to_extraction_config(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_stage_is_warning() {
        let mut config: FileConfig = toml::from_str(FULL).unwrap();
        config
            .stages
            .insert("pricing".to_string(), FileStageConfig::default());

        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_error());
        assert!(config.to_extraction_config().is_ok());
    }

    #[test]
    fn test_invalid_field_spec_is_error() {
        let toml_str = FULL.replace(
            "name = \"brand\"\ntype = \"string\"",
            "name = \"placement\"\ntype = \"enum\"",
        );
        let config: FileConfig = toml::from_str(&toml_str).unwrap();
        let issues = config.validate();
        assert!(issues.iter().any(|i| matches!(
            &i.code,
            ConfigIssueCode::InvalidFieldSpec { stage } if stage == "products"
        )));
    }
}
