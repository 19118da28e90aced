//! Stage definitions from TOML (`[stages.<name>]` sections)

use serde::{Deserialize, Serialize};
use shelfscan_application::StageConfig;
use shelfscan_domain::{ConfigIssue, ConfigIssueCode, FieldSpec, ModelId, SchemaBuilder, Stage};

/// Raw configuration of one stage
///
/// # Example
///
/// ```toml
/// [stages.products]
/// models = ["gpt-4o", "claude-sonnet-4-20250514"]
/// fallback_models = ["gemini-2.5-flash"]
/// priority = ["claude-sonnet-4-20250514"]
/// min_confidence = 0.7
///
/// [[stages.products.fields]]
/// name = "brand"
/// type = "string"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStageConfig {
    pub models: Vec<String>,
    pub fallback_models: Vec<String>,
    pub priority: Vec<String>,
    pub min_confidence: f64,
    /// Defaults to true for visual validation, false otherwise
    pub comparison_only: Option<bool>,
    pub instructions: Option<String>,
    pub fields: Vec<FieldSpec>,
}

impl Default for FileStageConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            fallback_models: Vec::new(),
            priority: Vec::new(),
            min_confidence: StageConfig::default().min_confidence,
            comparison_only: None,
            instructions: None,
            fields: Vec::new(),
        }
    }
}

fn parse_models(models: &[String]) -> Vec<ModelId> {
    models.iter().map(|m| ModelId::new(m.trim())).collect()
}

impl FileStageConfig {
    pub fn to_stage_config(&self, stage: Stage) -> StageConfig {
        StageConfig {
            models: parse_models(&self.models),
            fallback_models: parse_models(&self.fallback_models),
            priority: parse_models(&self.priority),
            min_confidence: self.min_confidence,
            comparison_only: self
                .comparison_only
                .unwrap_or(stage == Stage::VisualValidation),
            fields: self.fields.clone(),
            instructions: self.instructions.clone(),
        }
    }

    /// Compile the stage's fields to surface definition errors at load time
    pub(super) fn check_fields(&self, stage: Stage) -> Option<ConfigIssue> {
        let comparison_only = self
            .comparison_only
            .unwrap_or(stage == Stage::VisualValidation);
        SchemaBuilder::new()
            .build(stage.as_str(), &self.fields, comparison_only)
            .err()
            .map(|e| {
                ConfigIssue::error(
                    ConfigIssueCode::InvalidFieldSpec {
                        stage: stage.to_string(),
                    },
                    format!("stages.{}.fields: {}", stage, e),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfscan_domain::FieldType;

    #[test]
    fn test_deserialize_stage_with_fields() {
        let toml_str = r#"
models = ["gpt-4o"]
min_confidence = 0.75

[[fields]]
name = "shelves"
type = "list"
list_item_type = "object"

[[fields.nested_fields]]
name = "position"
type = "integer"
"#;
        let config: FileStageConfig = toml::from_str(toml_str).unwrap();
        let stage = config.to_stage_config(Stage::Structure);
        assert_eq!(stage.models, vec![ModelId::new("gpt-4o")]);
        assert_eq!(stage.min_confidence, 0.75);
        assert!(!stage.comparison_only);
        assert_eq!(stage.fields[0].list_item_type, Some(FieldType::Object));
        assert_eq!(stage.fields[0].nested_fields[0].name, "position");
    }

    #[test]
    fn test_visual_stage_is_comparison_only_by_default() {
        let config = FileStageConfig {
            models: vec!["claude-sonnet-4".into()],
            ..Default::default()
        };
        assert!(config.to_stage_config(Stage::VisualValidation).comparison_only);
        assert!(config.check_fields(Stage::VisualValidation).is_none());
    }

    #[test]
    fn test_check_fields_reports_empty_stage() {
        let config = FileStageConfig::default();
        let issue = config.check_fields(Stage::Products).unwrap();
        assert!(issue.is_error());
        assert!(matches!(
            issue.code,
            ConfigIssueCode::InvalidFieldSpec { ref stage } if stage == "products"
        ));
    }
}
