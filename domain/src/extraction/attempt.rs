//! Extraction attempts

use super::cost::CostInfo;
use super::stage::Stage;
use crate::core::error::{ErrorKind, ModelCallError};
use crate::core::model::ModelId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One model call within one iteration of one stage (immutable once recorded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub stage: Stage,
    pub model: ModelId,
    /// Configured model this attempt stood in for after a quota or timeout failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitute_for: Option<ModelId>,
    pub prompt: String,
    /// Fingerprint of the [`StageSchema`](crate::schema::StageSchema) the call was constrained by
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    /// Validated result, `None` on failure
    pub parsed: Option<Value>,
    pub error: Option<ModelCallError>,
    pub cost: CostInfo,
    pub duration_ms: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl ExtractionAttempt {
    pub fn succeeded(
        stage: Stage,
        model: ModelId,
        prompt: impl Into<String>,
        parsed: Value,
        raw_output: impl Into<String>,
        cost: CostInfo,
    ) -> Self {
        Self {
            stage,
            model,
            substitute_for: None,
            prompt: prompt.into(),
            schema_fingerprint: None,
            raw_output: Some(raw_output.into()),
            parsed: Some(parsed),
            error: None,
            cost,
            duration_ms: 0,
            timestamp: super::current_timestamp(),
        }
    }

    pub fn failed(
        stage: Stage,
        model: ModelId,
        prompt: impl Into<String>,
        error: ModelCallError,
        cost: CostInfo,
    ) -> Self {
        let raw_output = error.raw_output().map(str::to_string);
        Self {
            stage,
            model,
            substitute_for: None,
            prompt: prompt.into(),
            schema_fingerprint: None,
            raw_output,
            parsed: None,
            error: Some(error),
            cost,
            duration_ms: 0,
            timestamp: super::current_timestamp(),
        }
    }

    pub fn with_schema_fingerprint(mut self, fingerprint: Option<&str>) -> Self {
        self.schema_fingerprint = fingerprint.map(str::to_string);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn as_substitute_for(mut self, original: ModelId) -> Self {
        self.substitute_for = Some(original);
        self
    }

    pub fn is_success(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ModelCallError::kind)
    }

    /// Parsed result as a JSON object, when the call succeeded with one
    pub fn parsed_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.parsed.as_ref().and_then(Value::as_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_attempt_keeps_raw_output() {
        let attempt = ExtractionAttempt::failed(
            Stage::Structure,
            ModelId::new("gpt-4o"),
            "prompt",
            ModelCallError::malformed("not json", vec!["no object".into()]),
            CostInfo::new(100, 20, 0.001),
        );
        assert!(!attempt.is_success());
        assert_eq!(attempt.raw_output.as_deref(), Some("not json"));
        assert_eq!(attempt.error_kind(), Some(ErrorKind::MalformedOutput));
        assert!(attempt.timestamp > 0);
    }

    #[test]
    fn test_substitute_marker() {
        let attempt = ExtractionAttempt::succeeded(
            Stage::Structure,
            ModelId::new("gemini-2.0-flash"),
            "prompt",
            json!({"total_shelves": 4}),
            r#"{"total_shelves": 4}"#,
            CostInfo::zero(),
        )
        .as_substitute_for(ModelId::new("gpt-4o"))
        .with_duration_ms(1200);

        assert!(attempt.is_success());
        assert_eq!(attempt.substitute_for, Some(ModelId::new("gpt-4o")));
        assert_eq!(attempt.parsed_object().unwrap()["total_shelves"], 4);
    }
}
