//! Retry context carried into subsequent attempts of a stage

use super::result::StageResult;
use crate::core::string::truncate;
use serde::{Deserialize, Serialize};

const MAX_RAW_OUTPUT_CHARS: usize = 400;

/// What went wrong last time, injected into the next prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryContext {
    /// 1-based attempt number of the upcoming stage run
    pub attempt: u32,
    pub failure_summary: Vec<String>,
    pub low_confidence_fields: Vec<String>,
    pub visual_feedback: Vec<String>,
}

impl RetryContext {
    pub fn new(attempt: u32) -> Self {
        Self {
            attempt,
            ..Default::default()
        }
    }

    /// Build the context for re-running the stage that produced `result`
    pub fn from_stage_result(result: &StageResult, min_confidence: f64, attempt: u32) -> Self {
        let mut failure_summary: Vec<String> = result
            .failed_attempts()
            .filter_map(|a| a.error.as_ref().map(|e| (a, e)))
            .map(|(attempt, error)| {
                let mut line = format!("{} failed: {}", attempt.model, error);
                if let Some(raw) = error.raw_output() {
                    line.push_str(&format!(
                        " (output was: {})",
                        truncate(raw.trim(), MAX_RAW_OUTPUT_CHARS)
                    ));
                }
                line
            })
            .collect();

        for disagreement in result.disagreements.iter().filter(|d| d.is_unresolved()) {
            let values = disagreement
                .candidates
                .iter()
                .map(|c| format!("{} said {}", c.model, c.value))
                .collect::<Vec<_>>()
                .join(", ");
            failure_summary.push(format!(
                "Models disagreed on '{}' ({}); look again carefully",
                disagreement.field, values
            ));
        }

        if !result.is_failed() && result.confidence < min_confidence {
            failure_summary.push(format!(
                "Previous confidence {:.2} was below the required {:.2}",
                result.confidence, min_confidence
            ));
        }

        Self {
            attempt,
            failure_summary,
            low_confidence_fields: result.low_confidence_fields(min_confidence),
            visual_feedback: Vec::new(),
        }
    }

    pub fn with_visual_feedback(mut self, feedback: Vec<String>) -> Self {
        self.visual_feedback = feedback;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.failure_summary.is_empty()
            && self.low_confidence_fields.is_empty()
            && self.visual_feedback.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ModelCallError;
    use crate::core::model::ModelId;
    use crate::extraction::attempt::ExtractionAttempt;
    use crate::extraction::cost::CostInfo;
    use crate::extraction::stage::Stage;

    #[test]
    fn test_failure_summary_includes_raw_output() {
        let result = StageResult::failed(
            Stage::Structure,
            vec![ExtractionAttempt::failed(
                Stage::Structure,
                ModelId::new("gpt-4o"),
                "p",
                ModelCallError::malformed("{\"shelves\": 3}", vec!["missing total_shelves".into()]),
                CostInfo::zero(),
            )],
        );

        let context = RetryContext::from_stage_result(&result, 0.7, 2);
        assert_eq!(context.attempt, 2);
        assert_eq!(context.failure_summary.len(), 1);
        assert!(context.failure_summary[0].contains("missing total_shelves"));
        assert!(context.failure_summary[0].contains("{\"shelves\": 3}"));
        assert!(!context.is_empty());
    }

    #[test]
    fn test_empty_context() {
        assert!(RetryContext::new(1).is_empty());
        assert!(!RetryContext::new(1)
            .with_visual_feedback(vec!["price mismatch".into()])
            .is_empty());
    }
}
