//! Execution parameters — use case loop control.
//!
//! [`ExecutionParams`] groups the static parameters that control the
//! extraction loop in [`RunExtractionUseCase`](crate::use_cases::run_extraction::RunExtractionUseCase)
//! and the per-call behavior of [`StageExecutor`](crate::use_cases::execute_stage::StageExecutor).
//! These are application-layer concerns, not domain policy.

use std::time::Duration;

/// Execution loop control parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionParams {
    /// Timeout for a single model call; expiry counts as a model failure.
    pub call_timeout: Duration,
    /// Wall-clock limit for the whole run; expiry fails the run.
    pub run_timeout: Option<Duration>,
    /// Maximum "re-run products/details with visual feedback" cycles.
    pub max_feedback_cycles: u32,
    /// Confidence assumed for attempts that report none.
    pub default_confidence: f64,
    /// Confidence added per additional agreeing model.
    pub agreement_bonus: f64,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            run_timeout: Some(Duration::from_secs(900)),
            max_feedback_cycles: 2,
            default_confidence: 0.7,
            agreement_bonus: 0.05,
        }
    }
}

impl ExecutionParams {
    // ==================== Builder Methods ====================

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_max_feedback_cycles(mut self, max: u32) -> Self {
        self.max_feedback_cycles = max;
        self
    }

    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let params = ExecutionParams::default();
        assert_eq!(params.call_timeout, Duration::from_secs(120));
        assert_eq!(params.max_feedback_cycles, 2);
        assert!(params.run_timeout.is_some());
    }

    #[test]
    fn test_builder() {
        let params = ExecutionParams::default()
            .with_call_timeout(Duration::from_secs(5))
            .with_run_timeout(None)
            .with_max_feedback_cycles(0);

        assert_eq!(params.call_timeout, Duration::from_secs(5));
        assert!(params.run_timeout.is_none());
        assert_eq!(params.max_feedback_cycles, 0);
    }
}
