//! Run limits from TOML (`[run]` section)

use serde::{Deserialize, Serialize};
use shelfscan_application::ExecutionParams;
use std::time::Duration;

/// Raw run configuration
///
/// # Example
///
/// ```toml
/// [run]
/// target_accuracy = 0.9
/// max_iterations = 6
/// cost_budget = 0.50
/// call_timeout_secs = 60
/// run_timeout_secs = 600   # 0 disables the run-level timeout
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRunConfig {
    /// Aggregate accuracy required to complete a run
    pub target_accuracy: f64,
    /// Iteration budget across passes, retries and feedback cycles
    pub max_iterations: u32,
    /// Cost budget in USD
    pub cost_budget: f64,
    pub temperature: f64,
    /// Replaces the built-in system prompt
    pub system_prompt: Option<String>,
    pub call_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub max_feedback_cycles: u32,
    /// Confidence assumed for responses that report none
    pub default_confidence: f64,
    /// Confidence added per additional agreeing model
    pub agreement_bonus: f64,
}

impl Default for FileRunConfig {
    fn default() -> Self {
        let params = ExecutionParams::default();
        Self {
            target_accuracy: 0.9,
            max_iterations: 6,
            cost_budget: 1.0,
            temperature: 0.0,
            system_prompt: None,
            call_timeout_secs: params.call_timeout.as_secs(),
            run_timeout_secs: params.run_timeout.map_or(0, |t| t.as_secs()),
            max_feedback_cycles: params.max_feedback_cycles,
            default_confidence: params.default_confidence,
            agreement_bonus: params.agreement_bonus,
        }
    }
}

impl FileRunConfig {
    pub fn execution_params(&self) -> ExecutionParams {
        ExecutionParams {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            run_timeout: (self.run_timeout_secs > 0)
                .then(|| Duration::from_secs(self.run_timeout_secs)),
            max_feedback_cycles: self.max_feedback_cycles,
            default_confidence: self.default_confidence,
            agreement_bonus: self.agreement_bonus,
        }
    }
}
