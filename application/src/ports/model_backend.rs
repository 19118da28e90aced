//! Model Backend port
//!
//! Defines the uniform call interface over vision-capable model providers.
//! Adapters live in the infrastructure layer and normalize the request
//! shape (image + prompt + schema) and the response (validated result +
//! cost accounting) for their provider.

use async_trait::async_trait;
use serde_json::Value;
use shelfscan_domain::schema::extract_json;
use shelfscan_domain::{CostInfo, ImageInput, ModelCallError, ModelId, StageSchema};
use std::sync::Arc;

/// One call to one model
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: ModelId,
    pub system: String,
    pub prompt: String,
    pub image: Arc<ImageInput>,
    /// Output schema; `None` for comparison-only stages
    pub schema: Option<Arc<StageSchema>>,
    pub temperature: f64,
}

/// A successful, validated model response
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub parsed: Value,
    pub raw_output: String,
    pub cost: CostInfo,
}

/// A failed call, still carrying whatever cost it incurred
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCallFailure {
    pub error: ModelCallError,
    pub cost: CostInfo,
}

impl ModelCallFailure {
    /// A failure that consumed no tokens
    pub fn free(error: ModelCallError) -> Self {
        Self {
            error,
            cost: CostInfo::zero(),
        }
    }
}

impl ModelReply {
    /// Validate raw model text against the request's schema
    ///
    /// Without a schema the text only has to contain a JSON object.
    /// Malformed output keeps its cost: the tokens were consumed.
    pub fn from_raw_output(
        raw_output: String,
        schema: Option<&StageSchema>,
        cost: CostInfo,
    ) -> Result<Self, ModelCallFailure> {
        let parsed = match schema {
            Some(schema) => schema.parse(&raw_output),
            None => extract_json(&raw_output).ok_or_else(|| {
                ModelCallError::malformed(
                    raw_output.clone(),
                    vec!["Response did not contain a JSON object".to_string()],
                )
            }),
        };

        match parsed {
            Ok(parsed) => Ok(Self {
                parsed,
                raw_output,
                cost,
            }),
            Err(error) => Err(ModelCallFailure { error, cost }),
        }
    }
}

/// Gateway to vision models
///
/// Implementations must not retry internally on malformed output; retry
/// and fallback policy belongs to the stage executor.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Issue one call and validate the response
    async fn call(&self, request: &ModelRequest) -> Result<ModelReply, ModelCallFailure>;

    /// Upper bound on what `request` can cost, reserved against the budget
    /// before dispatch
    fn worst_case_cost(&self, _request: &ModelRequest) -> f64 {
        0.0
    }
}
