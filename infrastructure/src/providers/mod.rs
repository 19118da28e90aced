//! Vision model provider adapters
//!
//! Each adapter turns a [`ModelRequest`] (system prompt, user prompt, image)
//! into one provider-specific HTTP call and returns the response text with
//! token usage. Schema validation, pricing and error classification happen
//! once, in [`RoutingBackend`](routing::RoutingBackend).

pub mod anthropic;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod pricing;
pub mod routing;

mod image;

use async_trait::async_trait;
use error::ProviderError;
use serde_json::Value;
use shelfscan_application::ports::model_backend::ModelRequest;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Connection settings shared by the HTTP adapters
#[derive(Debug, Clone, PartialEq)]
pub struct HttpProviderSettings {
    pub api_key: String,
    pub base_url: String,
    pub max_output_tokens: u32,
    /// Transport-level timeout; the stage executor enforces its own per-call limit
    pub request_timeout: Duration,
}

/// Text and token usage of one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Output token cap sent with every request
    fn max_output_tokens(&self) -> u32;

    async fn complete(&self, request: &ModelRequest) -> Result<ProviderResponse, ProviderError>;
}

fn http_client(settings: &HttpProviderSettings) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()
        .map_err(|e| ProviderError::Http(e.to_string()))
}

/// Send a JSON request and decode the JSON response, classifying HTTP errors
async fn send_json(request: reqwest::RequestBuilder, body: &Value) -> Result<Value, ProviderError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::from_status(status.as_u16(), &text));
    }

    serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

fn token_count(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn trim_base_url(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}
