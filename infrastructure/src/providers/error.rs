//! Provider adapter errors

use shelfscan_domain::ModelCallError;
use shelfscan_domain::core::string::truncate;
use std::time::Duration;
use thiserror::Error;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Body markers providers use for exhausted quota on non-429 responses
const QUOTA_MARKERS: [&str; 3] = ["insufficient_quota", "resource_exhausted", "quota exceeded"];

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No API key for {provider}: set ${env} or providers.{provider}.api_key")]
    MissingApiKey { provider: &'static str, env: String },

    #[error("Quota exceeded (HTTP {status}): {message}")]
    QuotaExceeded { status: u16, message: String },

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No provider available for model {0}")]
    NoProvider(String),
}

impl ProviderError {
    /// Classify a non-success HTTP response
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate(body.trim(), MAX_ERROR_BODY_CHARS);
        let lower = body.to_lowercase();
        if status == 429 || QUOTA_MARKERS.iter().any(|marker| lower.contains(marker)) {
            ProviderError::QuotaExceeded { status, message }
        } else {
            ProviderError::Api { status, message }
        }
    }

    /// Convert into the per-attempt error taxonomy
    pub fn into_call_error(self, elapsed: Duration) -> ModelCallError {
        match self {
            ProviderError::QuotaExceeded { message, .. } => ModelCallError::quota(message),
            ProviderError::Timeout => ModelCallError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
            },
            other => ModelCallError::transport(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Http(e.to_string())
        }
    }
}
