//! Anthropic messages API adapter

use super::error::ProviderError;
use super::image::inline_data;
use super::{
    HttpProviderSettings, ProviderAdapter, ProviderKind, ProviderResponse, http_client, send_json,
    token_count, trim_base_url,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use shelfscan_application::ports::model_backend::ModelRequest;
use shelfscan_domain::ImageInput;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    settings: HttpProviderSettings,
}

impl AnthropicProvider {
    pub fn new(settings: HttpProviderSettings) -> Result<Self, ProviderError> {
        let client = http_client(&settings)?;
        Ok(Self { client, settings })
    }

    pub(crate) fn request_body(&self, request: &ModelRequest) -> Value {
        let source = match inline_data(&request.image) {
            Some((media_type, data)) => json!({
                "type": "base64",
                "media_type": media_type,
                "data": data,
            }),
            None => match request.image.as_ref() {
                ImageInput::Url(url) => json!({ "type": "url", "url": url }),
                ImageInput::Bytes { .. } => Value::Null,
            },
        };

        json!({
            "model": request.model.as_str(),
            "max_tokens": self.settings.max_output_tokens,
            "temperature": request.temperature,
            "system": request.system,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image", "source": source },
                    { "type": "text", "text": request.prompt }
                ]
            }]
        })
    }

    /// Concatenate the text blocks of a messages response
    pub(crate) fn parse_response(body: &Value) -> Result<ProviderResponse, ProviderError> {
        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::InvalidResponse("missing content blocks".into()))?;

        let text: String = blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse("no text content".into()));
        }

        let usage = body.get("usage").cloned().unwrap_or(Value::Null);
        Ok(ProviderResponse {
            text,
            input_tokens: token_count(&usage, "input_tokens"),
            output_tokens: token_count(&usage, "output_tokens"),
        })
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn max_output_tokens(&self) -> u32 {
        self.settings.max_output_tokens
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/v1/messages", trim_base_url(&self.settings.base_url));
        debug!("Anthropic request: model={}", request.model);

        let http = self
            .client
            .post(url)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", API_VERSION);
        let body = send_json(http, &self.request_body(request)).await?;
        Self::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfscan_domain::ModelId;
    use std::sync::Arc;
    use std::time::Duration;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(HttpProviderSettings {
            api_key: "test".into(),
            base_url: DEFAULT_BASE_URL.into(),
            max_output_tokens: 1024,
            request_timeout: Duration::from_secs(30),
        })
        .unwrap()
    }

    fn request(image: ImageInput) -> ModelRequest {
        ModelRequest {
            model: ModelId::new("claude-sonnet-4-20250514"),
            system: "system".into(),
            prompt: "Describe the shelves.".into(),
            image: Arc::new(image),
            schema: None,
            temperature: 0.2,
        }
    }

    #[test]
    fn test_request_body_inline_image() {
        let body = provider().request_body(&request(ImageInput::Bytes {
            data: b"abc".to_vec(),
            media_type: "image/jpeg".into(),
        }));
        assert_eq!(body["system"], "system");
        assert_eq!(body["max_tokens"], 1024);
        let source = &body["messages"][0]["content"][0]["source"];
        assert_eq!(source["type"], "base64");
        assert_eq!(source["media_type"], "image/jpeg");
        assert_eq!(source["data"], "YWJj");
    }

    #[test]
    fn test_request_body_url_image() {
        let body = provider().request_body(&request(ImageInput::url("https://x/shelf.png")));
        let source = &body["messages"][0]["content"][0]["source"];
        assert_eq!(source["type"], "url");
        assert_eq!(source["url"], "https://x/shelf.png");
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "content": [
                { "type": "text", "text": "{\"brand\": " },
                { "type": "text", "text": "\"Acme\"}" }
            ],
            "usage": { "input_tokens": 900, "output_tokens": 12 }
        });
        let response = AnthropicProvider::parse_response(&body).unwrap();
        assert_eq!(response.text, "{\"brand\": \"Acme\"}");
        assert_eq!(response.input_tokens, 900);

        assert!(AnthropicProvider::parse_response(&json!({ "content": [] })).is_err());
    }
}
