//! OpenAI chat completions adapter

use super::error::ProviderError;
use super::image::image_url;
use super::{
    HttpProviderSettings, ProviderAdapter, ProviderKind, ProviderResponse, http_client, send_json,
    token_count, trim_base_url,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use shelfscan_application::ports::model_backend::ModelRequest;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    settings: HttpProviderSettings,
}

impl OpenAiProvider {
    pub fn new(settings: HttpProviderSettings) -> Result<Self, ProviderError> {
        let client = http_client(&settings)?;
        Ok(Self { client, settings })
    }

    pub(crate) fn request_body(&self, request: &ModelRequest) -> Value {
        json!({
            "model": request.model.as_str(),
            "temperature": request.temperature,
            "max_tokens": self.settings.max_output_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": request.system },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.prompt },
                        { "type": "image_url", "image_url": { "url": image_url(&request.image) } }
                    ]
                }
            ]
        })
    }

    pub(crate) fn parse_response(body: &Value) -> Result<ProviderResponse, ProviderError> {
        let text = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0].message.content".into()))?;
        let usage = body.get("usage").cloned().unwrap_or(Value::Null);

        Ok(ProviderResponse {
            text: text.to_string(),
            input_tokens: token_count(&usage, "prompt_tokens"),
            output_tokens: token_count(&usage, "completion_tokens"),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn max_output_tokens(&self) -> u32 {
        self.settings.max_output_tokens
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", trim_base_url(&self.settings.base_url));
        debug!("OpenAI request: model={}", request.model);

        let http = self
            .client
            .post(url)
            .bearer_auth(&self.settings.api_key);
        let body = send_json(http, &self.request_body(request)).await?;
        Self::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfscan_domain::{ImageInput, ModelId};
    use std::sync::Arc;
    use std::time::Duration;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(HttpProviderSettings {
            api_key: "sk-test".into(),
            base_url: DEFAULT_BASE_URL.into(),
            max_output_tokens: 2048,
            request_timeout: Duration::from_secs(30),
        })
        .unwrap()
    }

    fn request() -> ModelRequest {
        ModelRequest {
            model: ModelId::new("gpt-4o"),
            system: "You extract shelf data.".into(),
            prompt: "Count the shelves.".into(),
            image: Arc::new(ImageInput::url("https://example.com/shelf.jpg")),
            schema: None,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_request_body() {
        let body = provider().request_body(&request());
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "https://example.com/shelf.jpg"
        );
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"total_shelves\": 4}" } }],
            "usage": { "prompt_tokens": 1200, "completion_tokens": 40 }
        });
        let response = OpenAiProvider::parse_response(&body).unwrap();
        assert_eq!(response.text, "{\"total_shelves\": 4}");
        assert_eq!(response.input_tokens, 1200);
        assert_eq!(response.output_tokens, 40);

        assert!(matches!(
            OpenAiProvider::parse_response(&json!({ "choices": [] })),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
