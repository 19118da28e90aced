//! Google Gemini generateContent adapter

use super::error::ProviderError;
use super::image::{inline_data, media_type_for_url};
use super::{
    HttpProviderSettings, ProviderAdapter, ProviderKind, ProviderResponse, http_client, send_json,
    token_count, trim_base_url,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use shelfscan_application::ports::model_backend::ModelRequest;
use shelfscan_domain::ImageInput;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    client: reqwest::Client,
    settings: HttpProviderSettings,
}

impl GeminiProvider {
    pub fn new(settings: HttpProviderSettings) -> Result<Self, ProviderError> {
        let client = http_client(&settings)?;
        Ok(Self { client, settings })
    }

    pub(crate) fn request_body(&self, request: &ModelRequest) -> Value {
        let image_part = match inline_data(&request.image) {
            Some((mime_type, data)) => json!({
                "inlineData": { "mimeType": mime_type, "data": data }
            }),
            None => match request.image.as_ref() {
                ImageInput::Url(url) => json!({
                    "fileData": { "mimeType": media_type_for_url(url), "fileUri": url }
                }),
                ImageInput::Bytes { .. } => Value::Null,
            },
        };

        json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{
                "role": "user",
                "parts": [image_part, { "text": request.prompt }]
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": self.settings.max_output_tokens,
                "responseMimeType": "application/json"
            }
        })
    }

    pub(crate) fn parse_response(body: &Value) -> Result<ProviderResponse, ProviderError> {
        let parts = body
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                let reason = body
                    .pointer("/promptFeedback/blockReason")
                    .and_then(Value::as_str)
                    .unwrap_or("missing candidates");
                ProviderError::InvalidResponse(reason.to_string())
            })?;

        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();

        let usage = body.get("usageMetadata").cloned().unwrap_or(Value::Null);
        Ok(ProviderResponse {
            text,
            input_tokens: token_count(&usage, "promptTokenCount"),
            output_tokens: token_count(&usage, "candidatesTokenCount"),
        })
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn max_output_tokens(&self) -> u32 {
        self.settings.max_output_tokens
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            trim_base_url(&self.settings.base_url),
            request.model
        );
        debug!("Gemini request: model={}", request.model);

        let http = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.settings.api_key);
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

    fn provider() -> GeminiProvider {
        GeminiProvider::new(HttpProviderSettings {
            api_key: "test".into(),
            base_url: DEFAULT_BASE_URL.into(),
            max_output_tokens: 4096,
            request_timeout: Duration::from_secs(30),
        })
        .unwrap()
    }

    #[test]
    fn test_request_body() {
        let request = ModelRequest {
            model: ModelId::new("gemini-2.5-flash"),
            system: "system".into(),
            prompt: "List the products.".into(),
            image: Arc::new(ImageInput::url("https://x/shelf.webp")),
            schema: None,
            temperature: 0.0,
        };
        let body = provider().request_body(&request);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        let file = &body["contents"][0]["parts"][0]["fileData"];
        assert_eq!(file["mimeType"], "image/webp");
        assert_eq!(body["contents"][0]["parts"][1]["text"], "List the products.");
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"price\": 2.99}" }] } }],
            "usageMetadata": { "promptTokenCount": 700, "candidatesTokenCount": 9 }
        });
        let response = GeminiProvider::parse_response(&body).unwrap();
        assert_eq!(response.text, "{\"price\": 2.99}");
        assert_eq!(response.output_tokens, 9);
    }

    #[test]
    fn test_parse_blocked_response() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        match GeminiProvider::parse_response(&body) {
            Err(ProviderError::InvalidResponse(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
