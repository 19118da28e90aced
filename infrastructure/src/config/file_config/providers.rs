//! Provider configuration from TOML (`[providers]` section)

use crate::providers::anthropic::{self, AnthropicProvider};
use crate::providers::error::ProviderError;
use crate::providers::gemini::{self, GeminiProvider};
use crate::providers::openai::{self, OpenAiProvider};
use crate::providers::pricing::{ModelPrice, PricingTable};
use crate::providers::routing::{RoutingBackend, RoutingTable};
use crate::providers::{HttpProviderSettings, ProviderAdapter, ProviderKind};
use serde::{Deserialize, Serialize};
use shelfscan_domain::{ConfigIssue, ConfigIssueCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings of one HTTP provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProviderConfig {
    /// Environment variable holding the API key (provider default when unset)
    pub api_key_env: Option<String>,
    /// Direct API key (prefer the environment variable)
    pub api_key: Option<String>,
    /// Overrides the public endpoint, e.g. for an OpenAI-compatible gateway
    pub base_url: Option<String>,
    pub max_output_tokens: u32,
}

impl Default for FileProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_output_tokens: 4096,
        }
    }
}

/// Raw provider configuration
///
/// # Example
///
/// ```toml
/// [providers]
/// default = "openai"
///
/// [providers.anthropic]
/// api_key_env = "MY_ANTHROPIC_KEY"
///
/// [providers.routing]
/// "llava-next" = "openai"
///
/// [providers.pricing."gpt-4o"]
/// input_per_million = 2.5
/// output_per_million = 10.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProvidersConfig {
    /// Provider for models no route or family matches: "openai", "anthropic", "gemini"
    pub default: Option<String>,
    pub openai: FileProviderConfig,
    pub anthropic: FileProviderConfig,
    pub gemini: FileProviderConfig,
    /// Explicit model → provider routing overrides
    pub routing: HashMap<String, String>,
    /// Per-model prices layered over the built-in table
    pub pricing: HashMap<String, ModelPrice>,
    /// Transport timeout for provider HTTP requests
    pub request_timeout_secs: u64,
}

impl Default for FileProvidersConfig {
    fn default() -> Self {
        Self {
            default: None,
            openai: FileProviderConfig::default(),
            anthropic: FileProviderConfig::default(),
            gemini: FileProviderConfig::default(),
            routing: HashMap::new(),
            pricing: HashMap::new(),
            request_timeout_secs: 300,
        }
    }
}

fn default_key_env(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "OPENAI_API_KEY",
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        ProviderKind::Gemini => "GEMINI_API_KEY",
    }
}

fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => openai::DEFAULT_BASE_URL,
        ProviderKind::Anthropic => anthropic::DEFAULT_BASE_URL,
        ProviderKind::Gemini => gemini::DEFAULT_BASE_URL,
    }
}

impl FileProvidersConfig {
    const KINDS: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
    ];

    pub fn provider(&self, kind: ProviderKind) -> &FileProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or_default()
    }

    /// Routing rules; unknown provider names are skipped (reported by `validate`)
    pub fn routing_table(&self) -> RoutingTable {
        let routes = self
            .routing
            .iter()
            .filter_map(|(model, provider)| {
                provider
                    .parse::<ProviderKind>()
                    .ok()
                    .map(|kind| (model.clone(), kind))
            })
            .collect();
        RoutingTable {
            routes,
            default: self.default_kind(),
        }
    }

    pub fn pricing_table(&self) -> PricingTable {
        self.pricing
            .iter()
            .fold(PricingTable::with_defaults(), |table, (model, price)| {
                table.with_price(model.clone(), *price)
            })
    }

    /// Settings for `kind`, resolving the API key through `env`
    pub fn settings_with(
        &self,
        kind: ProviderKind,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<HttpProviderSettings, ProviderError> {
        let config = self.provider(kind);
        let key_env = config
            .api_key_env
            .clone()
            .unwrap_or_else(|| default_key_env(kind).to_string());
        let api_key = config
            .api_key
            .clone()
            .or_else(|| env(key_env.as_str()))
            .filter(|key| !key.trim().is_empty())
            .ok_or(ProviderError::MissingApiKey {
                provider: kind.as_str(),
                env: key_env,
            })?;

        Ok(HttpProviderSettings {
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(kind).to_string()),
            max_output_tokens: config.max_output_tokens,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }

    /// Build a routing backend over every provider with an API key
    pub fn build_backend(&self) -> Result<RoutingBackend, ProviderError> {
        self.build_backend_with(|name| std::env::var(name).ok())
    }

    pub fn build_backend_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<RoutingBackend, ProviderError> {
        let mut providers: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
        let mut first_missing = None;

        for kind in Self::KINDS {
            let settings = match self.settings_with(kind, &env) {
                Ok(settings) => settings,
                Err(e) => {
                    debug!("Skipping provider {}: {}", kind, e);
                    first_missing.get_or_insert(e);
                    continue;
                }
            };
            let adapter: Arc<dyn ProviderAdapter> = match kind {
                ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(settings)?),
                ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(settings)?),
                ProviderKind::Gemini => Arc::new(GeminiProvider::new(settings)?),
            };
            providers.push(adapter);
        }

        if providers.is_empty() {
            return Err(first_missing
                .unwrap_or_else(|| ProviderError::NoProvider("any model".to_string())));
        }

        let backend = RoutingBackend::new(providers, self.routing_table())
            .with_pricing(self.pricing_table());
        info!("Providers configured: {:?}", backend.provider_kinds());
        Ok(backend)
    }

    pub(super) fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if let Some(default) = &self.default
            && default.parse::<ProviderKind>().is_err()
        {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::UnknownProvider {
                    model: "*".to_string(),
                    provider: default.clone(),
                },
                format!("providers.default: unknown provider '{}'", default),
            ));
        }

        let mut routes: Vec<_> = self.routing.iter().collect();
        routes.sort();
        for (model, provider) in routes {
            if provider.parse::<ProviderKind>().is_err() {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::UnknownProvider {
                        model: model.clone(),
                        provider: provider.clone(),
                    },
                    format!(
                        "providers.routing: model '{}' routed to unknown provider '{}'",
                        model, provider
                    ),
                ));
            }
        }

        for kind in Self::KINDS {
            if self.provider(kind).max_output_tokens == 0 {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::OutOfRange {
                        field: format!("providers.{}.max_output_tokens", kind),
                        value: "0".to_string(),
                    },
                    format!("providers.{}.max_output_tokens must be positive", kind),
                ));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfscan_domain::ModelId;

    fn env_with(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_settings_resolve_env_key_and_defaults() {
        let config = FileProvidersConfig::default();
        let settings = config
            .settings_with(ProviderKind::Anthropic, env_with(&[("ANTHROPIC_API_KEY", "sk-ant")]))
            .unwrap();
        assert_eq!(settings.api_key, "sk-ant");
        assert_eq!(settings.base_url, anthropic::DEFAULT_BASE_URL);
        assert_eq!(settings.max_output_tokens, 4096);
    }

    #[test]
    fn test_custom_key_env_and_missing_key() {
        let mut config = FileProvidersConfig::default();
        config.openai.api_key_env = Some("GATEWAY_KEY".into());

        let err = config
            .settings_with(ProviderKind::OpenAi, env_with(&[("OPENAI_API_KEY", "ignored")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingApiKey { env, .. } if env == "GATEWAY_KEY"
        ));
    }

    #[test]
    fn test_build_backend_skips_providers_without_keys() {
        let config = FileProvidersConfig::default();
        let backend = config
            .build_backend_with(env_with(&[("GEMINI_API_KEY", "g-key")]))
            .unwrap();
        assert_eq!(backend.provider_kinds(), vec![ProviderKind::Gemini]);

        assert!(matches!(
            config.build_backend_with(env_with(&[])),
            Err(ProviderError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_routing_and_pricing_tables() {
        let toml_str = r#"
default = "anthropic"

[routing]
"llava-next" = "openai"
"mystery" = "bedrock"

[pricing."llava-next"]
input_per_million = 0.5
output_per_million = 1.5
"#;
        let config: FileProvidersConfig = toml::from_str(toml_str).unwrap();
        let routing = config.routing_table();
        assert_eq!(routing.default, ProviderKind::Anthropic);
        assert_eq!(routing.routes.get("llava-next"), Some(&ProviderKind::OpenAi));
        assert!(!routing.routes.contains_key("mystery"));

        let pricing = config.pricing_table();
        assert_eq!(
            pricing.price(&ModelId::new("llava-next")),
            Some(ModelPrice::new(0.5, 1.5))
        );
        assert!(pricing.price(&ModelId::new("gpt-4o")).is_some());

        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            &issues[0].code,
            ConfigIssueCode::UnknownProvider { provider, .. } if provider == "bedrock"
        ));
    }
}
