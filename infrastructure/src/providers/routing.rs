//! Model backend that routes each call to a provider adapter

use super::error::ProviderError;
use super::pricing::PricingTable;
use super::{ProviderAdapter, ProviderKind};
use async_trait::async_trait;
use shelfscan_application::ports::model_backend::{
    ModelBackend, ModelCallFailure, ModelReply, ModelRequest,
};
use shelfscan_domain::ModelId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Rough token cost of one image across providers
const IMAGE_TOKEN_ESTIMATE: u64 = 1600;
const CHARS_PER_TOKEN: u64 = 4;

/// Model-to-provider routing rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingTable {
    /// Model name to provider, checked before family inference
    pub routes: HashMap<String, ProviderKind>,
    pub default: ProviderKind,
}

pub struct RoutingBackend {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    routing: RoutingTable,
    pricing: PricingTable,
}

impl RoutingBackend {
    pub fn new(providers: Vec<Arc<dyn ProviderAdapter>>, routing: RoutingTable) -> Self {
        Self {
            providers,
            routing,
            pricing: PricingTable::with_defaults(),
        }
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn provider_kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// Resolve the provider for `model`
    ///
    /// Priority: explicit route, model family, configured default, then the
    /// first registered provider.
    fn resolve_provider(&self, model: &ModelId) -> Result<&dyn ProviderAdapter, ProviderError> {
        let find = |kind: ProviderKind| self.providers.iter().find(|p| p.kind() == kind);

        if let Some(kind) = self.routing.routes.get(model.as_str()) {
            match find(*kind) {
                Some(p) => return Ok(p.as_ref()),
                None => warn!("Route {} -> {} has no configured provider", model, kind),
            }
        }

        let inferred = if model.is_claude() {
            Some(ProviderKind::Anthropic)
        } else if model.is_gpt() {
            Some(ProviderKind::OpenAi)
        } else if model.is_gemini() {
            Some(ProviderKind::Gemini)
        } else {
            None
        };
        if let Some(kind) = inferred
            && let Some(p) = find(kind)
        {
            return Ok(p.as_ref());
        }

        if let Some(p) = find(self.routing.default) {
            return Ok(p.as_ref());
        }

        self.providers
            .first()
            .map(|p| p.as_ref())
            .ok_or_else(|| ProviderError::NoProvider(model.to_string()))
    }
}

fn estimate_input_tokens(request: &ModelRequest) -> u64 {
    let chars = (request.system.len() + request.prompt.len()) as u64;
    chars / CHARS_PER_TOKEN + IMAGE_TOKEN_ESTIMATE
}

#[async_trait]
impl ModelBackend for RoutingBackend {
    async fn call(&self, request: &ModelRequest) -> Result<ModelReply, ModelCallFailure> {
        let started = Instant::now();
        let provider = self
            .resolve_provider(&request.model)
            .map_err(|e| ModelCallFailure::free(e.into_call_error(started.elapsed())))?;

        debug!("Routing {} to {}", request.model, provider.kind());
        let response = provider
            .complete(request)
            .await
            .map_err(|e| ModelCallFailure::free(e.into_call_error(started.elapsed())))?;

        let cost = self
            .pricing
            .cost(&request.model, response.input_tokens, response.output_tokens);
        ModelReply::from_raw_output(response.text, request.schema.as_deref(), cost)
    }

    fn worst_case_cost(&self, request: &ModelRequest) -> f64 {
        let Ok(provider) = self.resolve_provider(&request.model) else {
            return 0.0;
        };
        self.pricing.worst_case(
            &request.model,
            estimate_input_tokens(request),
            u64::from(provider.max_output_tokens()),
        )
    }
}
