//! Per-model token pricing
//!
//! Prices are USD per million tokens. Lookups match the exact model name
//! first, then the longest configured prefix, so `gpt-4o-2024-08-06`
//! resolves to the `gpt-4o` entry.

use serde::{Deserialize, Serialize};
use shelfscan_domain::{CostInfo, ModelId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

const DEFAULT_PRICES: [(&str, ModelPrice); 10] = [
    ("gpt-4o", ModelPrice::new(2.5, 10.0)),
    ("gpt-4o-mini", ModelPrice::new(0.15, 0.6)),
    ("gpt-4.1", ModelPrice::new(2.0, 8.0)),
    ("gpt-4.1-mini", ModelPrice::new(0.4, 1.6)),
    ("claude-sonnet-4", ModelPrice::new(3.0, 15.0)),
    ("claude-opus-4", ModelPrice::new(15.0, 75.0)),
    ("claude-3-5-haiku", ModelPrice::new(0.8, 4.0)),
    ("gemini-2.5-pro", ModelPrice::new(1.25, 10.0)),
    ("gemini-2.5-flash", ModelPrice::new(0.3, 2.5)),
    ("gemini-2.0-flash", ModelPrice::new(0.1, 0.4)),
];

/// Token prices keyed by model name or name prefix
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    prices: HashMap<String, ModelPrice>,
    /// Used for models with no matching entry
    fallback: Option<ModelPrice>,
}

impl PricingTable {
    /// An empty table; unknown models cost nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Published list prices of common vision models
    pub fn with_defaults() -> Self {
        DEFAULT_PRICES
            .iter()
            .fold(Self::new(), |table, (name, price)| table.with_price(*name, *price))
    }

    pub fn with_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(model.into(), price);
        self
    }

    pub fn with_fallback(mut self, price: ModelPrice) -> Self {
        self.fallback = Some(price);
        self
    }

    pub fn price(&self, model: &ModelId) -> Option<ModelPrice> {
        let name = model.as_str();
        if let Some(price) = self.prices.get(name) {
            return Some(*price);
        }
        self.prices
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, price)| *price)
            .or(self.fallback)
    }

    pub fn cost(&self, model: &ModelId, input_tokens: u64, output_tokens: u64) -> CostInfo {
        let usd = self
            .price(model)
            .map_or(0.0, |price| price.usd(input_tokens, output_tokens));
        CostInfo::new(input_tokens, output_tokens, usd)
    }

    /// Upper bound for a call with the given token estimates
    pub fn worst_case(&self, model: &ModelId, input_tokens: u64, max_output_tokens: u64) -> f64 {
        self.cost(model, input_tokens, max_output_tokens).usd
    }
}
