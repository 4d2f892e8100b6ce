//! Token pricing per model, USD per million tokens.

use super::types::Usage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const fn price(input_per_million: f64, output_per_million: f64) -> ModelPrice {
    ModelPrice {
        input_per_million,
        output_per_million,
    }
}

const MODEL_PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o", price(5.00, 15.00)),
    ("gpt-4o-2024-05-13", price(5.00, 15.00)),
    ("gpt-4o-mini", price(0.15, 0.60)),
    ("gpt-4-turbo", price(10.00, 30.00)),
    ("gpt-3.5-turbo", price(0.50, 1.50)),
    ("gemini-1.5-flash", price(0.075, 0.30)),
    ("gemini-1.5-pro", price(3.50, 10.50)),
    ("gemini-1.0-pro", price(0.50, 1.50)),
];

/// Exact match first, then the longest known prefix, so that
/// `gpt-4o-mini-2024-07-18` prices as `gpt-4o-mini` and not `gpt-4o`.
pub fn price_for(model: &str) -> Option<ModelPrice> {
    let model = model.trim().to_lowercase();
    if let Some((_, p)) = MODEL_PRICES.iter().find(|(name, _)| *name == model) {
        return Some(*p);
    }
    MODEL_PRICES
        .iter()
        .filter(|(name, _)| model.starts_with(name))
        .max_by_key(|(name, _)| name.len())
        .map(|(_, p)| *p)
}

/// Estimated cost of `usage` on `model`. Unknown models cost nothing.
pub fn calculate_cost(model: &str, usage: Usage) -> f64 {
    let Some(price) = price_for(model) else {
        tracing::debug!("No price known for model {}", model);
        return 0.0;
    };
    usage.input_tokens as f64 / 1_000_000.0 * price.input_per_million
        + usage.output_tokens as f64 / 1_000_000.0 * price.output_per_million
}
