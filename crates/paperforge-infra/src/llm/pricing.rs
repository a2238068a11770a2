//! Static pricing table for OpenRouter models.
//!
//! Hardcoded defaults for the models the pipeline actually uses, with
//! per-model overrides from `config.toml`. Unknown models price at zero:
//! their usage is counted in token totals but bills nothing.

use std::collections::HashMap;

use paperforge_core::llm::PricingLookup;
use paperforge_types::llm::ModelPricing;

use crate::config::PricingConfig;

struct PricingEntry {
    model: &'static str,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
}

/// Prices in USD per million tokens, as of mid 2026. Free-tier models are
/// listed explicitly rather than relying on the unknown-model default.
const DEFAULT_TABLE: &[PricingEntry] = &[
    PricingEntry {
        model: "deepseek/deepseek-r1-0528:free",
        input_cost_per_million: 0.0,
        output_cost_per_million: 0.0,
    },
    PricingEntry {
        model: "qwen/qwen-2.5-7b-instruct:free",
        input_cost_per_million: 0.0,
        output_cost_per_million: 0.0,
    },
    PricingEntry {
        model: "deepseek/deepseek-r1-distill-qwen-7b:free",
        input_cost_per_million: 0.0,
        output_cost_per_million: 0.0,
    },
    PricingEntry {
        model: "meta-llama/llama-3.3-70b-instruct:free",
        input_cost_per_million: 0.0,
        output_cost_per_million: 0.0,
    },
    PricingEntry {
        model: "google/gemma-3-27b:free",
        input_cost_per_million: 0.0,
        output_cost_per_million: 0.0,
    },
    PricingEntry {
        model: "qwen/qwen-2.5-coder-7b-instruct:free",
        input_cost_per_million: 0.0,
        output_cost_per_million: 0.0,
    },
    PricingEntry {
        model: "moonshotai/kimi-k2.5",
        input_cost_per_million: 0.40,
        output_cost_per_million: 1.75,
    },
    PricingEntry {
        model: "deepseek/deepseek-v3.2",
        input_cost_per_million: 0.25,
        output_cost_per_million: 0.38,
    },
];

/// Price lookup backed by the static table plus config overrides.
pub struct StaticPricingTable {
    prices: HashMap<String, ModelPricing>,
}

impl StaticPricingTable {
    pub fn new(config: &PricingConfig) -> Self {
        let mut prices: HashMap<String, ModelPricing> = DEFAULT_TABLE
            .iter()
            .map(|entry| {
                (
                    entry.model.to_string(),
                    ModelPricing {
                        input_price_per_million: entry.input_cost_per_million,
                        output_price_per_million: entry.output_cost_per_million,
                    },
                )
            })
            .collect();
        for (model, price) in &config.overrides {
            prices.insert(
                model.clone(),
                ModelPricing {
                    input_price_per_million: price.input,
                    output_price_per_million: price.output,
                },
            );
        }
        Self { prices }
    }
}

impl Default for StaticPricingTable {
    fn default() -> Self {
        Self::new(&PricingConfig::default())
    }
}

impl PricingLookup for StaticPricingTable {
    fn price_of(&self, model: &str) -> ModelPricing {
        self.prices.get(model).copied().unwrap_or(ModelPricing::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceOverride;
    use paperforge_types::llm::Usage;

    #[test]
    fn test_known_paid_model_is_priced() {
        let table = StaticPricingTable::default();
        let pricing = table.price_of("moonshotai/kimi-k2.5");
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
        };
        assert!((pricing.cost_of(&usage) - 2.15).abs() < 1e-9);
    }

    #[test]
    fn test_free_models_bill_zero() {
        let table = StaticPricingTable::default();
        assert_eq!(
            table.price_of("deepseek/deepseek-r1-0528:free"),
            ModelPricing::ZERO
        );
    }

    #[test]
    fn test_unknown_model_prices_at_zero() {
        let table = StaticPricingTable::default();
        assert_eq!(table.price_of("vendor/some-new-model"), ModelPricing::ZERO);
    }

    #[test]
    fn test_config_override_wins() {
        let mut config = PricingConfig::default();
        config.overrides.insert(
            "moonshotai/kimi-k2.5".to_string(),
            PriceOverride {
                input: 1.0,
                output: 2.0,
            },
        );
        let table = StaticPricingTable::new(&config);
        let pricing = table.price_of("moonshotai/kimi-k2.5");
        assert!((pricing.input_price_per_million - 1.0).abs() < f64::EPSILON);
        assert!((pricing.output_price_per_million - 2.0).abs() < f64::EPSILON);
    }
}
