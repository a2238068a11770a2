//! PricingLookup trait definition.

use paperforge_types::llm::ModelPricing;

/// Per-model price lookup.
///
/// Implementations must return [`ModelPricing::ZERO`] for unknown models:
/// usage from such models is still counted in token totals but contributes
/// nothing to cost.
pub trait PricingLookup: Send + Sync {
    fn price_of(&self, model: &str) -> ModelPricing;
}

/// Pricing that bills nothing, for tests and free-tier runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroPricing;

impl PricingLookup for ZeroPricing {
    fn price_of(&self, _model: &str) -> ModelPricing {
        ModelPricing::ZERO
    }
}
