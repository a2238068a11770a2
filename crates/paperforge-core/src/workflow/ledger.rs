//! Usage ledger: token/cost accumulation onto the task record.
//!
//! Pure accumulation. Only the attempt that ultimately returned usable
//! content reaches the ledger -- the executor bills a node's usage exactly
//! once, on success -- so failed or timed-out retries contribute nothing
//! unless the provider itself reported them as billed usage on the winning
//! response.

use std::sync::Arc;

use paperforge_types::llm::Usage;
use paperforge_types::research::ResearchState;

use crate::llm::PricingLookup;

/// The token/cost increment applied by one node invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageDelta {
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Accumulates usage totals onto `ResearchState` via a price lookup.
pub struct UsageLedger<P: PricingLookup> {
    pricing: Arc<P>,
}

impl<P: PricingLookup> UsageLedger<P> {
    pub fn new(pricing: Arc<P>) -> Self {
        Self { pricing }
    }

    /// Bill one node result against the task record.
    ///
    /// Returns the increment for audit logging. Totals on the record are
    /// monotonic; a `None` usage (provider reported nothing) is a zero
    /// increment.
    pub fn bill(
        &self,
        state: &mut ResearchState,
        model: &str,
        usage: Option<&Usage>,
    ) -> UsageDelta {
        let Some(usage) = usage else {
            return UsageDelta::default();
        };

        let pricing = self.pricing.price_of(model);
        let delta = UsageDelta {
            tokens: usage.total(),
            cost_usd: pricing.cost_of(usage),
        };
        state.add_usage(delta.tokens, delta.cost_usd);

        tracing::debug!(
            task_id = %state.task_id,
            model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_usd = delta.cost_usd,
            "billed node usage"
        );

        delta
    }
}

impl<P: PricingLookup> Clone for UsageLedger<P> {
    fn clone(&self) -> Self {
        Self {
            pricing: Arc::clone(&self.pricing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::pricing::ZeroPricing;
    use paperforge_types::llm::ModelPricing;
    use uuid::Uuid;

    struct FixedPricing;

    impl PricingLookup for FixedPricing {
        fn price_of(&self, model: &str) -> ModelPricing {
            if model == "known-model" {
                ModelPricing {
                    input_price_per_million: 3.0,
                    output_price_per_million: 15.0,
                }
            } else {
                ModelPricing::ZERO
            }
        }
    }

    #[test]
    fn test_bill_accumulates_tokens_and_cost() {
        let ledger = UsageLedger::new(Arc::new(FixedPricing));
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };

        let delta = ledger.bill(&mut state, "known-model", Some(&usage));
        assert_eq!(delta.tokens, 1_100_000);
        assert!((delta.cost_usd - 4.5).abs() < 1e-9);
        assert_eq!(state.tokens_used, 1_100_000);
        assert!((state.cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_counts_tokens_but_bills_zero() {
        let ledger = UsageLedger::new(Arc::new(FixedPricing));
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        let usage = Usage {
            input_tokens: 500,
            output_tokens: 200,
        };

        let delta = ledger.bill(&mut state, "mystery-model", Some(&usage));
        assert_eq!(delta.tokens, 700);
        assert_eq!(delta.cost_usd, 0.0);
        assert_eq!(state.tokens_used, 700);
        assert_eq!(state.cost, 0.0);
    }

    #[test]
    fn test_missing_usage_is_zero_increment() {
        let ledger = UsageLedger::new(Arc::new(ZeroPricing));
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        let delta = ledger.bill(&mut state, "any", None);
        assert_eq!(delta, UsageDelta::default());
        assert_eq!(state.tokens_used, 0);
    }

    #[test]
    fn test_totals_monotonic_across_bills() {
        let ledger = UsageLedger::new(Arc::new(FixedPricing));
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        let mut last_tokens = 0;
        let mut last_cost = 0.0;
        for i in 0..10u32 {
            let usage = Usage {
                input_tokens: i * 100,
                output_tokens: i * 10,
            };
            ledger.bill(&mut state, "known-model", Some(&usage));
            assert!(state.tokens_used >= last_tokens);
            assert!(state.cost >= last_cost);
            last_tokens = state.tokens_used;
            last_cost = state.cost;
        }
    }
}
