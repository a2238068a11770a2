//! Generative-text request/response types.
//!
//! These model the data shapes exchanged with the external text-generation
//! service: single-prompt generation requests, responses with optional usage
//! accounting, per-model pricing, and the error taxonomy the resilience
//! layer classifies against.

use serde::{Deserialize, Serialize};

/// A single-prompt generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Token usage reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }
}

/// Response from the text-generation service.
///
/// `usage` is optional: some providers omit accounting data, in which case
/// the call contributes nothing to the task's billed totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Per-model pricing in USD per million tokens.
///
/// Unknown models price at zero -- usage is still counted, but unbilled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}

impl ModelPricing {
    pub const ZERO: ModelPricing = ModelPricing {
        input_price_per_million: 0.0,
        output_price_per_million: 0.0,
    };

    /// Cost in USD for the given usage at this pricing.
    pub fn cost_of(&self, usage: &Usage) -> f64 {
        (usage.input_tokens as f64 / 1_000_000.0) * self.input_price_per_million
            + (usage.output_tokens as f64 / 1_000_000.0) * self.output_price_per_million
    }
}

/// Errors from the text-generation service.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The call exceeded its deadline. Retryable.
    #[error("generation request timed out")]
    Timeout,

    /// Credentials rejected. Never retried.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Malformed request. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider asked us to back off. Retryable.
    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Provider capacity issue. Retryable.
    #[error("provider overloaded: {0}")]
    Overloaded(String),

    /// Generic provider-side failure. Retryable.
    #[error("provider error: {message}")]
    Provider { message: String },

    /// The provider returned a payload we could not interpret. Node-level
    /// business logic absorbs this with heuristic fallbacks; it should not
    /// reach the engine.
    #[error("unparsable provider output: {0}")]
    Parse(String),
}

impl LlmError {
    /// Whether the resilience layer may retry this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout
                | LlmError::RateLimited { .. }
                | LlmError::Overloaded(..)
                | LlmError::Provider { .. }
                | LlmError::Parse(..)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_of_known_pricing() {
        let pricing = ModelPricing {
            input_price_per_million: 3.0,
            output_price_per_million: 15.0,
        };
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };
        assert!((pricing.cost_of(&usage) - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_pricing_bills_nothing() {
        let usage = Usage {
            input_tokens: 5_000,
            output_tokens: 2_000,
        };
        assert_eq!(ModelPricing::ZERO.cost_of(&usage), 0.0);
        assert_eq!(usage.total(), 7_000);
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::RateLimited { retry_after_ms: Some(100) }.is_transient());
        assert!(LlmError::Overloaded("busy".to_string()).is_transient());
        assert!(!LlmError::AuthenticationFailed.is_transient());
        assert!(!LlmError::InvalidRequest("bad".to_string()).is_transient());
    }
}
