//! Generative-text infrastructure: the OpenRouter client and pricing table.

pub mod openrouter;
pub mod pricing;

pub use openrouter::OpenRouterClient;
pub use pricing::StaticPricingTable;
