//! TextGenerator trait definition.
//!
//! This is the single abstraction through which every pipeline node reaches
//! the external generative-text service. Concrete implementations live in
//! paperforge-infra (e.g., `OpenRouterClient`); tests use scripted mocks.
//!
//! Uses native async fn in traits (RPITIT, Rust 2024 edition).

use paperforge_types::llm::{GenerateRequest, GenerateResponse, LlmError};

/// Trait for text-generation backends.
///
/// One call maps to one provider request; the resilience layer wraps calls
/// in deadlines and retries at the node-executor level, so implementations
/// should not retry internally.
pub trait TextGenerator: Send + Sync {
    /// Dependency identity for circuit breaking (e.g., "openrouter").
    ///
    /// Breakers are keyed by this name, so every client of the same upstream
    /// service should return the same value.
    fn name(&self) -> &str;

    /// Send a generation request and receive the full response.
    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl std::future::Future<Output = Result<GenerateResponse, LlmError>> + Send;
}
