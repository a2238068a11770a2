//! Reusable resilience primitives.
//!
//! - `retry` -- immutable retry policy with exponential backoff and jitter
//! - `breaker` -- per-dependency circuit breaker and the process-wide registry

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerRegistry, CircuitBreaker};
pub use retry::RetryPolicy;
