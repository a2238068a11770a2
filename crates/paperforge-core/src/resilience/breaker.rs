//! Circuit breaker for external dependencies.
//!
//! One breaker exists per external-dependency identity and lives for the
//! process lifetime, shared by every concurrently running task. State lives
//! behind a mutex so concurrent tasks never lose failure counts.
//!
//! Two states:
//! - **Closed**: requests allowed; consecutive failures count toward the
//!   threshold and any success resets the count.
//! - **Open**: requests rejected fast. The transition back to closed is lazy:
//!   the first allow-check after `reset_timeout` has elapsed since the last
//!   failure resets the breaker and lets that request through as a half-open
//!   probe.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
    is_open: bool,
}

/// Circuit breaker guarding one external dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Default consecutive-failure threshold before the circuit opens.
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    /// Default open-state duration before a probe is allowed.
    pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            reset_timeout,
            state: Mutex::new(BreakerState {
                failure_count: 0,
                last_failure_time: None,
                is_open: false,
            }),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(
            name,
            Self::DEFAULT_FAILURE_THRESHOLD,
            Self::DEFAULT_RESET_TIMEOUT,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a failed call; opens the circuit at the threshold.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        if !state.is_open && state.failure_count >= self.failure_threshold {
            state.is_open = true;
            tracing::warn!(
                breaker = self.name.as_str(),
                failures = state.failure_count,
                reset_secs = self.reset_timeout.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    /// Record a successful call; any success fully resets the breaker.
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        if state.is_open {
            tracing::info!(breaker = self.name.as_str(), "circuit breaker closed");
        }
        state.failure_count = 0;
        state.is_open = false;
    }

    /// Whether a request should be allowed through right now.
    ///
    /// While open, returns false until `reset_timeout` has elapsed since the
    /// last failure; then resets the breaker and returns true, letting the
    /// caller's request act as the half-open probe.
    pub fn should_allow(&self) -> bool {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        if !state.is_open {
            return true;
        }

        if let Some(last) = state.last_failure_time
            && last.elapsed() > self.reset_timeout
        {
            tracing::info!(breaker = self.name.as_str(), "circuit breaker resetting");
            state.is_open = false;
            state.failure_count = 0;
            return true;
        }

        false
    }

    /// Whether the circuit is currently open (diagnostics only; racy by
    /// nature, use `should_allow` for gating).
    pub fn is_open(&self) -> bool {
        self.state.lock().expect("breaker mutex poisoned").is_open
    }

    pub fn failure_count(&self) -> u32 {
        self.state
            .lock()
            .expect("breaker mutex poisoned")
            .failure_count
    }
}

/// Process-wide registry of circuit breakers keyed by dependency identity.
///
/// Concurrent tasks calling the same dependency share one breaker instance.
#[derive(Debug)]
pub struct BreakerRegistry {
    failure_threshold: u32,
    reset_timeout: Duration,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            breakers: DashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            CircuitBreaker::DEFAULT_FAILURE_THRESHOLD,
            CircuitBreaker::DEFAULT_RESET_TIMEOUT,
        )
    }

    /// Get (or lazily create) the breaker for a dependency.
    pub fn breaker_for(&self, dependency: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    dependency,
                    self.failure_threshold,
                    self.reset_timeout,
                ))
            })
            .clone()
    }
}
