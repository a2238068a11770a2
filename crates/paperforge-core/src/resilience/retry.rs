//! Retry policy with exponential backoff and optional jitter.
//!
//! The policy is immutable configuration; delay computation is a pure
//! function of the attempt number so it can be tested without sleeping.

use std::time::Duration;

use rand::Rng as _;
use serde::{Deserialize, Serialize};

/// Immutable retry configuration.
///
/// `max_retries` counts retries, not attempts: a value of 3 allows up to
/// four executions of the wrapped call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter_enabled")]
    pub jitter_enabled: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_secs() -> f64 {
    1.0
}

fn default_max_delay_secs() -> f64 {
    30.0
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_enabled() -> bool {
    true
}

/// Fraction of the base delay used as the jitter band (uniform, symmetric).
const JITTER_FRACTION: f64 = 0.2;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_enabled: default_jitter_enabled(),
        }
    }
}

impl RetryPolicy {
    /// Base backoff delay for the given attempt (0-based), without jitter.
    ///
    /// `min(max_delay, initial_delay * multiplier^attempt)`.
    pub fn base_delay_secs(&self, attempt: u32) -> f64 {
        let delay = self.initial_delay_secs * self.backoff_multiplier.powi(attempt as i32);
        delay.min(self.max_delay_secs)
    }

    /// Delay to sleep before re-running the given attempt, with jitter
    /// applied when enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay_secs(attempt);
        if self.jitter_enabled {
            let jitter: f64 = rand::rng().random_range(-1.0..=1.0);
            delay += delay * JITTER_FRACTION * jitter;
        }
        Duration::from_secs_f64(delay.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_without_jitter() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay_secs: 1.0,
            max_delay_secs: 30.0,
            backoff_multiplier: 2.0,
            jitter_enabled: false,
        }
    }

    #[test]
    fn test_backoff_sequence() {
        let policy = policy_without_jitter();
        assert!((policy.base_delay_secs(0) - 1.0).abs() < 1e-9);
        assert!((policy.base_delay_secs(1) - 2.0).abs() < 1e-9);
        assert!((policy.base_delay_secs(3) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let policy = policy_without_jitter();
        // 2^10 = 1024s, capped to 30s.
        assert!((policy.base_delay_secs(10) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_delay_without_jitter_matches_base() {
        let policy = policy_without_jitter();
        assert_eq!(policy.delay_for(3), Duration::from_secs_f64(8.0));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let policy = RetryPolicy {
            jitter_enabled: true,
            ..policy_without_jitter()
        };
        for _ in 0..100 {
            let delay = policy.delay_for(2).as_secs_f64();
            // Base 4.0s, +/- 20%.
            assert!((3.2..=4.8).contains(&delay), "delay {delay} out of band");
        }
    }

    #[test]
    fn test_defaults_deserialize_from_empty_table() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.max_retries, 3);
        assert!((policy.initial_delay_secs - 1.0).abs() < f64::EPSILON);
        assert!((policy.max_delay_secs - 30.0).abs() < f64::EPSILON);
        assert!(policy.jitter_enabled);
    }
}
