//! Retry policy for model calls.
//!
//! Ordinary failures back off exponentially up to `max_delay_ms`. Rate-limit
//! responses honour the server's requested wait plus a safety margin, or back
//! off up to the larger `rate_limit_max_delay_ms` when no wait was given.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::CallError;

/// Retry policy for failed calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Maximum backoff for rate-limit responses without a requested wait
    #[serde(default = "default_rate_limit_max_delay")]
    pub rate_limit_max_delay_ms: u64,

    /// Added to a server-requested wait
    #[serde(default = "default_margin")]
    pub rate_limit_margin_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    10_000
}
fn default_rate_limit_max_delay() -> u64 {
    60_000
}
fn default_margin() -> u64 {
    1000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            rate_limit_max_delay_ms: default_rate_limit_max_delay(),
            rate_limit_margin_ms: default_margin(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32, cap_ms: u64) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(cap_ms as f64) as u64)
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff(attempt, self.max_delay_ms)
    }

    /// Delay before retrying after `error` on `attempt`
    pub fn delay_for_error(&self, attempt: u32, error: &CallError) -> Duration {
        match error {
            CallError::RateLimited {
                retry_after: Some(wait),
                ..
            } => *wait + Duration::from_millis(self.rate_limit_margin_ms),
            CallError::RateLimited { retry_after: None, .. } => {
                self.backoff(attempt, self.rate_limit_max_delay_ms)
            }
            _ => self.delay_for_attempt(attempt),
        }
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(10000)); // Capped
    }

    #[test]
    fn test_rate_limit_honours_server_wait() {
        let policy = RetryPolicy::default();
        let error = CallError::RateLimited {
            retry_after: Some(Duration::from_millis(350)),
            message: "Please try again in 350ms".to_string(),
        };
        assert_eq!(policy.delay_for_error(1, &error), Duration::from_millis(1350));
    }

    #[test]
    fn test_rate_limit_backoff_uses_larger_cap() {
        let policy = RetryPolicy::default();
        let error = CallError::RateLimited {
            retry_after: None,
            message: "slow down".to_string(),
        };
        assert_eq!(policy.delay_for_error(5, &error), Duration::from_millis(16000));
        assert_eq!(policy.delay_for_error(8, &error), Duration::from_millis(60000));

        let other = CallError::Transport("reset".to_string());
        assert_eq!(policy.delay_for_error(5, &other), Duration::from_millis(10000));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 2").unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.rate_limit_margin_ms, 1000);
    }
}
