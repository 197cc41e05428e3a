//! Exponential backoff with jitter for transient LLM failures.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::LlmError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default: 3)
    pub max_attempts: u32,
    /// Delay before the first retry (default: 500ms)
    pub base_delay: Duration,
    /// Growth factor per retry (default: 2.0)
    pub multiplier: f64,
    /// Upper bound for any single delay (default: 8s)
    pub max_delay: Duration,
    /// Randomise each delay within [delay/2, delay]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    fn delay(&self, retry: u32) -> Duration {
        let full = self.backoff(retry);
        if !self.jitter {
            return full;
        }
        let full_ms = full.as_millis() as u64;
        if full_ms < 2 {
            return full;
        }
        Duration::from_millis(rand::thread_rng().gen_range(full_ms / 2..=full_ms))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be at least 1".to_string());
        }
        if !(self.multiplier >= 1.0) {
            return Err("retry multiplier must be >= 1.0".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err("retry max_delay must not be below base_delay".to_string());
        }
        Ok(())
    }
}

/// Runs `call` until it succeeds, fails terminally, or `max_attempts` is used up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "LLM call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient LLM failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    error!(operation, attempts = attempt, error = %err, "LLM retries exhausted");
                } else {
                    error!(operation, error = %err, "LLM call failed");
                }
                return Err(err);
            }
        }
    }
}
