// Built-in retry policy driven by RetryConfig

use crate::executor::CommandError;
use crate::executor::config::RetryConfig;
use crate::executor::retry::RetryHandler;
use rand::Rng;
use std::time::Duration;

/// Retries failures whose combined output matches one of the configured patterns
///
/// With no patterns every failure except a launch failure is retried. A missing
/// binary does not fix itself between attempts, so launch failures never are.
#[derive(Debug, Clone)]
pub struct PatternRetryHandler {
    max_attempts: u32,
    patterns: Vec<String>,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl PatternRetryHandler {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            patterns: config.retryable_patterns.clone(),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Exponential delay before jitter: base * 2^(attempt-1), capped
    fn nominal_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl RetryHandler for PatternRetryHandler {
    fn is_retryable(&self, err: &CommandError, attempt: u32) -> bool {
        if attempt >= self.max_attempts || err.is_launch_failure() {
            return false;
        }
        if self.patterns.is_empty() {
            return true;
        }

        let output = err.output();
        self.patterns.iter().any(|p| output.contains(p.as_str()))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.nominal_delay(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        // Equal jitter: keep at least half of the nominal delay
        let half = delay / 2;
        let spread = (delay - half).as_millis() as u64;
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}
