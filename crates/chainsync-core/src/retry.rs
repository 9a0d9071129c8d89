//! Exponential backoff retry strategy.
//!
//! Unlike a stateless policy, a [`RetryStrategy`] counts the attempts made
//! for one concern (update, invalidate, tick, initialize) and is cleared on
//! the next success, so an unrelated later failure starts with a full budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a retry strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of failed attempts before giving up. `None` = retry forever.
    pub max_attempts: Option<u32>,
    /// Base delay; the first retry waits `initial_backoff_ms * multiplier`.
    pub initial_backoff_ms: u64,
    /// Cap on the delay. `None` = uncapped.
    pub max_backoff_ms: Option<u64>,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            initial_backoff_ms: 1_000,
            max_backoff_ms: Some(60_000),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with a bounded attempt budget and no cap on the delay.
    pub fn exponential(max_attempts: u32, initial_backoff_ms: u64) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_backoff_ms,
            max_backoff_ms: None,
            multiplier: 2.0,
        }
    }

    /// Retry forever, doubling from `initial_backoff_ms` up to `max_backoff_ms`.
    pub fn unbounded(initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: None,
            initial_backoff_ms,
            max_backoff_ms: Some(max_backoff_ms),
            multiplier: 2.0,
        }
    }
}

/// Stateful attempt counter + delay generator.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
    attempts: u32,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Record one failed attempt.
    pub fn mark_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Returns `true` while the attempt budget is not exhausted.
    pub fn should_retry(&self) -> bool {
        match self.config.max_attempts {
            Some(max) => self.attempts < max,
            None => true,
        }
    }

    /// Delay before the next attempt, based on the attempts recorded so far.
    pub fn timeout(&self) -> Duration {
        let exponent = i32::try_from(self.attempts).unwrap_or(i32::MAX);
        let mut ms = self.config.initial_backoff_ms as f64 * self.config.multiplier.powi(exponent);
        if let Some(cap) = self.config.max_backoff_ms {
            ms = ms.min(cap as f64);
        }
        // f64 -> u64 casts saturate, which also covers an overflowing product.
        Duration::from_millis(ms as u64)
    }

    /// Forget previous failures.
    pub fn clear(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_after_each_attempt() {
        let mut strategy = RetryStrategy::new(RetryConfig::exponential(10, 100));
        let mut delays = Vec::new();
        for _ in 0..3 {
            strategy.mark_attempt();
            assert!(strategy.should_retry());
            delays.push(strategy.timeout().as_millis());
        }
        assert_eq!(delays, vec![200, 400, 800]);
    }

    #[test]
    fn delay_capped_at_max() {
        let mut strategy = RetryStrategy::new(RetryConfig::unbounded(100, 500));
        for _ in 0..20 {
            strategy.mark_attempt();
        }
        assert_eq!(strategy.timeout(), Duration::from_millis(500));
        assert!(strategy.should_retry());
    }

    #[test]
    fn budget_exhausts() {
        let mut strategy = RetryStrategy::new(RetryConfig::exponential(2, 10));
        strategy.mark_attempt();
        assert!(strategy.should_retry());
        strategy.mark_attempt();
        assert!(!strategy.should_retry());
    }

    #[test]
    fn clear_restores_budget() {
        let mut strategy = RetryStrategy::new(RetryConfig::exponential(1, 10));
        strategy.mark_attempt();
        assert!(!strategy.should_retry());
        strategy.clear();
        assert_eq!(strategy.attempts(), 0);
        assert!(strategy.should_retry());
        assert_eq!(strategy.timeout(), Duration::from_millis(10));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: RetryConfig = serde_json::from_str(r#"{ "max_attempts": null }"#).unwrap();
        assert_eq!(cfg.max_attempts, None);
        assert_eq!(cfg.initial_backoff_ms, 1_000);
        assert_eq!(cfg.multiplier, 2.0);
    }
}
