//! Fluent builder API for indexer configurations.
//!
//! # Example
//!
//! ```rust
//! use chainsync_core::{IndexerBuilder, RetryConfig};
//!
//! let config = IndexerBuilder::new()
//!     .id("block-timestamps")
//!     .tick_interval_ms(2_000)
//!     .update_retry(RetryConfig::exponential(10, 100))
//!     .build_config();
//! assert_eq!(config.tick_interval_ms, Some(2_000));
//! ```

use crate::indexer::IndexerConfig;
use crate::retry::RetryConfig;

/// Fluent builder for `IndexerConfig`.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Set the indexer ID (used for logs and persistence keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Tick roots periodically, starting immediately.
    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.tick_interval_ms = Some(ms);
        self
    }

    pub fn update_retry(mut self, retry: RetryConfig) -> Self {
        self.config.update_retry = retry;
        self
    }

    pub fn invalidate_retry(mut self, retry: RetryConfig) -> Self {
        self.config.invalidate_retry = retry;
        self
    }

    pub fn tick_retry(mut self, retry: RetryConfig) -> Self {
        self.config.tick_retry = retry;
        self
    }

    pub fn initialize_retry(mut self, retry: RetryConfig) -> Self {
        self.config.initialize_retry = retry;
        self
    }

    /// Use the same policy for every operation.
    pub fn retry(self, retry: RetryConfig) -> Self {
        self.update_retry(retry.clone())
            .invalidate_retry(retry.clone())
            .tick_retry(retry.clone())
            .initialize_retry(retry)
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }
}
