//! The concrete-indexer contract and per-indexer configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::height::{Height, MaxHeight};
use crate::retry::RetryConfig;

/// Work the runtime delegates to a concrete indexer.
///
/// All methods take `&self`: the runtime shares the indexer between its
/// control loop and the tasks executing effects, and never runs two calls of
/// the same kind at once.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Load local progress. `Unbounded` means local data never limits the
    /// indexer and the parents' safe height is used instead.
    ///
    /// Defaults to the persisted safe height, or `0` when nothing was saved.
    async fn initialize(&self) -> Result<MaxHeight, IndexerError> {
        Ok(MaxHeight::Finite(self.get_safe_height().await?.unwrap_or(0)))
    }

    /// Sync `(current, target]`. Must return a height in `[current, target]`.
    async fn update(&self, current: Height, target: Height) -> Result<Height, IndexerError>;

    /// Delete data above `target`. Must return a height `<= target`.
    async fn invalidate(&self, target: Height) -> Result<Height, IndexerError>;

    /// Discover a new head height. Only roots tick.
    async fn tick(&self) -> Result<Height, IndexerError> {
        Err(IndexerError::Other(
            "tick is only supported by root indexers".into(),
        ))
    }

    async fn get_safe_height(&self) -> Result<Option<Height>, IndexerError> {
        Ok(None)
    }

    /// Persist the safe height published to children.
    async fn set_safe_height(&self, _height: Height) -> Result<(), IndexerError> {
        Ok(())
    }
}

/// Configuration for one node of an indexer graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used for logs and persistence keys).
    pub id: String,
    /// Periodic tick interval for roots (milliseconds). `None` = tick on request only.
    pub tick_interval_ms: Option<u64>,
    pub update_retry: RetryConfig,
    pub invalidate_retry: RetryConfig,
    pub tick_retry: RetryConfig,
    /// Retry policy for `initialize`; exhaustion leaves the node errored.
    pub initialize_retry: RetryConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            tick_interval_ms: None,
            update_retry: RetryConfig::default(),
            invalidate_retry: RetryConfig::default(),
            tick_retry: RetryConfig::default(),
            initialize_retry: RetryConfig::default(),
        }
    }
}

impl IndexerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, IndexerError> {
        serde_json::from_str(json)
            .map_err(|e| IndexerError::Other(format!("invalid indexer config: {e}")))
    }
}
