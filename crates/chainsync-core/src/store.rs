//! Persistence collaborators.
//!
//! A safe-height record lets an indexer resume from the last height it
//! published instead of re-syncing from zero. Configuration records hold the
//! per-configuration progress of multi-configuration indexers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::height::Height;
use crate::multi::SavedConfiguration;

/// A persisted safe height for one indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeHeightRecord {
    pub indexer_id: String,
    pub safe_height: Height,
    /// Unix timestamp of when this record was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading safe heights.
///
/// Implementations include `InMemoryStorage` and `SqliteStorage`.
#[async_trait]
pub trait SafeHeightStore: Send + Sync {
    async fn load(&self, indexer_id: &str) -> Result<Option<SafeHeightRecord>, IndexerError>;

    /// Save (upsert) a record.
    async fn save(&self, record: SafeHeightRecord) -> Result<(), IndexerError>;

    /// Delete a record (e.g. when resetting an indexer).
    async fn delete(&self, indexer_id: &str) -> Result<(), IndexerError>;
}

/// Trait for storing per-configuration progress.
///
/// Properties are stored as JSON; see [`load_typed_configurations`] and
/// [`save_typed_configurations`] for typed access.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    async fn load_configurations(
        &self,
        indexer_id: &str,
    ) -> Result<Vec<SavedConfiguration<serde_json::Value>>, IndexerError>;

    /// Replace every configuration stored for `indexer_id`.
    async fn save_configurations(
        &self,
        indexer_id: &str,
        configurations: &[SavedConfiguration<serde_json::Value>],
    ) -> Result<(), IndexerError>;

    async fn delete_configurations(&self, indexer_id: &str) -> Result<(), IndexerError>;
}

/// Load configurations and decode their properties as `T`.
pub async fn load_typed_configurations<T: DeserializeOwned>(
    store: &dyn ConfigurationStore,
    indexer_id: &str,
) -> Result<Vec<SavedConfiguration<T>>, IndexerError> {
    store
        .load_configurations(indexer_id)
        .await?
        .into_iter()
        .map(|saved| {
            let id = saved.id.clone();
            let properties = serde_json::from_value(saved.properties.clone()).map_err(|e| {
                IndexerError::Storage(format!("configuration '{id}' has malformed properties: {e}"))
            })?;
            Ok(saved.map_properties(|_| properties))
        })
        .collect()
}

/// Encode `T` properties as JSON and save.
pub async fn save_typed_configurations<T: Serialize>(
    store: &dyn ConfigurationStore,
    indexer_id: &str,
    configurations: &[SavedConfiguration<T>],
) -> Result<(), IndexerError> {
    let encoded = configurations
        .iter()
        .map(|saved| {
            let properties = serde_json::to_value(&saved.properties)
                .map_err(|e| IndexerError::Storage(e.to_string()))?;
            Ok(SavedConfiguration {
                id: saved.id.clone(),
                properties,
                min_height: saved.min_height,
                max_height: saved.max_height,
                current_height: saved.current_height,
            })
        })
        .collect::<Result<Vec<_>, IndexerError>>()?;
    store.save_configurations(indexer_id, &encoded).await
}

/// Safe-height reads/writes bound to one indexer id.
#[derive(Clone)]
pub struct SafeHeightManager {
    store: Arc<dyn SafeHeightStore>,
    indexer_id: String,
}

impl SafeHeightManager {
    pub fn new(store: Arc<dyn SafeHeightStore>, indexer_id: impl Into<String>) -> Self {
        Self {
            store,
            indexer_id: indexer_id.into(),
        }
    }

    pub fn indexer_id(&self) -> &str {
        &self.indexer_id
    }

    /// The saved height, or `None` if this indexer never published one.
    pub async fn load(&self) -> Result<Option<Height>, IndexerError> {
        Ok(self
            .store
            .load(&self.indexer_id)
            .await?
            .map(|record| record.safe_height))
    }

    pub async fn save(&self, safe_height: Height) -> Result<(), IndexerError> {
        let record = SafeHeightRecord {
            indexer_id: self.indexer_id.clone(),
            safe_height,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(record).await
    }

    pub async fn reset(&self) -> Result<(), IndexerError> {
        self.store.delete(&self.indexer_id).await
    }
}
