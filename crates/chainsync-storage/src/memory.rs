//! In-memory storage backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chainsync_core::{
    ConfigurationStore, Height, IndexerError, SafeHeightRecord, SafeHeightStore,
    SavedConfiguration,
};

/// A row of indexed data, tagged with the height it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub indexer_id: String,
    /// Configuration that produced the record, for multi-configuration indexers.
    pub configuration_id: Option<String>,
    pub height: Height,
    pub payload: serde_json::Value,
}

/// In-memory storage for safe heights, configurations and indexed records.
///
/// Records are kept per indexer so invalidation and configuration removal can
/// be exercised without a database.
#[derive(Default)]
pub struct InMemoryStorage {
    safe_heights: Mutex<HashMap<String, SafeHeightRecord>>,
    configurations: Mutex<HashMap<String, Vec<SavedConfiguration<serde_json::Value>>>>,
    records: Mutex<Vec<StoredRecord>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_record(&self, record: StoredRecord) {
        self.records.lock().unwrap().push(record);
    }

    /// Records of one indexer, ordered by height.
    pub fn records(&self, indexer_id: &str) -> Vec<StoredRecord> {
        let mut found: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.indexer_id == indexer_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.height);
        found
    }

    pub fn record_count(&self, indexer_id: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.indexer_id == indexer_id)
            .count()
    }

    /// Highest recorded height of an indexer.
    pub fn max_record_height(&self, indexer_id: &str) -> Option<Height> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.indexer_id == indexer_id)
            .map(|r| r.height)
            .max()
    }

    /// Drop every record of `indexer_id` above `height`. Returns how many were removed.
    pub fn rollback_after(&self, indexer_id: &str, height: Height) -> usize {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.indexer_id != indexer_id || r.height <= height);
        before - records.len()
    }

    /// Drop the records one configuration produced in `[from, to]`.
    pub fn remove_configuration_range(
        &self,
        indexer_id: &str,
        configuration_id: &str,
        from: Height,
        to: Height,
    ) -> usize {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| {
            !(r.indexer_id == indexer_id
                && r.configuration_id.as_deref() == Some(configuration_id)
                && (from..=to).contains(&r.height))
        });
        before - records.len()
    }
}

#[async_trait]
impl SafeHeightStore for InMemoryStorage {
    async fn load(&self, indexer_id: &str) -> Result<Option<SafeHeightRecord>, IndexerError> {
        Ok(self.safe_heights.lock().unwrap().get(indexer_id).cloned())
    }

    async fn save(&self, record: SafeHeightRecord) -> Result<(), IndexerError> {
        self.safe_heights
            .lock()
            .unwrap()
            .insert(record.indexer_id.clone(), record);
        Ok(())
    }

    async fn delete(&self, indexer_id: &str) -> Result<(), IndexerError> {
        self.safe_heights.lock().unwrap().remove(indexer_id);
        Ok(())
    }
}

#[async_trait]
impl ConfigurationStore for InMemoryStorage {
    async fn load_configurations(
        &self,
        indexer_id: &str,
    ) -> Result<Vec<SavedConfiguration<serde_json::Value>>, IndexerError> {
        Ok(self
            .configurations
            .lock()
            .unwrap()
            .get(indexer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_configurations(
        &self,
        indexer_id: &str,
        configurations: &[SavedConfiguration<serde_json::Value>],
    ) -> Result<(), IndexerError> {
        self.configurations
            .lock()
            .unwrap()
            .insert(indexer_id.to_string(), configurations.to_vec());
        Ok(())
    }

    async fn delete_configurations(&self, indexer_id: &str) -> Result<(), IndexerError> {
        self.configurations.lock().unwrap().remove(indexer_id);
        Ok(())
    }
}
