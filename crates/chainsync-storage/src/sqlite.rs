//! SQLite storage backend for ChainSync.
//!
//! Persists safe heights and per-configuration progress to a single SQLite
//! file. Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use chainsync_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./sync.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainsync_core::{
    ConfigurationStore, IndexerError, MaxHeight, SafeHeightRecord, SafeHeightStore,
    SavedConfiguration,
};

fn storage_err(e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed storage for safe heights and configurations.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./sync.db"`) or a full
    /// SQLite URL (`"sqlite:./sync.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool is
    /// limited to one connection. All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS safe_heights (
                indexer_id   TEXT    NOT NULL PRIMARY KEY,
                safe_height  INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        // max_height / current_height are NULL when unbounded / never synced.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS configurations (
                indexer_id      TEXT    NOT NULL,
                id              TEXT    NOT NULL,
                position        INTEGER NOT NULL,
                properties_json TEXT    NOT NULL,
                min_height      INTEGER NOT NULL,
                max_height      INTEGER,
                current_height  INTEGER,
                PRIMARY KEY (indexer_id, id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!("SQLite schema initialised");
        Ok(())
    }
}

// ─── SafeHeightStore impl ────────────────────────────────────────────────────

#[async_trait]
impl SafeHeightStore for SqliteStorage {
    async fn load(&self, indexer_id: &str) -> Result<Option<SafeHeightRecord>, IndexerError> {
        let row = sqlx::query(
            "SELECT indexer_id, safe_height, updated_at
             FROM safe_heights
             WHERE indexer_id = ?",
        )
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| SafeHeightRecord {
            indexer_id: r.get("indexer_id"),
            safe_height: r.get::<i64, _>("safe_height"),
            updated_at: r.get::<i64, _>("updated_at"),
        }))
    }

    async fn save(&self, record: SafeHeightRecord) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR REPLACE INTO safe_heights (indexer_id, safe_height, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(&record.indexer_id)
        .bind(record.safe_height)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            indexer = %record.indexer_id,
            safe_height = record.safe_height,
            "Safe height saved"
        );
        Ok(())
    }

    async fn delete(&self, indexer_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM safe_heights WHERE indexer_id = ?")
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ─── ConfigurationStore impl ─────────────────────────────────────────────────

#[async_trait]
impl ConfigurationStore for SqliteStorage {
    async fn load_configurations(
        &self,
        indexer_id: &str,
    ) -> Result<Vec<SavedConfiguration<serde_json::Value>>, IndexerError> {
        let rows = sqlx::query(
            "SELECT id, properties_json, min_height, max_height, current_height
             FROM configurations
             WHERE indexer_id = ?
             ORDER BY position ASC",
        )
        .bind(indexer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter()
            .map(|r| {
                let id: String = r.get("id");
                let raw: String = r.get("properties_json");
                let properties = serde_json::from_str(&raw).map_err(|e| {
                    IndexerError::Storage(format!("configuration '{id}' has malformed properties: {e}"))
                })?;
                Ok(SavedConfiguration {
                    id,
                    properties,
                    min_height: r.get::<i64, _>("min_height"),
                    max_height: MaxHeight::from(r.get::<Option<i64>, _>("max_height")),
                    current_height: r.get::<Option<i64>, _>("current_height"),
                })
            })
            .collect()
    }

    async fn save_configurations(
        &self,
        indexer_id: &str,
        configurations: &[SavedConfiguration<serde_json::Value>],
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query("DELETE FROM configurations WHERE indexer_id = ?")
            .bind(indexer_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        for (position, saved) in configurations.iter().enumerate() {
            sqlx::query(
                "INSERT INTO configurations
                    (indexer_id, id, position, properties_json, min_height, max_height, current_height)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(indexer_id)
            .bind(&saved.id)
            .bind(position as i64)
            .bind(saved.properties.to_string())
            .bind(saved.min_height)
            .bind(saved.max_height.as_finite())
            .bind(saved.current_height)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(
            indexer = %indexer_id,
            count = configurations.len(),
            "Configurations saved"
        );
        Ok(())
    }

    async fn delete_configurations(&self, indexer_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM configurations WHERE indexer_id = ?")
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
