//! chainsync-storage — repository backends for chainsync-core.
//!
//! # Backends
//!
//! - **memory** (default) — `InMemoryStorage`, for tests and simulations
//! - **sqlite** (feature `sqlite`) — `SqliteStorage`, backed by sqlx
//!
//! Both implement [`SafeHeightStore`](chainsync_core::SafeHeightStore) and
//! [`ConfigurationStore`](chainsync_core::ConfigurationStore).

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{InMemoryStorage, StoredRecord};
