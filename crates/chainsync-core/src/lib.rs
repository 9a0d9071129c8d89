//! chainsync-core — coordination framework for graphs of incremental indexers.
//!
//! # Architecture
//!
//! ```text
//! IndexerGraph → one control loop per node
//!                    ├── reduce            (pure state machine: event → state + effects)
//!                    ├── RetryStrategy     (exponential backoff per operation)
//!                    ├── Indexer           (user update / invalidate / tick)
//!                    │     └── MultiIndexerAdapter (range partitioning + reconciliation)
//!                    └── SafeHeightStore / ConfigurationStore (memory / SQLite)
//! ```
//!
//! Roots tick to discover new heights; every safe height flows down the graph
//! as `ParentUpdated`. When a parent rolls back, each descendant lowers its own
//! safe height first, waits for its children to acknowledge, invalidates its
//! data and only then acknowledges upward.

pub mod builder;
pub mod error;
pub mod height;
pub mod indexer;
pub mod multi;
pub mod reducer;
pub mod retry;
pub mod runtime;
pub mod store;

pub use builder::IndexerBuilder;
pub use error::IndexerError;
pub use height::{Height, MaxHeight};
pub use indexer::{Indexer, IndexerConfig};
pub use multi::{
    Configuration, MultiIndexer, MultiIndexerAdapter, RemovalConfiguration, SavedConfiguration,
    UpdateConfiguration,
};
pub use reducer::{reduce, IndexerEffect, IndexerEvent, IndexerState, IndexerStatus};
pub use retry::{RetryConfig, RetryStrategy};
pub use runtime::{GraphHandle, IndexerGraph, IndexerHandle, NodeId};
pub use store::{ConfigurationStore, SafeHeightManager, SafeHeightRecord, SafeHeightStore};
