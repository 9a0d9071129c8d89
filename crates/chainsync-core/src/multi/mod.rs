//! Multi-configuration indexers.
//!
//! One physical indexer serving many [`Configuration`]s that each cover their
//! own `[min_height, max_height]` window of the shared height axis.

mod adapter;
mod diff;
mod ranges;
mod types;

pub use adapter::{MultiIndexer, MultiIndexerAdapter};
pub use diff::{diff_configurations, validate_configurations, ConfigurationDiff};
pub use ranges::{find_range, to_ranges};
pub use types::{
    Configuration, ConfigurationRange, RemovalConfiguration, SavedConfiguration,
    UpdateConfiguration,
};
