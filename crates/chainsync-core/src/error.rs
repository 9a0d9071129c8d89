//! Error types for the chainsync coordination framework.

use thiserror::Error;

use crate::height::{Height, MaxHeight};
use crate::reducer::IndexerStatus;

/// Errors that can occur while coordinating an indexer graph.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Source error: {0}")]
    Source(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Update returned height {returned}, expected a value in [{current}, {target}]")]
    HeightOutOfRange {
        current: Height,
        target: Height,
        returned: Height,
    },

    #[error("Invalidate to {target} reported height {returned}")]
    InvalidatedAbove { target: Height, returned: Height },

    #[error("Configuration '{id}' is duplicated")]
    DuplicateConfiguration { id: String },

    #[error("Configuration '{id}' has minHeight {min_height} greater than maxHeight {max_height}")]
    InvalidConfigurationRange {
        id: String,
        min_height: Height,
        max_height: MaxHeight,
    },

    #[error("No configuration range contains height {height}")]
    MissingRange { height: Height },

    #[error("Configuration '{id}' is not tracked by this indexer")]
    UnknownConfiguration { id: String },

    #[error("Event {event} is not allowed in status '{status}'")]
    InvalidTransition {
        status: IndexerStatus,
        event: &'static str,
    },

    #[error("A root indexer cannot start from an unbounded height")]
    UnboundedRoot,

    #[error("Unknown parent indexer #{index}")]
    UnknownParent { index: usize },

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error signals a defect in an indexer implementation
    /// rather than a transient environment failure. These are never retried.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::HeightOutOfRange { .. }
                | Self::InvalidatedAbove { .. }
                | Self::DuplicateConfiguration { .. }
                | Self::InvalidConfigurationRange { .. }
                | Self::MissingRange { .. }
                | Self::UnknownConfiguration { .. }
                | Self::InvalidTransition { .. }
                | Self::UnboundedRoot
        )
    }
}
