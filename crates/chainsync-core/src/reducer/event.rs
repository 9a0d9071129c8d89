//! Events fed into the reducer and effects it asks the runtime to perform.

use serde::{Deserialize, Serialize};

use crate::height::{Height, MaxHeight};

/// Something that happened to an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IndexerEvent {
    /// Local initialization finished. `Unbounded` means the local data never
    /// limits progress; the parents' safe height is used instead.
    Initialized {
        safe_height: MaxHeight,
        child_count: usize,
    },
    /// Local initialization gave up.
    InitializeFailed,
    ParentUpdated {
        index: usize,
        safe_height: Height,
    },
    ChildReady {
        index: usize,
    },
    UpdateSucceeded {
        from: Height,
        new_height: Height,
    },
    UpdateFailed {
        fatal: bool,
    },
    RetryUpdate,
    InvalidateSucceeded {
        target_height: Height,
    },
    InvalidateFailed {
        fatal: bool,
    },
    RetryInvalidate,
    RequestTick,
    TickSucceeded {
        safe_height: Height,
    },
    TickFailed {
        fatal: bool,
    },
    RetryTick,
}

impl IndexerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "Initialized",
            Self::InitializeFailed => "InitializeFailed",
            Self::ParentUpdated { .. } => "ParentUpdated",
            Self::ChildReady { .. } => "ChildReady",
            Self::UpdateSucceeded { .. } => "UpdateSucceeded",
            Self::UpdateFailed { .. } => "UpdateFailed",
            Self::RetryUpdate => "RetryUpdate",
            Self::InvalidateSucceeded { .. } => "InvalidateSucceeded",
            Self::InvalidateFailed { .. } => "InvalidateFailed",
            Self::RetryInvalidate => "RetryInvalidate",
            Self::RequestTick => "RequestTick",
            Self::TickSucceeded { .. } => "TickSucceeded",
            Self::TickFailed { .. } => "TickFailed",
            Self::RetryTick => "RetryTick",
        }
    }
}

/// Work the runtime must perform on behalf of the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IndexerEffect {
    Update { target_height: Height },
    Invalidate { target_height: Height },
    /// Persist and publish a new safe height to every child.
    SetSafeHeight { safe_height: Height },
    /// Acknowledge the listed parents' safe-height decreases.
    NotifyReady { parent_indices: Vec<usize> },
    Tick,
    ScheduleRetryUpdate,
    ScheduleRetryInvalidate,
    ScheduleRetryTick,
}
