//! Indexer state owned by a single control loop.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::height::Height;

/// Lifecycle status of an indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerStatus {
    /// Waiting for local initialization and for every parent to report.
    Init,
    /// Nothing in flight.
    Idle,
    /// An `update` call is in flight.
    Updating,
    /// An `invalidate` call is in flight.
    Invalidating,
    /// A `tick` call is in flight (roots only).
    Ticking,
    /// Retries exhausted or a protocol violation occurred. Only a restart recovers.
    Errored,
}

impl fmt::Display for IndexerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Idle => write!(f, "idle"),
            Self::Updating => write!(f, "updating"),
            Self::Invalidating => write!(f, "invalidating"),
            Self::Ticking => write!(f, "ticking"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// This indexer's view of one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParentState {
    /// The parent has reported its safe height at least once.
    pub initialized: bool,
    pub safe_height: Height,
    /// The parent lowered its safe height and waits for our acknowledgement.
    pub waiting: bool,
}

/// This indexer's view of one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildState {
    /// The child has acknowledged our latest safe-height decrease.
    pub ready: bool,
}

impl Default for ChildState {
    fn default() -> Self {
        Self { ready: true }
    }
}

/// Complete protocol state of one indexer. Only the reducer mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerState {
    pub status: IndexerStatus,
    /// Height the local data actually reaches.
    pub height: Height,
    /// Height pursued by the current (or next) update/invalidate/tick.
    pub target_height: Height,
    /// Height published to children.
    pub safe_height: Height,
    /// We lowered `safe_height` and not every child has acknowledged it yet.
    pub waiting: bool,
    /// One coalesced tick request received while a tick was in flight.
    pub tick_scheduled: bool,
    pub initialized_self: bool,
    pub parents: Vec<ParentState>,
    pub children: Vec<ChildState>,
    pub retrying_update: bool,
    pub retrying_invalidate: bool,
    pub retrying_tick: bool,
}

impl IndexerState {
    /// Fresh state for an indexer with `parent_count` parents.
    pub fn new(parent_count: usize) -> Self {
        Self {
            status: IndexerStatus::Init,
            height: 0,
            target_height: 0,
            safe_height: 0,
            waiting: false,
            tick_scheduled: false,
            initialized_self: false,
            parents: vec![ParentState::default(); parent_count],
            children: Vec::new(),
            retrying_update: false,
            retrying_invalidate: false,
            retrying_tick: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Minimum safe height over all parents; `None` for a root.
    pub fn parent_height(&self) -> Option<Height> {
        self.parents.iter().map(|p| p.safe_height).min()
    }

    pub fn all_parents_initialized(&self) -> bool {
        self.parents.iter().all(|p| p.initialized)
    }

    pub fn all_children_ready(&self) -> bool {
        self.children.iter().all(|c| c.ready)
    }

    /// Indices of parents currently waiting on this indexer.
    pub fn waiting_parents(&self) -> Vec<usize> {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, p)| p.waiting)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn mark_children_unready(&mut self) {
        if self.children.is_empty() {
            return;
        }
        for child in &mut self.children {
            child.ready = false;
        }
        self.waiting = true;
    }
}
