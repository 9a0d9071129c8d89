//! Indexer state machine.
//!
//! [`reduce`] is a pure function `(state, event) -> (state, effects)`. It never
//! performs I/O and never blocks; the runtime executes the returned effects and
//! feeds their outcomes back as new events.
//!
//! ```text
//!            Initialized + all parents known
//!   init ────────────────────────────────────► invalidating ──► idle
//!                                                    ▲            │ ▲
//!                     parent rolled back, children   │            │ │
//!                     acknowledged ──────────────────┘  parent    │ │ UpdateSucceeded
//!                                                       advanced  ▼ │
//!                                                              updating
//!   (roots)  idle ──RequestTick──► ticking ──TickSucceeded──► idle
//!   any fatal failure ──► errored
//! ```

mod event;
mod handlers;
mod state;

pub use event::{IndexerEffect, IndexerEvent};
pub use state::{ChildState, IndexerState, IndexerStatus, ParentState};

use crate::error::IndexerError;

/// Next state plus the effects to execute, in order.
pub type ReducerResult = Result<(IndexerState, Vec<IndexerEffect>), IndexerError>;

/// Apply one event to `state`.
///
/// Returns [`IndexerError::InvalidTransition`] when the event cannot occur in
/// the current status; that always indicates a wiring defect.
pub fn reduce(state: &IndexerState, event: IndexerEvent) -> ReducerResult {
    let state = state.clone();
    match event {
        IndexerEvent::Initialized {
            safe_height,
            child_count,
        } => handlers::handle_initialized(state, safe_height, child_count),
        IndexerEvent::InitializeFailed => handlers::handle_initialize_failed(state),
        IndexerEvent::ParentUpdated { index, safe_height } => {
            handlers::handle_parent_updated(state, index, safe_height)
        }
        IndexerEvent::ChildReady { index } => handlers::handle_child_ready(state, index),
        IndexerEvent::UpdateSucceeded { from, new_height } => {
            handlers::handle_update_succeeded(state, from, new_height)
        }
        IndexerEvent::UpdateFailed { fatal } => handlers::handle_update_failed(state, fatal),
        IndexerEvent::RetryUpdate => handlers::handle_retry_update(state),
        IndexerEvent::InvalidateSucceeded { target_height } => {
            handlers::handle_invalidate_succeeded(state, target_height)
        }
        IndexerEvent::InvalidateFailed { fatal } => {
            handlers::handle_invalidate_failed(state, fatal)
        }
        IndexerEvent::RetryInvalidate => handlers::handle_retry_invalidate(state),
        IndexerEvent::RequestTick => handlers::handle_request_tick(state),
        IndexerEvent::TickSucceeded { safe_height } => {
            handlers::handle_tick_succeeded(state, safe_height)
        }
        IndexerEvent::TickFailed { fatal } => handlers::handle_tick_failed(state, fatal),
        IndexerEvent::RetryTick => handlers::handle_retry_tick(state),
    }
}
