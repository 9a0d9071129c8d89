//! Transition handlers, one per event.
//!
//! Every handler takes ownership of a copy of the state and returns the next
//! state together with the effects to execute. Handlers that leave the node
//! able to make progress funnel into [`continue_operations`], which derives
//! the next step from the latest parent/child view instead of assuming
//! nothing changed while an operation was in flight.

use super::event::IndexerEffect;
use super::state::{ChildState, IndexerState, IndexerStatus};
use super::ReducerResult;
use crate::error::IndexerError;
use crate::height::{Height, MaxHeight};

fn assert_status(
    state: &IndexerState,
    allowed: &[IndexerStatus],
    event: &'static str,
) -> Result<(), IndexerError> {
    if allowed.contains(&state.status) {
        Ok(())
    } else {
        Err(invalid(state, event))
    }
}

fn invalid(state: &IndexerState, event: &'static str) -> IndexerError {
    IndexerError::InvalidTransition {
        status: state.status,
        event,
    }
}

// ─── Initialization ──────────────────────────────────────────────────────────

pub(super) fn handle_initialized(
    mut state: IndexerState,
    safe_height: MaxHeight,
    child_count: usize,
) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Init], "Initialized")?;
    if state.initialized_self {
        return Err(invalid(&state, "Initialized"));
    }
    if state.is_root() && safe_height.is_unbounded() {
        return Err(IndexerError::UnboundedRoot);
    }

    let height = safe_height.min_with(Height::MAX);
    state.initialized_self = true;
    state.height = height;
    state.target_height = height;
    state.children = vec![ChildState::default(); child_count];
    finish_initialization(state)
}

pub(super) fn handle_initialize_failed(mut state: IndexerState) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Init], "InitializeFailed")?;
    state.status = IndexerStatus::Errored;
    // Parents may have lowered their height while we were starting up.
    continue_operations(state)
}

/// Leaves `init` once both the local height and every parent are known.
///
/// Reached from `Initialized` and from `ParentUpdated`, whichever comes last.
fn finish_initialization(mut state: IndexerState) -> ReducerResult {
    if !state.initialized_self {
        return Ok((state, vec![]));
    }

    let Some(parent_height) = state.parent_height() else {
        state.status = IndexerStatus::Idle;
        state.safe_height = state.height;
        state.target_height = state.height;
        let mut effects = vec![IndexerEffect::SetSafeHeight {
            safe_height: state.height,
        }];
        if state.tick_scheduled {
            state.tick_scheduled = false;
            state.status = IndexerStatus::Ticking;
            effects.push(IndexerEffect::Tick);
        }
        return Ok((state, effects));
    };

    if !state.all_parents_initialized() {
        return Ok((state, vec![]));
    }

    let height = state.height.min(parent_height);
    state.status = IndexerStatus::Invalidating;
    state.height = height;
    state.target_height = height;
    state.safe_height = height;
    Ok((
        state,
        vec![
            IndexerEffect::SetSafeHeight {
                safe_height: height,
            },
            IndexerEffect::Invalidate {
                target_height: height,
            },
        ],
    ))
}

// ─── Graph neighbours ────────────────────────────────────────────────────────

pub(super) fn handle_parent_updated(
    mut state: IndexerState,
    index: usize,
    safe_height: Height,
) -> ReducerResult {
    assert_status(
        &state,
        &[
            IndexerStatus::Init,
            IndexerStatus::Idle,
            IndexerStatus::Updating,
            IndexerStatus::Invalidating,
            IndexerStatus::Errored,
        ],
        "ParentUpdated",
    )?;
    let Some(parent) = state.parents.get_mut(index) else {
        return Err(invalid(&state, "ParentUpdated"));
    };

    if parent.initialized && safe_height < parent.safe_height {
        parent.waiting = true;
    }
    parent.safe_height = safe_height;
    parent.initialized = true;

    if state.status == IndexerStatus::Init {
        finish_initialization(state)
    } else {
        continue_operations(state)
    }
}

pub(super) fn handle_child_ready(mut state: IndexerState, index: usize) -> ReducerResult {
    let Some(child) = state.children.get_mut(index) else {
        return Err(invalid(&state, "ChildReady"));
    };
    child.ready = true;
    continue_operations(state)
}

// ─── Update ──────────────────────────────────────────────────────────────────

pub(super) fn handle_update_succeeded(
    mut state: IndexerState,
    from: Height,
    new_height: Height,
) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Updating], "UpdateSucceeded")?;
    if from != state.height || new_height < from {
        return Err(invalid(&state, "UpdateSucceeded"));
    }
    state.height = new_height;
    state.status = IndexerStatus::Idle;
    state.retrying_update = false;
    continue_operations(state)
}

pub(super) fn handle_update_failed(mut state: IndexerState, fatal: bool) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Updating], "UpdateFailed")?;
    if fatal {
        state.status = IndexerStatus::Errored;
        return continue_operations(state);
    }
    if state.retrying_update {
        return Ok((state, vec![]));
    }
    state.retrying_update = true;
    Ok((state, vec![IndexerEffect::ScheduleRetryUpdate]))
}

pub(super) fn handle_retry_update(mut state: IndexerState) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Updating], "RetryUpdate")?;
    state.retrying_update = false;
    state.status = IndexerStatus::Idle;
    continue_operations(state)
}

// ─── Invalidate ──────────────────────────────────────────────────────────────

pub(super) fn handle_invalidate_succeeded(
    mut state: IndexerState,
    target_height: Height,
) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Invalidating], "InvalidateSucceeded")?;
    state.height = target_height;
    state.target_height = state.target_height.min(target_height);
    state.status = IndexerStatus::Idle;
    state.retrying_invalidate = false;
    continue_operations(state)
}

pub(super) fn handle_invalidate_failed(mut state: IndexerState, fatal: bool) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Invalidating], "InvalidateFailed")?;
    if fatal {
        state.status = IndexerStatus::Errored;
        return continue_operations(state);
    }
    if state.retrying_invalidate {
        return Ok((state, vec![]));
    }
    state.retrying_invalidate = true;
    Ok((state, vec![IndexerEffect::ScheduleRetryInvalidate]))
}

pub(super) fn handle_retry_invalidate(mut state: IndexerState) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Invalidating], "RetryInvalidate")?;
    state.retrying_invalidate = false;
    state.status = IndexerStatus::Idle;
    continue_operations(state)
}

// ─── Tick (roots only) ───────────────────────────────────────────────────────

pub(super) fn handle_request_tick(mut state: IndexerState) -> ReducerResult {
    if !state.is_root() {
        return Err(invalid(&state, "RequestTick"));
    }
    match state.status {
        IndexerStatus::Idle => {
            state.status = IndexerStatus::Ticking;
            Ok((state, vec![IndexerEffect::Tick]))
        }
        IndexerStatus::Init | IndexerStatus::Ticking => {
            state.tick_scheduled = true;
            Ok((state, vec![]))
        }
        IndexerStatus::Errored => Ok((state, vec![])),
        IndexerStatus::Updating | IndexerStatus::Invalidating => {
            Err(invalid(&state, "RequestTick"))
        }
    }
}

pub(super) fn handle_tick_succeeded(mut state: IndexerState, safe_height: Height) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Ticking], "TickSucceeded")?;
    let mut effects = Vec::new();

    state.retrying_tick = false;
    state.height = safe_height;
    state.target_height = safe_height;
    if safe_height < state.safe_height {
        state.mark_children_unready();
        state.safe_height = safe_height;
        effects.push(IndexerEffect::SetSafeHeight { safe_height });
    } else if safe_height > state.safe_height && !state.waiting {
        state.safe_height = safe_height;
        effects.push(IndexerEffect::SetSafeHeight { safe_height });
    }

    if state.tick_scheduled {
        state.tick_scheduled = false;
        effects.push(IndexerEffect::Tick);
    } else {
        state.status = IndexerStatus::Idle;
    }
    Ok((state, effects))
}

pub(super) fn handle_tick_failed(mut state: IndexerState, fatal: bool) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Ticking], "TickFailed")?;
    if fatal {
        state.status = IndexerStatus::Errored;
        return Ok((state, vec![]));
    }
    if state.retrying_tick {
        return Ok((state, vec![]));
    }
    state.retrying_tick = true;
    Ok((state, vec![IndexerEffect::ScheduleRetryTick]))
}

pub(super) fn handle_retry_tick(mut state: IndexerState) -> ReducerResult {
    assert_status(&state, &[IndexerStatus::Ticking], "RetryTick")?;
    state.retrying_tick = false;
    Ok((state, vec![IndexerEffect::Tick]))
}

// ─── Shared decision logic ───────────────────────────────────────────────────

/// Re-derives safe height, readiness and the next operation from the
/// current view of parents and children.
///
/// Order of effects: a lowered `SetSafeHeight` always precedes any
/// `NotifyReady`, which in turn precedes a newly started `Update`.
pub(super) fn continue_operations(mut state: IndexerState) -> ReducerResult {
    let mut effects = Vec::new();

    if state.status == IndexerStatus::Init {
        return Ok((state, effects));
    }

    let Some(parent_height) = state.parent_height() else {
        if state.waiting && state.all_children_ready() {
            state.waiting = false;
        }
        // A root holds back raises from ticks that landed while it was waiting.
        if !state.waiting && state.height > state.safe_height {
            state.safe_height = state.height;
            effects.push(IndexerEffect::SetSafeHeight {
                safe_height: state.height,
            });
        }
        return Ok((state, effects));
    };

    if parent_height < state.target_height {
        state.target_height = parent_height;
    }

    let publishable = state.target_height.min(state.height);
    if publishable < state.safe_height {
        state.safe_height = publishable;
        state.mark_children_unready();
        effects.push(IndexerEffect::SetSafeHeight {
            safe_height: publishable,
        });
    }

    if state.waiting && state.all_children_ready() {
        state.waiting = false;
    }

    if publishable > state.safe_height && !state.waiting {
        state.safe_height = publishable;
        effects.push(IndexerEffect::SetSafeHeight {
            safe_height: publishable,
        });
    }

    let consistent = match state.status {
        IndexerStatus::Idle => state.height <= state.target_height,
        IndexerStatus::Errored => true,
        _ => false,
    };
    if consistent && state.all_children_ready() {
        let parent_indices = state.waiting_parents();
        if !parent_indices.is_empty() {
            for &i in &parent_indices {
                state.parents[i].waiting = false;
            }
            effects.push(IndexerEffect::NotifyReady { parent_indices });
        }
    }

    if state.status != IndexerStatus::Idle {
        return Ok((state, effects));
    }

    if state.height > state.target_height {
        if !state.waiting {
            state.status = IndexerStatus::Invalidating;
            effects.push(IndexerEffect::Invalidate {
                target_height: state.target_height,
            });
        }
    } else if state.height < parent_height {
        state.status = IndexerStatus::Updating;
        state.target_height = parent_height;
        effects.push(IndexerEffect::Update {
            target_height: parent_height,
        });
    }

    Ok((state, effects))
}
