//! The per-indexer control loop.
//!
//! The loop owns the [`IndexerState`] and is the only caller of [`reduce`].
//! Long-running work (`update`, `invalidate`, `tick`, `initialize`, retry
//! timers) runs on spawned tasks that report back through the same inbox, so
//! neighbour events keep flowing while an operation is in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::error::IndexerError;
use crate::height::{Height, MaxHeight};
use crate::indexer::{Indexer, IndexerConfig};
use crate::reducer::{reduce, IndexerEffect, IndexerEvent, IndexerState};
use crate::retry::RetryStrategy;

/// Everything a control loop can receive.
#[derive(Debug)]
pub(crate) enum Message {
    /// Neighbour notifications, tick requests and retry timers.
    Event(IndexerEvent),
    Initialized(Result<MaxHeight, IndexerError>),
    Updated {
        from: Height,
        target: Height,
        result: Result<Height, IndexerError>,
    },
    Invalidated {
        target: Height,
        result: Result<Height, IndexerError>,
    },
    Ticked(Result<Height, IndexerError>),
}

/// A neighbour's inbox together with our slot index in its view.
#[derive(Clone)]
pub(crate) struct Link {
    pub(crate) inbox: mpsc::UnboundedSender<Message>,
    pub(crate) index: usize,
}

impl Link {
    fn send(&self, event: IndexerEvent) {
        // The neighbour only stops listening on shutdown.
        let _ = self.inbox.send(Message::Event(event));
    }
}

pub(crate) struct Node {
    id: String,
    indexer: Arc<dyn Indexer>,
    config: IndexerConfig,
    state: IndexerState,
    parents: Vec<Link>,
    children: Vec<Link>,
    inbox: mpsc::UnboundedReceiver<Message>,
    outbox: mpsc::UnboundedSender<Message>,
    published: watch::Sender<IndexerState>,
    update_retry: RetryStrategy,
    invalidate_retry: RetryStrategy,
    tick_retry: RetryStrategy,
    initialize_retry: RetryStrategy,
    /// Retry timers and the periodic ticker. Dropped, and so aborted, with the loop.
    timers: JoinSet<()>,
}

impl Node {
    pub(crate) fn new(
        indexer: Arc<dyn Indexer>,
        config: IndexerConfig,
        parents: Vec<Link>,
        children: Vec<Link>,
        inbox: mpsc::UnboundedReceiver<Message>,
        outbox: mpsc::UnboundedSender<Message>,
        published: watch::Sender<IndexerState>,
    ) -> Self {
        Self {
            id: config.id.clone(),
            indexer,
            state: IndexerState::new(parents.len()),
            parents,
            children,
            inbox,
            outbox,
            published,
            update_retry: RetryStrategy::new(config.update_retry.clone()),
            invalidate_retry: RetryStrategy::new(config.invalidate_retry.clone()),
            tick_retry: RetryStrategy::new(config.tick_retry.clone()),
            initialize_retry: RetryStrategy::new(config.initialize_retry.clone()),
            timers: JoinSet::new(),
            config,
        }
    }

    /// Run until the graph is shut down.
    pub(crate) async fn run(mut self) {
        tracing::info!(
            indexer = %self.id,
            parents = self.parents.len(),
            children = self.children.len(),
            "Starting indexer"
        );
        self.spawn_initialize(Duration::ZERO);
        if self.parents.is_empty() {
            if let Some(ms) = self.config.tick_interval_ms {
                self.spawn_ticker(Duration::from_millis(ms));
            }
        }

        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    let Some(message) = message else { break };
                    if let Some(event) = self.to_event(message) {
                        self.dispatch(event).await;
                    }
                }
                // Reap finished timers.
                Some(_) = self.timers.join_next(), if !self.timers.is_empty() => {}
            }
        }
    }

    /// Turn a message into a reducer event, classifying failures.
    fn to_event(&mut self, message: Message) -> Option<IndexerEvent> {
        match message {
            Message::Event(event) => Some(event),

            Message::Initialized(Ok(MaxHeight::Unbounded)) if self.parents.is_empty() => {
                tracing::error!(
                    indexer = %self.id,
                    error = %IndexerError::UnboundedRoot,
                    "Initialization failed"
                );
                Some(IndexerEvent::InitializeFailed)
            }
            Message::Initialized(Ok(safe_height)) => {
                self.initialize_retry.clear();
                tracing::info!(indexer = %self.id, %safe_height, "Initialized");
                Some(IndexerEvent::Initialized {
                    safe_height,
                    child_count: self.children.len(),
                })
            }
            Message::Initialized(Err(e)) => {
                self.initialize_retry.mark_attempt();
                if e.is_protocol_violation() || !self.initialize_retry.should_retry() {
                    tracing::error!(indexer = %self.id, error = %e, "Initialization failed");
                    return Some(IndexerEvent::InitializeFailed);
                }
                let delay = self.initialize_retry.timeout();
                tracing::warn!(
                    indexer = %self.id,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Initialization failed, retrying"
                );
                self.spawn_initialize(delay);
                None
            }

            Message::Updated {
                from,
                target,
                result,
            } => {
                let checked = result.and_then(|new_height| {
                    if (from..=target).contains(&new_height) {
                        Ok(new_height)
                    } else {
                        Err(IndexerError::HeightOutOfRange {
                            current: from,
                            target,
                            returned: new_height,
                        })
                    }
                });
                Some(match checked {
                    Ok(new_height) => {
                        self.update_retry.clear();
                        IndexerEvent::UpdateSucceeded { from, new_height }
                    }
                    Err(e) => IndexerEvent::UpdateFailed {
                        fatal: failure(&self.id, "update", &mut self.update_retry, &e),
                    },
                })
            }

            Message::Invalidated { target, result } => {
                let checked = result.and_then(|new_height| {
                    if new_height <= target {
                        Ok(new_height)
                    } else {
                        Err(IndexerError::InvalidatedAbove {
                            target,
                            returned: new_height,
                        })
                    }
                });
                Some(match checked {
                    Ok(target_height) => {
                        self.invalidate_retry.clear();
                        IndexerEvent::InvalidateSucceeded { target_height }
                    }
                    Err(e) => IndexerEvent::InvalidateFailed {
                        fatal: failure(&self.id, "invalidate", &mut self.invalidate_retry, &e),
                    },
                })
            }

            Message::Ticked(result) => Some(match result {
                Ok(safe_height) => {
                    self.tick_retry.clear();
                    IndexerEvent::TickSucceeded { safe_height }
                }
                Err(e) => IndexerEvent::TickFailed {
                    fatal: failure(&self.id, "tick", &mut self.tick_retry, &e),
                },
            }),
        }
    }

    async fn dispatch(&mut self, event: IndexerEvent) {
        let name = event.name();
        let (state, effects) = match reduce(&self.state, event) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(indexer = %self.id, event = name, error = %e, "Event rejected");
                return;
            }
        };
        if state.status != self.state.status {
            tracing::debug!(
                indexer = %self.id,
                from = %self.state.status,
                to = %state.status,
                "Status changed"
            );
        }
        self.state = state;

        for effect in effects {
            self.execute(effect).await;
        }
        self.published.send_replace(self.state.clone());
    }

    async fn execute(&mut self, effect: IndexerEffect) {
        tracing::debug!(indexer = %self.id, ?effect, "Executing effect");
        match effect {
            IndexerEffect::Update { target_height } => {
                let from = self.state.height;
                let indexer = Arc::clone(&self.indexer);
                let outbox = self.outbox.clone();
                tokio::spawn(async move {
                    let result = indexer.update(from, target_height).await;
                    let _ = outbox.send(Message::Updated {
                        from,
                        target: target_height,
                        result,
                    });
                });
            }
            IndexerEffect::Invalidate { target_height } => {
                let indexer = Arc::clone(&self.indexer);
                let outbox = self.outbox.clone();
                tokio::spawn(async move {
                    let result = indexer.invalidate(target_height).await;
                    let _ = outbox.send(Message::Invalidated {
                        target: target_height,
                        result,
                    });
                });
            }
            IndexerEffect::Tick => {
                let indexer = Arc::clone(&self.indexer);
                let outbox = self.outbox.clone();
                tokio::spawn(async move {
                    let result = indexer.tick().await;
                    let _ = outbox.send(Message::Ticked(result));
                });
            }
            IndexerEffect::SetSafeHeight { safe_height } => {
                if let Err(e) = self.indexer.set_safe_height(safe_height).await {
                    tracing::warn!(
                        indexer = %self.id,
                        safe_height,
                        error = %e,
                        "Failed to persist safe height"
                    );
                }
                tracing::info!(indexer = %self.id, safe_height, "Safe height published");
                for child in &self.children {
                    child.send(IndexerEvent::ParentUpdated {
                        index: child.index,
                        safe_height,
                    });
                }
            }
            IndexerEffect::NotifyReady { parent_indices } => {
                for i in parent_indices {
                    if let Some(parent) = self.parents.get(i) {
                        parent.send(IndexerEvent::ChildReady {
                            index: parent.index,
                        });
                    }
                }
            }
            IndexerEffect::ScheduleRetryUpdate => {
                let delay = self.update_retry.timeout();
                self.schedule(delay, IndexerEvent::RetryUpdate);
            }
            IndexerEffect::ScheduleRetryInvalidate => {
                let delay = self.invalidate_retry.timeout();
                self.schedule(delay, IndexerEvent::RetryInvalidate);
            }
            IndexerEffect::ScheduleRetryTick => {
                let delay = self.tick_retry.timeout();
                self.schedule(delay, IndexerEvent::RetryTick);
            }
        }
    }

    fn schedule(&mut self, delay: Duration, event: IndexerEvent) {
        let outbox = self.outbox.clone();
        self.timers.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = outbox.send(Message::Event(event));
        });
    }

    fn spawn_initialize(&self, delay: Duration) {
        let indexer = Arc::clone(&self.indexer);
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = indexer.initialize().await;
            let _ = outbox.send(Message::Initialized(result));
        });
    }

    fn spawn_ticker(&mut self, period: Duration) {
        let outbox = self.outbox.clone();
        self.timers.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if outbox.send(Message::Event(IndexerEvent::RequestTick)).is_err() {
                    break;
                }
            }
        });
    }
}

/// Records a failed attempt and decides whether it is fatal.
fn failure(id: &str, operation: &str, strategy: &mut RetryStrategy, error: &IndexerError) -> bool {
    if error.is_protocol_violation() {
        tracing::error!(indexer = %id, operation, error = %error, "Protocol violation");
        return true;
    }
    strategy.mark_attempt();
    if !strategy.should_retry() {
        tracing::error!(
            indexer = %id,
            operation,
            attempts = strategy.attempts(),
            error = %error,
            "Retries exhausted"
        );
        return true;
    }
    tracing::warn!(
        indexer = %id,
        operation,
        attempt = strategy.attempts(),
        delay_ms = strategy.timeout().as_millis() as u64,
        error = %error,
        "Operation failed, will retry"
    );
    false
}
