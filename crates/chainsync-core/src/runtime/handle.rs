use futures::future::try_join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::IndexerError;
use crate::reducer::{IndexerEvent, IndexerState, IndexerStatus};

use super::graph::NodeId;
use super::node::Message;

/// Observes and pokes one running indexer.
#[derive(Clone)]
pub struct IndexerHandle {
    id: NodeId,
    name: String,
    inbox: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<IndexerState>,
}

impl IndexerHandle {
    pub(crate) fn new(
        id: NodeId,
        name: String,
        inbox: mpsc::UnboundedSender<Message>,
        state: watch::Receiver<IndexerState>,
    ) -> Self {
        Self {
            id,
            name,
            inbox,
            state,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest published state.
    pub fn state(&self) -> IndexerState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> IndexerStatus {
        self.state.borrow().status
    }

    /// A receiver notified after every processed event.
    pub fn subscribe(&self) -> watch::Receiver<IndexerState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<IndexerState, IndexerError>
    where
        F: FnMut(&IndexerState) -> bool,
    {
        let mut receiver = self.state.clone();
        let state = receiver
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| IndexerError::Aborted {
                reason: format!("indexer '{}' stopped", self.name),
            })?;
        Ok(state.clone())
    }

    /// Ask a root to tick. Requests made while a tick is running are coalesced.
    pub fn request_tick(&self) -> Result<(), IndexerError> {
        self.inbox
            .send(Message::Event(IndexerEvent::RequestTick))
            .map_err(|_| IndexerError::Aborted {
                reason: format!("indexer '{}' stopped", self.name),
            })
    }
}

/// Owns the control loops of a started graph.
pub struct GraphHandle {
    handles: Vec<IndexerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl GraphHandle {
    pub(crate) fn new(handles: Vec<IndexerHandle>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { handles, tasks }
    }

    pub fn get(&self, id: NodeId) -> Option<&IndexerHandle> {
        self.handles.get(id.index())
    }

    pub fn handles(&self) -> &[IndexerHandle] {
        &self.handles
    }

    /// Wait until every node's published state satisfies `predicate`.
    ///
    /// States are returned in node order.
    pub async fn wait_all<F>(&self, predicate: F) -> Result<Vec<IndexerState>, IndexerError>
    where
        F: Fn(&IndexerState) -> bool,
    {
        try_join_all(self.handles.iter().map(|h| h.wait_until(&predicate))).await
    }

    /// Stop every control loop together with its retry timers and ticker.
    /// Operations already handed to an indexer run to completion but their
    /// results are discarded.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!(indexers = self.tasks.len(), "Indexer graph stopped");
    }
}
