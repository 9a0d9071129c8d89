//! DAG wiring.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. A child can
//! only name parents that already exist, so cycles cannot be expressed.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::error::IndexerError;
use crate::indexer::{Indexer, IndexerConfig};
use crate::reducer::IndexerState;

use super::handle::{GraphHandle, IndexerHandle};
use super::node::{Link, Node};

/// Stable index of a node inside an [`IndexerGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct NodeSpec {
    indexer: Arc<dyn Indexer>,
    config: IndexerConfig,
    parents: Vec<NodeId>,
}

/// Builder for a graph of indexers.
#[derive(Default)]
pub struct IndexerGraph {
    nodes: Vec<NodeSpec>,
}

impl IndexerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node without parents. Roots produce heights by ticking.
    pub fn add_root<I>(&mut self, indexer: Arc<I>, config: IndexerConfig) -> NodeId
    where
        I: Indexer + 'static,
    {
        self.push(indexer, config, Vec::new())
    }

    /// Add a node that follows `parents`.
    pub fn add_child<I>(
        &mut self,
        indexer: Arc<I>,
        config: IndexerConfig,
        parents: &[NodeId],
    ) -> Result<NodeId, IndexerError>
    where
        I: Indexer + 'static,
    {
        if parents.is_empty() {
            return Err(IndexerError::Other(format!(
                "indexer '{}' was added as a child without parents",
                config.id
            )));
        }
        if let Some(unknown) = parents.iter().find(|p| p.0 >= self.nodes.len()) {
            return Err(IndexerError::UnknownParent { index: unknown.0 });
        }
        Ok(self.push(indexer, config, parents.to_vec()))
    }

    fn push<I>(&mut self, indexer: Arc<I>, config: IndexerConfig, parents: Vec<NodeId>) -> NodeId
    where
        I: Indexer + 'static,
    {
        let id = NodeId(self.nodes.len());
        let indexer: Arc<dyn Indexer> = indexer;
        self.nodes.push(NodeSpec {
            indexer,
            config,
            parents,
        });
        id
    }

    /// Spawn one control loop per node. Must be called inside a tokio runtime.
    pub fn start(self) -> GraphHandle {
        let count = self.nodes.len();
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..count).map(|_| mpsc::unbounded_channel()).unzip();

        // Each link carries the receiver's slot for the sender.
        let mut parent_links: Vec<Vec<Link>> = vec![Vec::new(); count];
        let mut child_links: Vec<Vec<Link>> = vec![Vec::new(); count];
        for (child, spec) in self.nodes.iter().enumerate() {
            for (slot, parent) in spec.parents.iter().enumerate() {
                parent_links[child].push(Link {
                    inbox: senders[parent.0].clone(),
                    index: child_links[parent.0].len(),
                });
                child_links[parent.0].push(Link {
                    inbox: senders[child].clone(),
                    index: slot,
                });
            }
        }

        let mut handles = Vec::with_capacity(count);
        let mut tasks = Vec::with_capacity(count);
        let wiring = self
            .nodes
            .into_iter()
            .zip(receivers)
            .zip(parent_links.into_iter().zip(child_links));
        for (index, ((spec, inbox), (parents, children))) in wiring.enumerate() {
            let (published, observed) = watch::channel(IndexerState::new(parents.len()));
            handles.push(IndexerHandle::new(
                NodeId(index),
                spec.config.id.clone(),
                senders[index].clone(),
                observed,
            ));
            let node = Node::new(
                spec.indexer,
                spec.config,
                parents,
                children,
                inbox,
                senders[index].clone(),
                published,
            );
            tasks.push(tokio::spawn(node.run()));
        }

        tracing::info!(indexers = count, "Indexer graph started");
        GraphHandle::new(handles, tasks)
    }
}
