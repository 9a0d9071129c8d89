#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chainsync_core::{Height, IndexerError, IndexerHandle, IndexerState, MaxHeight};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Ordered record of side effects across every indexer in a test graph.
#[derive(Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("journal has no '{entry}': {:?}", self.entries()))
    }
}

/// A root whose head is set by the test.
pub struct HeadSource {
    pub head: AtomicI64,
    pub ticks: AtomicU32,
    journal: Arc<Journal>,
}

impl HeadSource {
    pub fn new(head: Height, journal: Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            head: AtomicI64::new(head),
            ticks: AtomicU32::new(0),
            journal,
        })
    }

    pub fn set_head(&self, head: Height) {
        self.head.store(head, Ordering::SeqCst);
    }
}

#[async_trait]
impl chainsync_core::Indexer for HeadSource {
    async fn update(&self, _current: Height, target: Height) -> Result<Height, IndexerError> {
        Ok(target)
    }

    async fn invalidate(&self, target: Height) -> Result<Height, IndexerError> {
        Ok(target)
    }

    async fn tick(&self) -> Result<Height, IndexerError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn set_safe_height(&self, height: Height) -> Result<(), IndexerError> {
        self.journal.push(format!("root:safe:{height}"));
        Ok(())
    }
}

/// A child that "syncs" instantly, optionally failing a number of times first.
pub struct Follower {
    name: &'static str,
    journal: Arc<Journal>,
    pub height: AtomicI64,
    failures_left: AtomicU32,
    bad_result: bool,
    pub update_calls: Mutex<Vec<Instant>>,
    max_step: Option<Height>,
    delay: Option<Duration>,
}

impl Follower {
    pub fn new(name: &'static str, journal: Arc<Journal>) -> Self {
        Self {
            name,
            journal,
            height: AtomicI64::new(0),
            failures_left: AtomicU32::new(0),
            bad_result: false,
            update_calls: Mutex::new(Vec::new()),
            max_step: None,
            delay: None,
        }
    }

    pub fn failing(mut self, times: u32) -> Self {
        self.failures_left = AtomicU32::new(times);
        self
    }

    /// Report one block past the requested target.
    pub fn overshooting(mut self) -> Self {
        self.bad_result = true;
        self
    }

    /// Sync at most `step` heights per call.
    pub fn stepping(mut self, step: Height) -> Self {
        self.max_step = Some(step);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_gaps_ms(&self) -> Vec<u128> {
        self.update_calls
            .lock()
            .unwrap()
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect()
    }
}

#[async_trait]
impl chainsync_core::Indexer for Follower {
    async fn update(&self, current: Height, target: Height) -> Result<Height, IndexerError> {
        self.update_calls.lock().unwrap().push(Instant::now());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(IndexerError::Source("connection reset".into()));
        }
        if self.bad_result {
            return Ok(target + 1);
        }
        let reached = match self.max_step {
            Some(step) => (current + step).min(target),
            None => target,
        };
        self.height.store(reached, Ordering::SeqCst);
        Ok(reached)
    }

    async fn invalidate(&self, target: Height) -> Result<Height, IndexerError> {
        self.height.fetch_min(target, Ordering::SeqCst);
        self.journal.push(format!("{}:invalidate:{target}", self.name));
        Ok(target)
    }

    async fn set_safe_height(&self, height: Height) -> Result<(), IndexerError> {
        self.journal.push(format!("{}:safe:{height}", self.name));
        Ok(())
    }
}

/// A child whose `initialize` blocks until released and then fails.
pub struct BlockedStart {
    pub release: Notify,
}

impl BlockedStart {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl chainsync_core::Indexer for BlockedStart {
    async fn initialize(&self) -> Result<MaxHeight, IndexerError> {
        self.release.notified().await;
        Err(IndexerError::Storage("database unavailable".into()))
    }

    async fn update(&self, _current: Height, target: Height) -> Result<Height, IndexerError> {
        Ok(target)
    }

    async fn invalidate(&self, target: Height) -> Result<Height, IndexerError> {
        Ok(target)
    }
}

/// A root that reports an unbounded local height.
pub struct UnboundedSource;

#[async_trait]
impl chainsync_core::Indexer for UnboundedSource {
    async fn initialize(&self) -> Result<MaxHeight, IndexerError> {
        Ok(MaxHeight::Unbounded)
    }

    async fn update(&self, _current: Height, target: Height) -> Result<Height, IndexerError> {
        Ok(target)
    }

    async fn invalidate(&self, target: Height) -> Result<Height, IndexerError> {
        Ok(target)
    }
}

pub async fn settle<F>(handle: &IndexerHandle, predicate: F) -> IndexerState
where
    F: FnMut(&IndexerState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), handle.wait_until(predicate))
        .await
        .expect("indexer did not settle in time")
        .expect("indexer stopped")
}
