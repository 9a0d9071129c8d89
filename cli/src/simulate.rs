//! `chainsync simulate` — run a small in-memory graph end to end.
//!
//! ```text
//! head (root, ticks) ──► transfers (one record per height)
//!                            └──► balances (multi-configuration: USDC, WETH)
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chainsync_core::store::{load_typed_configurations, save_typed_configurations};
use chainsync_core::{
    Configuration, GraphHandle, Height, Indexer, IndexerBuilder, IndexerError, IndexerGraph,
    IndexerState, IndexerStatus, MaxHeight, MultiIndexer, MultiIndexerAdapter,
    RemovalConfiguration, RetryConfig, SafeHeightManager, SavedConfiguration,
    UpdateConfiguration,
};
use chainsync_storage::{InMemoryStorage, StoredRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const TRANSFERS: &str = "transfers";
const BALANCES: &str = "balances";
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub head: Height,
    pub batch: Height,
    pub rollback: Option<Height>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            head: 500,
            batch: 100,
            rollback: None,
        }
    }
}

impl Options {
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut options = Self::default();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let value = iter
                .next()
                .with_context(|| format!("{flag} needs a value"))?;
            let value: Height = value
                .parse()
                .with_context(|| format!("{flag} expects an integer, got '{value}'"))?;
            match flag.as_str() {
                "--head" => options.head = value,
                "--batch" => options.batch = value,
                "--rollback" => options.rollback = Some(value),
                other => bail!("unknown option {other}"),
            }
        }
        if options.head < 0 || options.batch < 1 {
            bail!("--head must be >= 0 and --batch >= 1");
        }
        if let Some(rollback) = options.rollback {
            if !(0..options.head).contains(&rollback) {
                bail!("--rollback must lie in [0, {})", options.head);
            }
        }
        Ok(options)
    }
}

// ─── Indexers ────────────────────────────────────────────────────────────────

struct ChainHead {
    head: AtomicI64,
}

#[async_trait]
impl Indexer for ChainHead {
    async fn update(&self, _current: Height, target: Height) -> Result<Height, IndexerError> {
        Ok(target)
    }

    async fn invalidate(&self, target: Height) -> Result<Height, IndexerError> {
        Ok(target)
    }

    async fn tick(&self) -> Result<Height, IndexerError> {
        Ok(self.head.load(Ordering::SeqCst))
    }
}

/// Writes one record per height, at most `batch` heights per call.
struct Transfers {
    storage: Arc<InMemoryStorage>,
    safe_height: SafeHeightManager,
    batch: Height,
}

#[async_trait]
impl Indexer for Transfers {
    async fn update(&self, current: Height, target: Height) -> Result<Height, IndexerError> {
        let end = target.min(current.saturating_add(self.batch));
        for height in current + 1..=end {
            self.storage.insert_record(StoredRecord {
                indexer_id: TRANSFERS.into(),
                configuration_id: None,
                height,
                payload: serde_json::json!({ "block": height }),
            });
        }
        debug!(from = current + 1, to = end, "Transfers written");
        Ok(end)
    }

    async fn invalidate(&self, target: Height) -> Result<Height, IndexerError> {
        let removed = self.storage.rollback_after(TRANSFERS, target);
        info!(target, removed, "Transfers rolled back");
        Ok(target)
    }

    async fn get_safe_height(&self) -> Result<Option<Height>, IndexerError> {
        self.safe_height.load().await
    }

    async fn set_safe_height(&self, height: Height) -> Result<(), IndexerError> {
        self.safe_height.save(height).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Token {
    symbol: String,
}

/// Tracks a balance snapshot per token, each token over its own height window.
struct Balances {
    storage: Arc<InMemoryStorage>,
}

#[async_trait]
impl MultiIndexer<Token> for Balances {
    async fn multi_initialize(&self) -> Result<Vec<SavedConfiguration<Token>>, IndexerError> {
        load_typed_configurations(&*self.storage, BALANCES).await
    }

    async fn multi_update(
        &self,
        current: Height,
        target: Height,
        configurations: &[UpdateConfiguration<Token>],
    ) -> Result<Height, IndexerError> {
        for configuration in configurations.iter().filter(|c| !c.has_data) {
            let first = (current + 1).max(configuration.min_height);
            let last = configuration.max_height.min_with(target);
            for height in first..=last {
                self.storage.insert_record(StoredRecord {
                    indexer_id: BALANCES.into(),
                    configuration_id: Some(configuration.id.clone()),
                    height,
                    payload: serde_json::json!({ "token": configuration.properties.symbol }),
                });
            }
        }
        Ok(target)
    }

    async fn remove_data(&self, removals: &[RemovalConfiguration]) -> Result<(), IndexerError> {
        for removal in removals {
            let removed = self.storage.remove_configuration_range(
                BALANCES,
                &removal.id,
                removal.from_height,
                removal.to_height,
            );
            debug!(configuration = %removal.id, removed, "Balance snapshots removed");
        }
        Ok(())
    }

    async fn save_configurations(
        &self,
        configurations: &[SavedConfiguration<Token>],
    ) -> Result<(), IndexerError> {
        save_typed_configurations(&*self.storage, BALANCES, configurations).await
    }
}

fn token_configurations() -> Vec<Configuration<Token>> {
    vec![
        Configuration::new(
            "usdc",
            Token {
                symbol: "USDC".into(),
            },
            0,
            MaxHeight::Unbounded,
        ),
        Configuration::new(
            "weth",
            Token {
                symbol: "WETH".into(),
            },
            120,
            MaxHeight::Finite(400),
        ),
    ]
}

// ─── Run ─────────────────────────────────────────────────────────────────────

pub async fn run(options: Options) -> anyhow::Result<()> {
    let storage = Arc::new(InMemoryStorage::new());
    let root = Arc::new(ChainHead {
        head: AtomicI64::new(options.head),
    });
    let transfers = Arc::new(Transfers {
        storage: storage.clone(),
        safe_height: SafeHeightManager::new(storage.clone(), TRANSFERS),
        batch: options.batch,
    });
    let balances = Arc::new(MultiIndexerAdapter::new(
        Balances {
            storage: storage.clone(),
        },
        token_configurations(),
    )?);

    let retry = RetryConfig::exponential(5, 100);
    let mut graph = IndexerGraph::new();
    let head = graph.add_root(root.clone(), IndexerBuilder::new().id("head").retry(retry.clone()).build_config());
    let child = graph.add_child(
        transfers,
        IndexerBuilder::new().id(TRANSFERS).retry(retry.clone()).build_config(),
        &[head],
    )?;
    graph.add_child(
        balances.clone(),
        IndexerBuilder::new().id(BALANCES).retry(retry).build_config(),
        &[child],
    )?;
    let running = graph.start();
    let root_handle = running
        .get(head)
        .context("root handle missing")?
        .clone();

    root_handle.request_tick()?;
    settle(&running, options.head).await?;
    println!("Synced to {}:", options.head);
    report(&running, &storage);

    if let Some(rollback) = options.rollback {
        root.head.store(rollback, Ordering::SeqCst);
        root_handle.request_tick()?;
        settle(&running, rollback).await?;
        println!("Rolled back to {rollback}:");
        report(&running, &storage);
    }

    let persisted = SafeHeightManager::new(storage.clone(), TRANSFERS).load().await?;
    println!(
        "Persisted safe height ({TRANSFERS}): {}",
        persisted.map_or_else(|| "none".to_string(), |h| h.to_string())
    );
    for saved in balances.saved_configurations().await {
        println!(
            "Configuration {} ({}): {}",
            saved.id,
            saved.properties.symbol,
            saved
                .current_height
                .map_or_else(|| "not synced".to_string(), |h| h.to_string())
        );
    }

    running.shutdown();
    Ok(())
}

async fn settle(running: &GraphHandle, height: Height) -> anyhow::Result<Vec<IndexerState>> {
    let states = tokio::time::timeout(
        SETTLE_TIMEOUT,
        running.wait_all(|s| s.status == IndexerStatus::Idle && s.height == height && !s.waiting),
    )
    .await
    .with_context(|| format!("graph did not settle at height {height}"))??;
    Ok(states)
}

fn report(running: &GraphHandle, storage: &InMemoryStorage) {
    for handle in running.handles() {
        let state = handle.state();
        println!(
            "  {:<10} status={} height={} safe={} records={}",
            handle.name(),
            state.status,
            state.height,
            state.safe_height,
            storage.record_count(handle.name()),
        );
    }
}
