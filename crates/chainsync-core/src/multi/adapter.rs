//! Runs a [`MultiIndexer`] as a plain [`Indexer`].

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::IndexerError;
use crate::height::{Height, MaxHeight};
use crate::indexer::Indexer;

use super::diff::{diff_configurations, validate_configurations};
use super::ranges::{find_range, to_ranges};
use super::types::{
    Configuration, ConfigurationRange, RemovalConfiguration, SavedConfiguration,
    UpdateConfiguration,
};

/// An indexer that serves many independently ranged configurations with one
/// shared height cursor.
///
/// Implementations only see the configurations relevant to each call; range
/// lookup, progress bookkeeping and cleanup are done by [`MultiIndexerAdapter`].
#[async_trait]
pub trait MultiIndexer<T: Send + Sync + 'static>: Send + Sync {
    /// Load the configurations persisted by the previous run.
    async fn multi_initialize(&self) -> Result<Vec<SavedConfiguration<T>>, IndexerError>;

    /// Sync `(current, target]` for `configurations`.
    ///
    /// Must return a height in `[current, target]`.
    async fn multi_update(
        &self,
        current: Height,
        target: Height,
        configurations: &[UpdateConfiguration<T>],
    ) -> Result<Height, IndexerError>;

    /// Delete previously synced data, both bounds inclusive.
    async fn remove_data(&self, removals: &[RemovalConfiguration]) -> Result<(), IndexerError>;

    /// Persist configurations together with their progress.
    async fn save_configurations(
        &self,
        configurations: &[SavedConfiguration<T>],
    ) -> Result<(), IndexerError>;

    async fn set_safe_height(&self, _height: Height) -> Result<(), IndexerError> {
        Ok(())
    }
}

struct AdapterState<T> {
    saved: Vec<SavedConfiguration<T>>,
    /// Height reported by `initialize`, until the first invalidation consumes it.
    initial_height: Option<MaxHeight>,
}

pub struct MultiIndexerAdapter<T, M> {
    inner: M,
    configurations: Vec<Configuration<T>>,
    ranges: Vec<ConfigurationRange<T>>,
    state: Mutex<AdapterState<T>>,
}

impl<T, M> MultiIndexerAdapter<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: MultiIndexer<T>,
{
    pub fn new(inner: M, configurations: Vec<Configuration<T>>) -> Result<Self, IndexerError> {
        validate_configurations(&configurations)?;
        let ranges = to_ranges(&configurations);
        Ok(Self {
            inner,
            configurations,
            ranges,
            state: Mutex::new(AdapterState {
                saved: Vec::new(),
                initial_height: None,
            }),
        })
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn ranges(&self) -> &[ConfigurationRange<T>] {
        &self.ranges
    }

    /// Current per-configuration progress.
    pub async fn saved_configurations(&self) -> Vec<SavedConfiguration<T>> {
        self.state.lock().await.saved.clone()
    }
}

fn progress_of<T>(saved: &[SavedConfiguration<T>], id: &str) -> Result<Option<Height>, IndexerError> {
    saved
        .iter()
        .find(|s| s.id == id)
        .map(|s| s.current_height)
        .ok_or_else(|| IndexerError::UnknownConfiguration { id: id.to_string() })
}

#[async_trait]
impl<T, M> Indexer for MultiIndexerAdapter<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: MultiIndexer<T>,
{
    async fn initialize(&self) -> Result<MaxHeight, IndexerError> {
        let previous = self.inner.multi_initialize().await?;
        let diff = diff_configurations(&self.configurations, &previous)?;

        if !diff.to_remove.is_empty() {
            warn!(
                removals = diff.to_remove.len(),
                "Configurations changed, removing stale data"
            );
            self.inner.remove_data(&diff.to_remove).await?;
        }
        self.inner.save_configurations(&diff.to_save).await?;

        info!(
            configurations = diff.to_save.len(),
            safe_height = %diff.safe_height,
            "Multi-indexer initialized"
        );
        let mut state = self.state.lock().await;
        state.saved = diff.to_save;
        state.initial_height = Some(diff.safe_height);
        Ok(diff.safe_height)
    }

    async fn update(&self, current: Height, target: Height) -> Result<Height, IndexerError> {
        let next = current.saturating_add(1);
        let range = find_range(&self.ranges, next).ok_or(IndexerError::MissingRange { height: next })?;

        if range.configurations.is_empty() {
            let skipped = range.to.min_with(target);
            debug!(current, skipped, "No configurations in range, skipping");
            return Ok(skipped);
        }

        let mut state = self.state.lock().await;

        let mut adjusted = range.to.min_with(target);
        let mut configurations = Vec::with_capacity(range.configurations.len());
        for configuration in &range.configurations {
            let progress = progress_of(&state.saved, &configuration.id)?;
            let has_data = match progress {
                Some(p) if p > current => {
                    adjusted = adjusted.min(p);
                    true
                }
                _ => false,
            };
            configurations.push(UpdateConfiguration {
                id: configuration.id.clone(),
                properties: configuration.properties.clone(),
                min_height: configuration.min_height,
                max_height: configuration.max_height,
                has_data,
            });
        }

        let new_height = self
            .inner
            .multi_update(current, adjusted, &configurations)
            .await?;
        if new_height < current || new_height > adjusted {
            return Err(IndexerError::HeightOutOfRange {
                current,
                target: adjusted,
                returned: new_height,
            });
        }

        for saved in state
            .saved
            .iter_mut()
            .filter(|s| range.configurations.iter().any(|c| c.id == s.id))
        {
            if new_height >= saved.min_height {
                saved.current_height = Some(saved.current_height.map_or(new_height, |p| p.max(new_height)));
            }
        }
        self.inner.save_configurations(&state.saved).await?;
        debug!(current, target = adjusted, new_height, "Multi-update finished");
        Ok(new_height)
    }

    async fn invalidate(&self, target: Height) -> Result<Height, IndexerError> {
        let mut state = self.state.lock().await;

        if let Some(initial) = state.initial_height.take() {
            if initial == target {
                debug!(target, "Initial invalidation keeps configuration progress");
                return Ok(target);
            }
        }

        let mut removals = Vec::new();
        for saved in state.saved.iter_mut() {
            let Some(current) = saved.current_height else {
                continue;
            };
            if current <= target {
                continue;
            }
            let from = target.saturating_add(1).max(saved.min_height);
            if from <= current {
                removals.push(RemovalConfiguration::new(saved.id.clone(), from, current));
            }
            saved.current_height = (target >= saved.min_height).then_some(target);
        }

        if !removals.is_empty() {
            info!(target, removals = removals.len(), "Removing data above target");
            self.inner.remove_data(&removals).await?;
        }
        self.inner.save_configurations(&state.saved).await?;
        Ok(target)
    }

    async fn set_safe_height(&self, height: Height) -> Result<(), IndexerError> {
        self.inner.set_safe_height(height).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    /// Records every call; returns `target` from `multi_update` unless told otherwise.
    #[derive(Default)]
    struct Recorder {
        persisted: Vec<SavedConfiguration<()>>,
        update_calls: StdMutex<Vec<(Height, Height, Vec<(String, bool)>)>>,
        removals: StdMutex<Vec<RemovalConfiguration>>,
        saves: StdMutex<Vec<Vec<SavedConfiguration<()>>>>,
        fixed_result: Option<Height>,
    }

    #[async_trait]
    impl MultiIndexer<()> for Recorder {
        async fn multi_initialize(&self) -> Result<Vec<SavedConfiguration<()>>, IndexerError> {
            Ok(self.persisted.clone())
        }

        async fn multi_update(
            &self,
            current: Height,
            target: Height,
            configurations: &[UpdateConfiguration<()>],
        ) -> Result<Height, IndexerError> {
            let flags = configurations.iter().map(|c| (c.id.clone(), c.has_data)).collect();
            self.update_calls.lock().unwrap().push((current, target, flags));
            Ok(self.fixed_result.unwrap_or(target))
        }

        async fn remove_data(&self, removals: &[RemovalConfiguration]) -> Result<(), IndexerError> {
            self.removals.lock().unwrap().extend_from_slice(removals);
            Ok(())
        }

        async fn save_configurations(
            &self,
            configurations: &[SavedConfiguration<()>],
        ) -> Result<(), IndexerError> {
            self.saves.lock().unwrap().push(configurations.to_vec());
            Ok(())
        }
    }

    fn saved(id: &str, min: Height, current: Option<Height>) -> SavedConfiguration<()> {
        SavedConfiguration {
            id: id.into(),
            properties: (),
            min_height: min,
            max_height: MaxHeight::Unbounded,
            current_height: current,
        }
    }

    #[tokio::test]
    async fn update_is_bounded_to_one_segment() {
        let adapter = MultiIndexerAdapter::new(
            Recorder::default(),
            vec![
                Configuration::new("a", (), 100, MaxHeight::Finite(300)),
                Configuration::new("b", (), 200, MaxHeight::Unbounded),
            ],
        )
        .unwrap();
        assert_eq!(adapter.initialize().await.unwrap(), MaxHeight::Finite(99));
        adapter.invalidate(99).await.unwrap();

        assert_eq!(adapter.update(99, 1_000).await.unwrap(), 199);
        assert_eq!(adapter.update(199, 1_000).await.unwrap(), 300);
        assert_eq!(adapter.update(300, 1_000).await.unwrap(), 1_000);

        let calls = adapter.inner().update_calls.lock().unwrap().clone();
        assert_eq!(calls[0], (99, 199, vec![("a".into(), false)]));
        assert_eq!(
            calls[1],
            (199, 300, vec![("a".into(), false), ("b".into(), false)])
        );
        assert_eq!(calls[2], (300, 1_000, vec![("b".into(), false)]));

        let progress = adapter.saved_configurations().await;
        assert_eq!(progress[0].current_height, Some(300));
        assert_eq!(progress[1].current_height, Some(1_000));
    }

    #[tokio::test]
    async fn empty_segment_is_skipped_without_calling_inner() {
        let adapter = MultiIndexerAdapter::new(
            Recorder::default(),
            vec![Configuration::new("a", (), 500, MaxHeight::Unbounded)],
        )
        .unwrap();
        adapter.initialize().await.unwrap();
        assert_eq!(adapter.update(0, 1_000).await.unwrap(), 499);
        assert!(adapter.inner().update_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn new_configuration_reuses_existing_data() {
        let recorder = Recorder {
            persisted: vec![saved("a", 0, Some(500))],
            ..Default::default()
        };
        let adapter = MultiIndexerAdapter::new(
            recorder,
            vec![
                Configuration::new("a", (), 0, MaxHeight::Unbounded),
                Configuration::new("b", (), 100, MaxHeight::Unbounded),
            ],
        )
        .unwrap();

        assert_eq!(adapter.initialize().await.unwrap(), MaxHeight::Finite(99));
        adapter.invalidate(99).await.unwrap();
        assert!(adapter.inner().removals.lock().unwrap().is_empty());

        assert_eq!(adapter.update(99, 800).await.unwrap(), 500);
        assert_eq!(adapter.update(500, 800).await.unwrap(), 800);

        let calls = adapter.inner().update_calls.lock().unwrap().clone();
        assert_eq!(
            calls[0],
            (99, 500, vec![("a".into(), true), ("b".into(), false)])
        );
        assert_eq!(
            calls[1],
            (500, 800, vec![("a".into(), false), ("b".into(), false)])
        );
    }

    #[tokio::test]
    async fn invalidate_removes_data_above_target() {
        let recorder = Recorder {
            persisted: vec![saved("a", 0, Some(500)), saved("b", 300, Some(500))],
            ..Default::default()
        };
        let adapter = MultiIndexerAdapter::new(
            recorder,
            vec![
                Configuration::new("a", (), 0, MaxHeight::Unbounded),
                Configuration::new("b", (), 300, MaxHeight::Unbounded),
            ],
        )
        .unwrap();
        assert_eq!(adapter.initialize().await.unwrap(), MaxHeight::Finite(500));

        assert_eq!(adapter.invalidate(200).await.unwrap(), 200);
        assert_eq!(
            *adapter.inner().removals.lock().unwrap(),
            vec![
                RemovalConfiguration::new("a", 201, 500),
                RemovalConfiguration::new("b", 300, 500),
            ]
        );
        let progress = adapter.saved_configurations().await;
        assert_eq!(progress[0].current_height, Some(200));
        assert_eq!(progress[1].current_height, None);
    }

    #[tokio::test]
    async fn update_below_current_is_a_protocol_error() {
        let adapter = MultiIndexerAdapter::new(
            Recorder {
                fixed_result: Some(50),
                ..Default::default()
            },
            vec![Configuration::new("a", (), 0, MaxHeight::Unbounded)],
        )
        .unwrap();
        adapter.initialize().await.unwrap();

        let err = adapter.update(100, 200).await.unwrap_err();
        assert!(matches!(
            err,
            IndexerError::HeightOutOfRange {
                current: 100,
                target: 200,
                returned: 50
            }
        ));
        assert!(err.is_protocol_violation());
        assert_eq!(adapter.saved_configurations().await[0].current_height, None);
    }

    #[tokio::test]
    async fn update_above_target_is_a_protocol_error() {
        let adapter = MultiIndexerAdapter::new(
            Recorder {
                fixed_result: Some(250),
                ..Default::default()
            },
            vec![Configuration::new("a", (), 0, MaxHeight::Unbounded)],
        )
        .unwrap();
        adapter.initialize().await.unwrap();
        assert!(adapter.update(100, 200).await.unwrap_err().is_protocol_violation());
    }

    #[test]
    fn duplicate_configurations_rejected_on_construction() {
        let result = MultiIndexerAdapter::new(
            Recorder::default(),
            vec![
                Configuration::new("a", (), 0, MaxHeight::Unbounded),
                Configuration::new("a", (), 5, MaxHeight::Unbounded),
            ],
        );
        assert!(matches!(
            result,
            Err(IndexerError::DuplicateConfiguration { .. })
        ));
    }
}
