//! Configuration reconciliation.
//!
//! Compares the configurations an indexer should serve now against what was
//! persisted on the previous run and derives the data to delete, the
//! progress to keep and the height the indexer as a whole may resume from.

use std::collections::{HashMap, HashSet};

use crate::error::IndexerError;
use crate::height::{min_of, Height, MaxHeight};

use super::types::{Configuration, RemovalConfiguration, SavedConfiguration};

/// Result of [`diff_configurations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDiff<T> {
    /// Data ranges that are no longer covered by any configuration.
    pub to_remove: Vec<RemovalConfiguration>,
    /// New persisted state, one entry per actual configuration, in input order.
    pub to_save: Vec<SavedConfiguration<T>>,
    /// Least progress over every configuration that still has work to do.
    pub safe_height: MaxHeight,
}

/// Rejects duplicate ids and inverted ranges.
pub fn validate_configurations<T>(configurations: &[Configuration<T>]) -> Result<(), IndexerError> {
    let mut seen = HashSet::new();
    for configuration in configurations {
        if !seen.insert(configuration.id.as_str()) {
            return Err(IndexerError::DuplicateConfiguration {
                id: configuration.id.clone(),
            });
        }
        if configuration.max_height < configuration.min_height {
            return Err(IndexerError::InvalidConfigurationRange {
                id: configuration.id.clone(),
                min_height: configuration.min_height,
                max_height: configuration.max_height,
            });
        }
    }
    Ok(())
}

pub fn diff_configurations<T: Clone, S>(
    actual: &[Configuration<T>],
    saved: &[SavedConfiguration<S>],
) -> Result<ConfigurationDiff<T>, IndexerError> {
    validate_configurations(actual)?;

    let actual_ids: HashSet<&str> = actual.iter().map(|c| c.id.as_str()).collect();
    let saved_by_id: HashMap<&str, &SavedConfiguration<S>> =
        saved.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut to_remove = Vec::new();
    let mut push_removal = |id: &str, from: Height, to: Height| {
        if from <= to {
            to_remove.push(RemovalConfiguration::new(id, from, to));
        }
    };

    for stored in saved {
        if actual_ids.contains(stored.id.as_str()) {
            continue;
        }
        if let Some(current) = stored.current_height {
            push_removal(&stored.id, stored.min_height, current);
        }
    }

    let mut to_save = Vec::with_capacity(actual.len());
    for configuration in actual {
        let stored = saved_by_id.get(configuration.id.as_str());
        let mut current = stored.and_then(|s| s.current_height);

        if let (Some(stored), Some(progress)) = (stored, current) {
            if configuration.min_height > stored.min_height {
                // Data below the new start goes; whatever remains is contiguous.
                push_removal(
                    &configuration.id,
                    stored.min_height,
                    progress.min(configuration.min_height - 1),
                );
                if progress < configuration.min_height {
                    current = None;
                }
            } else if configuration.min_height < stored.min_height {
                // A single cursor cannot describe data starting above the new
                // minimum, so the whole history is re-synced.
                push_removal(&configuration.id, stored.min_height, progress);
                current = None;
            }
        }

        if let (Some(progress), MaxHeight::Finite(max)) = (current, configuration.max_height) {
            if progress > max {
                push_removal(&configuration.id, max + 1, progress);
                current = Some(max);
            }
        }

        to_save.push(SavedConfiguration::from_configuration(
            configuration.clone(),
            current,
        ));
    }

    let safe_height = min_of(to_save.iter().filter_map(|s| match s.current_height {
        None => Some(s.min_height.saturating_sub(1)),
        Some(_) if s.is_exhausted() => None,
        Some(current) => Some(current),
    }));

    Ok(ConfigurationDiff {
        to_remove,
        to_save,
        safe_height,
    })
}
