//! Configuration records shared by range partitioning, reconciliation and the
//! multi-configuration adapter.

use serde::{Deserialize, Serialize};

use crate::height::{Height, MaxHeight};

/// One independently ranged unit of sync work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration<T> {
    /// Stable identifier, unique within one indexer.
    pub id: String,
    /// Opaque payload handed back to the concrete indexer.
    pub properties: T,
    /// First height this configuration covers (inclusive).
    pub min_height: Height,
    /// Last height this configuration covers (inclusive).
    #[serde(default)]
    pub max_height: MaxHeight,
}

impl<T> Configuration<T> {
    pub fn new(
        id: impl Into<String>,
        properties: T,
        min_height: Height,
        max_height: MaxHeight,
    ) -> Self {
        Self {
            id: id.into(),
            properties,
            min_height,
            max_height,
        }
    }

    /// Returns `true` if `height` lies inside `[min_height, max_height]`.
    pub fn covers(&self, height: Height) -> bool {
        self.min_height <= height && self.max_height.contains(height)
    }
}

/// A configuration together with the progress persisted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedConfiguration<T> {
    pub id: String,
    pub properties: T,
    pub min_height: Height,
    #[serde(default)]
    pub max_height: MaxHeight,
    /// Last height synced for this configuration. `None` = nothing synced yet.
    pub current_height: Option<Height>,
}

impl<T> SavedConfiguration<T> {
    pub fn from_configuration(configuration: Configuration<T>, current_height: Option<Height>) -> Self {
        Self {
            id: configuration.id,
            properties: configuration.properties,
            min_height: configuration.min_height,
            max_height: configuration.max_height,
            current_height,
        }
    }

    /// Progress reached the upper bound; nothing left to sync.
    pub fn is_exhausted(&self) -> bool {
        match (self.current_height, self.max_height) {
            (Some(current), MaxHeight::Finite(max)) => current >= max,
            _ => false,
        }
    }

    /// Map the properties, keeping ranges and progress.
    pub fn map_properties<U>(self, f: impl FnOnce(T) -> U) -> SavedConfiguration<U> {
        SavedConfiguration {
            id: self.id,
            properties: f(self.properties),
            min_height: self.min_height,
            max_height: self.max_height,
            current_height: self.current_height,
        }
    }
}

/// Previously synced data that must be deleted, both bounds inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalConfiguration {
    pub id: String,
    pub from_height: Height,
    pub to_height: Height,
}

impl RemovalConfiguration {
    pub fn new(id: impl Into<String>, from_height: Height, to_height: Height) -> Self {
        Self {
            id: id.into(),
            from_height,
            to_height,
        }
    }
}

/// A configuration passed to `multi_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfiguration<T> {
    pub id: String,
    pub properties: T,
    pub min_height: Height,
    pub max_height: MaxHeight,
    /// Data for the whole requested range was already written by an earlier
    /// call; the implementation must not record it twice.
    pub has_data: bool,
}

/// A maximal height segment in which the set of active configurations is constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRange<T> {
    /// First height of the segment (inclusive).
    pub from: Height,
    /// Last height of the segment (inclusive).
    pub to: MaxHeight,
    pub configurations: Vec<Configuration<T>>,
}

impl<T> ConfigurationRange<T> {
    pub fn contains(&self, height: Height) -> bool {
        self.from <= height && self.to.contains(height)
    }
}
