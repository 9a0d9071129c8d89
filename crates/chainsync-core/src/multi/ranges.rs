//! Range partitioning.
//!
//! Splits the whole height axis into contiguous segments so that every
//! configuration either covers a segment completely or not at all.

use std::collections::BTreeSet;

use crate::height::{Height, MaxHeight};

use super::types::{Configuration, ConfigurationRange};

/// Partition `(-inf, +inf)` at every `min_height` and every `max_height + 1`.
///
/// The result is sorted, gap-free and non-overlapping; the first segment
/// starts at `Height::MIN` and the last one is unbounded.
pub fn to_ranges<T: Clone>(configurations: &[Configuration<T>]) -> Vec<ConfigurationRange<T>> {
    let mut boundaries = BTreeSet::new();
    for configuration in configurations {
        boundaries.insert(configuration.min_height);
        if let MaxHeight::Finite(boundary) = configuration.max_height.next_boundary() {
            boundaries.insert(boundary);
        }
    }

    let mut ranges = Vec::with_capacity(boundaries.len() + 1);
    let mut from = Height::MIN;
    for boundary in boundaries {
        if boundary == Height::MIN {
            continue;
        }
        ranges.push(segment(configurations, from, MaxHeight::Finite(boundary - 1)));
        from = boundary;
    }
    ranges.push(segment(configurations, from, MaxHeight::Unbounded));
    ranges
}

fn segment<T: Clone>(
    configurations: &[Configuration<T>],
    from: Height,
    to: MaxHeight,
) -> ConfigurationRange<T> {
    let configurations = configurations
        .iter()
        .filter(|c| MaxHeight::Finite(c.min_height) <= to && c.max_height >= from)
        .cloned()
        .collect();
    ConfigurationRange {
        from,
        to,
        configurations,
    }
}

/// The segment containing `height`.
pub fn find_range<T>(ranges: &[ConfigurationRange<T>], height: Height) -> Option<&ConfigurationRange<T>> {
    ranges.iter().find(|range| range.contains(height))
}
