//! Height ordering utility.
//!
//! A [`Height`] is a progress cursor on a shared axis (block number,
//! timestamp bucket, ...). It is signed so that "nothing synced yet" for a
//! range starting at `0` can be written as `-1`.
//!
//! [`MaxHeight`] extends the axis with an unbounded sentinel that compares
//! above every finite height. It is used for configuration upper bounds and
//! for "no limit" results such as the safe height of an indexer whose
//! configurations are all exhausted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A progress cursor.
pub type Height = i64;

/// A finite height, or no upper limit at all.
///
/// Variant order matters: the derived `Ord` places `Unbounded` above every
/// `Finite` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Option<Height>", into = "Option<Height>")]
pub enum MaxHeight {
    Finite(Height),
    Unbounded,
}

impl MaxHeight {
    /// Returns the finite value, or `None` when unbounded.
    pub fn as_finite(self) -> Option<Height> {
        match self {
            Self::Finite(h) => Some(h),
            Self::Unbounded => None,
        }
    }

    pub fn is_unbounded(self) -> bool {
        matches!(self, Self::Unbounded)
    }

    /// The smaller of `self` and a finite `height`.
    pub fn min_with(self, height: Height) -> Height {
        match self {
            Self::Finite(h) => h.min(height),
            Self::Unbounded => height,
        }
    }

    /// The first height past an inclusive upper bound (`max + 1`).
    pub fn next_boundary(self) -> Self {
        match self {
            Self::Finite(h) => Self::Finite(h.saturating_add(1)),
            Self::Unbounded => Self::Unbounded,
        }
    }

    /// Returns `true` if `height` does not exceed this bound.
    pub fn contains(self, height: Height) -> bool {
        match self {
            Self::Finite(h) => height <= h,
            Self::Unbounded => true,
        }
    }
}

impl Default for MaxHeight {
    fn default() -> Self {
        Self::Unbounded
    }
}

impl From<Height> for MaxHeight {
    fn from(height: Height) -> Self {
        Self::Finite(height)
    }
}

impl From<Option<Height>> for MaxHeight {
    fn from(height: Option<Height>) -> Self {
        height.map_or(Self::Unbounded, Self::Finite)
    }
}

impl From<MaxHeight> for Option<Height> {
    fn from(height: MaxHeight) -> Self {
        height.as_finite()
    }
}

impl PartialEq<Height> for MaxHeight {
    fn eq(&self, other: &Height) -> bool {
        *self == Self::Finite(*other)
    }
}

impl PartialOrd<Height> for MaxHeight {
    fn partial_cmp(&self, other: &Height) -> Option<std::cmp::Ordering> {
        Some(self.cmp(&Self::Finite(*other)))
    }
}

impl fmt::Display for MaxHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(h) => write!(f, "{h}"),
            Self::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Minimum of a sequence of bounds; `Unbounded` for an empty sequence.
pub fn min_of<I>(heights: I) -> MaxHeight
where
    I: IntoIterator,
    I::Item: Into<MaxHeight>,
{
    heights
        .into_iter()
        .map(Into::into)
        .min()
        .unwrap_or(MaxHeight::Unbounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_sorts_above_finite() {
        assert!(MaxHeight::Unbounded > MaxHeight::Finite(i64::MAX));
        assert!(MaxHeight::Finite(-1) < MaxHeight::Finite(0));
        assert!(MaxHeight::Unbounded > 1_000_000);
        assert!(MaxHeight::Finite(5) < 6);
    }

    #[test]
    fn min_with_finite() {
        assert_eq!(MaxHeight::Unbounded.min_with(42), 42);
        assert_eq!(MaxHeight::Finite(10).min_with(42), 10);
        assert_eq!(MaxHeight::Finite(50).min_with(42), 42);
    }

    #[test]
    fn min_of_sequences() {
        assert_eq!(min_of(Vec::<MaxHeight>::new()), MaxHeight::Unbounded);
        assert_eq!(min_of([5i64, 3, 9]), MaxHeight::Finite(3));
        assert_eq!(
            min_of([MaxHeight::Unbounded, MaxHeight::Finite(7)]),
            MaxHeight::Finite(7)
        );
    }

    #[test]
    fn next_boundary() {
        assert_eq!(MaxHeight::Finite(99).next_boundary(), MaxHeight::Finite(100));
        assert_eq!(MaxHeight::Unbounded.next_boundary(), MaxHeight::Unbounded);
    }

    #[test]
    fn serde_uses_null_for_unbounded() {
        assert_eq!(serde_json::to_string(&MaxHeight::Unbounded).unwrap(), "null");
        assert_eq!(serde_json::to_string(&MaxHeight::Finite(12)).unwrap(), "12");
        let parsed: MaxHeight = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, MaxHeight::Unbounded);
    }
}
