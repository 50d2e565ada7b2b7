//! Simple id-based instantiations for in-memory models and tests.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Colors;

/// A node identified by a plain integer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct IdNode(pub u64);

impl fmt::Display for IdNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A color set represented as an explicit set of integer parameter ids.
///
/// `BTreeSet` keeps iteration (and hence `Debug` output) deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdColors(BTreeSet<u32>);

impl IdColors {
    pub fn empty() -> Self {
        IdColors(BTreeSet::new())
    }

    pub fn of(items: impl IntoIterator<Item = u32>) -> Self {
        IdColors(items.into_iter().collect())
    }

    pub fn contains(&self, color: u32) -> bool {
        self.0.contains(&color)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl Colors for IdColors {
    fn intersect(&self, other: &Self) -> Self {
        IdColors(self.0.intersection(&other.0).copied().collect())
    }

    fn union(&self, other: &Self) -> Self {
        IdColors(self.0.union(&other.0).copied().collect())
    }

    fn subtract(&self, other: &Self) -> Self {
        IdColors(self.0.difference(&other.0).copied().collect())
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The bounded color universe `{0, ..., max}` for [`IdColors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdColorSpace {
    max: u32,
}

impl IdColorSpace {
    pub fn new(max: u32) -> Self {
        IdColorSpace { max }
    }

    pub fn full_colors(&self) -> IdColors {
        IdColors::of(0..=self.max)
    }

    pub fn empty_colors(&self) -> IdColors {
        IdColors::empty()
    }

    /// Complement with respect to the universe.
    pub fn invert(&self, colors: &IdColors) -> IdColors {
        self.full_colors().subtract(colors)
    }
}
