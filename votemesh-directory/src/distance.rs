//! XOR distance metric over the 128-bit node id keyspace.
//!
//! `d(a, b) = a XOR b`, compared as an unsigned integer. Symmetric, zero
//! only for identical ids, and unidirectional: for a fixed target, every
//! candidate id has a distinct distance.

use std::cmp::Ordering;
use std::fmt;

use votemesh_types::NodeId;

/// XOR distance between two node ids. Smaller means closer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Distance(u128);

impl Distance {
    /// Zero distance (same id).
    pub const ZERO: Self = Self(0);

    /// Maximum possible distance (all bits differ).
    pub const MAX: Self = Self(u128::MAX);

    /// Calculates the XOR distance between two ids.
    #[must_use]
    pub fn between(a: &NodeId, b: &NodeId) -> Self {
        Self(a.raw() ^ b.raw())
    }

    /// Returns the raw 128-bit distance value.
    #[must_use]
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Number of leading zero bits; 128 for identical ids. Higher means
    /// a longer shared prefix with the target.
    #[must_use]
    pub const fn leading_zeros(&self) -> u32 {
        self.0.leading_zeros()
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({:032x})", self.0)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}
