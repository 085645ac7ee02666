//! Hybrid Logical Clock timestamps for vote ordering.
//!
//! Votes from different peers arrive in arbitrary order; the per-voter
//! last-writer-wins merge needs a timestamp that is monotonic on each node
//! and totally ordered across the mesh even when wall clocks collide on the
//! same millisecond.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn wall_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_millis() as u64
}

/// A Hybrid Logical Clock timestamp.
///
/// `wall_time` is milliseconds since the Unix epoch; `logical` breaks ties
/// between events sharing a wall millisecond. Field order gives the derived
/// `Ord` the lexicographic (wall, logical) order the merge rules need.
/// Based on the HLC algorithm from "Logical Physical Clocks" (Kulkarni et
/// al.).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct HybridTimestamp {
    wall_time: u64,
    logical: u32,
}

impl HybridTimestamp {
    /// Creates a timestamp at the current wall time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            wall_time: wall_now(),
            logical: 0,
        }
    }

    /// Creates a timestamp from components.
    #[must_use]
    pub const fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    /// Returns the wall time component in milliseconds.
    #[must_use]
    pub const fn wall_time(&self) -> u64 {
        self.wall_time
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// Generates the next timestamp, strictly greater than `self`.
    ///
    /// Called when recording a new local vote.
    #[must_use]
    pub fn tick(&self) -> Self {
        Self::advance(*self, wall_now())
    }

    /// Advances this clock past a timestamp observed on the wire.
    ///
    /// The result is strictly greater than both `self` and `other`, so a
    /// vote recorded after seeing a remote vote always orders after it.
    #[must_use]
    pub fn receive(&self, other: &Self) -> Self {
        Self::advance((*self).max(*other), wall_now())
    }

    /// The smallest timestamp strictly greater than `base` that does not
    /// lag the wall clock.
    fn advance(base: Self, now: u64) -> Self {
        if now > base.wall_time {
            Self {
                wall_time: now,
                logical: 0,
            }
        } else {
            Self {
                wall_time: base.wall_time,
                logical: base.logical.saturating_add(1),
            }
        }
    }
}

impl Default for HybridTimestamp {
    fn default() -> Self {
        Self::now()
    }
}
