//! Derived voting trends.
//!
//! Everything here is recomputed from a poll's current vote entries.
//! Trends are handed to the persistence collaborator as opaque records;
//! they never feed back into replication.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use votemesh_types::{Poll, PollId};

/// Width of a trend bucket: five minutes.
pub const TREND_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Aggregate view of how voting on one poll developed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTrends {
    /// Distinct voters with a current choice.
    pub total_votes: usize,
    /// Votes per option index.
    pub voting_pattern: Vec<usize>,
    /// Vote count per absolute five-minute window, keyed by the window's
    /// start in epoch milliseconds.
    pub time_intervals: BTreeMap<u64, usize>,
    /// Mean gap between consecutive votes; 0 with fewer than two votes.
    pub average_response_ms: f64,
}

/// Computes trends from a poll's current vote entries.
#[must_use]
pub fn vote_trends(poll: &Poll) -> VoteTrends {
    let tally = poll.tally();

    let mut stamps: Vec<u64> = poll
        .votes
        .values()
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.timestamp.wall_time())
        .collect();
    stamps.sort_unstable();

    let mut time_intervals = BTreeMap::new();
    for &stamp in &stamps {
        let window = (stamp / TREND_INTERVAL_MS) * TREND_INTERVAL_MS;
        *time_intervals.entry(window).or_insert(0) += 1;
    }

    let average_response_ms = if stamps.len() < 2 {
        0.0
    } else {
        let total_gap: u64 = stamps.windows(2).map(|pair| pair[1] - pair[0]).sum();
        total_gap as f64 / (stamps.len() - 1) as f64
    };

    VoteTrends {
        total_votes: tally.total_voters,
        voting_pattern: tally.counts,
        time_intervals,
        average_response_ms,
    }
}

/// A point-in-time trends capture for the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    pub poll_id: PollId,
    /// Capture wall time, epoch milliseconds.
    pub recorded_at: u64,
    pub trends: VoteTrends,
}

impl AnalyticsRecord {
    /// Captures the poll's trends as of now.
    #[must_use]
    pub fn capture(poll: &Poll) -> Self {
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64;
        Self {
            poll_id: poll.id,
            recorded_at,
            trends: vote_trends(poll),
        }
    }
}
