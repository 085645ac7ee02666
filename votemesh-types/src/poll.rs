//! The replicated poll model.
//!
//! A poll's vote state is a map from voter identity to that voter's current
//! choice, not a counter. Counters cannot be merged safely when replicas
//! disagree; the per-voter map can, and the tally is recomputed from it on
//! demand.

use crate::timestamp::wall_now;
use crate::{Error, HybridTimestamp, NodeId, PollId, Result, VoterId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-poll behavior switches, fixed at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollSettings {
    /// Voters may select several options; repeating a choice deselects it.
    pub multiple_choice: bool,
    /// Presentation hint only; replication ignores it.
    pub hide_results: bool,
}

/// One voter's current choice and the timestamp it was made at.
///
/// `selected` holds option indexes, sorted and deduplicated. An empty
/// selection means the voter retracted every choice; the entry stays in the
/// map so the retraction wins over older votes during merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteEntry {
    pub selected: Vec<usize>,
    pub timestamp: HybridTimestamp,
}

impl VoteEntry {
    /// Creates an entry, normalizing the selection to sorted unique indexes.
    #[must_use]
    pub fn new(mut selected: Vec<usize>, timestamp: HybridTimestamp) -> Self {
        selected.sort_unstable();
        selected.dedup();
        Self {
            selected,
            timestamp,
        }
    }

    /// Creates an entry holding exactly one choice.
    #[must_use]
    pub fn single(option: usize, timestamp: HybridTimestamp) -> Self {
        Self {
            selected: vec![option],
            timestamp,
        }
    }

    /// True when the voter has no current choice.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// A poll as replicated across the mesh.
///
/// `id`, `question`, `options`, `created_at`, `creator_id` and `settings`
/// are immutable after creation; only `votes` changes, and only through the
/// merge rules in the replica store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub options: Vec<String>,
    /// Creation wall time, milliseconds since the Unix epoch.
    pub created_at: u64,
    pub creator_id: NodeId,
    #[serde(default)]
    pub settings: PollSettings,
    #[serde(default)]
    pub votes: HashMap<VoterId, VoteEntry>,
}

impl Poll {
    /// Creates a poll with a fresh id and an empty vote map.
    ///
    /// The only path that mints a poll id. Fails on an empty question or
    /// fewer than two options.
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        creator_id: NodeId,
    ) -> Result<Self> {
        let poll = Self {
            id: PollId::new(),
            question: question.into(),
            options,
            created_at: wall_now(),
            creator_id,
            settings: PollSettings::default(),
            votes: HashMap::new(),
        };
        poll.check_shape()?;
        Ok(poll)
    }

    /// Replaces the default settings. Intended for use at creation time.
    #[must_use]
    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    fn check_shape(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(Error::EmptyQuestion);
        }
        if self.options.len() < 2 {
            return Err(Error::TooFewOptions(self.options.len()));
        }
        Ok(())
    }

    /// Checks that `index` names one of this poll's options.
    pub fn check_option(&self, index: usize) -> Result<()> {
        if index >= self.options.len() {
            return Err(Error::OptionOutOfRange {
                index,
                option_count: self.options.len(),
            });
        }
        Ok(())
    }

    /// Structural validation for polls received off the wire: shape plus
    /// every recorded vote index in range.
    pub fn validate(&self) -> Result<()> {
        self.check_shape()?;
        for entry in self.votes.values() {
            for &index in &entry.selected {
                self.check_option(index)?;
            }
        }
        Ok(())
    }

    /// True if `voter` has a non-empty recorded choice.
    #[must_use]
    pub fn has_voted(&self, voter: &VoterId) -> bool {
        self.votes.get(voter).is_some_and(|e| !e.is_empty())
    }

    /// Derives the per-option tally by scanning the vote map.
    #[must_use]
    pub fn tally(&self) -> Tally {
        let mut counts = vec![0usize; self.options.len()];
        let mut total_voters = 0usize;
        for entry in self.votes.values() {
            if entry.is_empty() {
                continue;
            }
            total_voters += 1;
            for &index in &entry.selected {
                if let Some(count) = counts.get_mut(index) {
                    *count += 1;
                }
            }
        }
        Tally {
            counts,
            total_voters,
        }
    }
}

/// Derived per-option vote counts. Recomputed from the vote map on demand,
/// never stored as independent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    /// Count per option index, same length as the poll's option list.
    pub counts: Vec<usize>,
    /// Number of distinct voters with at least one selected option.
    pub total_voters: usize,
}

impl Tally {
    /// Percentage of voters who chose `index`; 0.0 when nobody has voted.
    #[must_use]
    pub fn percentage(&self, index: usize) -> f64 {
        if self.total_voters == 0 {
            return 0.0;
        }
        match self.counts.get(index) {
            Some(&count) => count as f64 * 100.0 / self.total_voters as f64,
            None => 0.0,
        }
    }
}
