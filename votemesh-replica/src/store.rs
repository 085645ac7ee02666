//! Poll replica store: reconciliation logic without I/O.
//!
//! The store is a pure state machine: it owns the authoritative local copy
//! of every known poll, applies local intents and remote messages under the
//! merge rules, and records which polls changed. The node orchestrator
//! handles all I/O (broadcasting, persistence) around it.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ReplicaError, ReplicaResult};
use crate::merge::{merged_poll, sanitize_votes};
use crate::templates::PollTemplate;
use votemesh_types::{
    HybridTimestamp, NodeId, Poll, PollId, PollSettings, Tally, VoteEntry, VoterId,
};

/// A vote as recorded by a replica: the voter's full selection after the
/// vote, plus the timestamp that orders it against other votes by the same
/// voter. This is everything a remote replica needs to apply the vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub poll_id: PollId,
    pub voter_id: VoterId,
    /// The option the voter acted on; for multiple-choice polls this is
    /// the toggled index, for single-choice the chosen one.
    pub option_index: usize,
    /// The voter's complete selection after this vote. Empty means every
    /// choice was retracted.
    pub selected: Vec<usize>,
    pub timestamp: HybridTimestamp,
}

/// The set of polls this node replicates, with deterministic merge rules.
pub struct PollReplicaStore {
    local_node: NodeId,
    voter_id: VoterId,
    clock: HybridTimestamp,
    polls: HashMap<PollId, Poll>,
    changed: Vec<PollId>,
}

impl PollReplicaStore {
    /// Creates an empty store voting under the local node's identity.
    #[must_use]
    pub fn new(local_node: NodeId) -> Self {
        Self {
            local_node,
            voter_id: VoterId::from(local_node),
            clock: HybridTimestamp::now(),
            polls: HashMap::new(),
            changed: Vec::new(),
        }
    }

    /// The node this store belongs to.
    #[must_use]
    pub fn local_node(&self) -> NodeId {
        self.local_node
    }

    /// The identity local votes are recorded under.
    #[must_use]
    pub fn voter_id(&self) -> VoterId {
        self.voter_id
    }

    /// Current logical clock reading.
    #[must_use]
    pub fn clock(&self) -> HybridTimestamp {
        self.clock
    }

    // ── Local intents ────────────────────────────────────────────

    /// Creates a poll with default settings. The only path that mints a
    /// poll id; remote peers never originate ids for polls they did not
    /// create.
    pub fn create_poll(
        &mut self,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> ReplicaResult<Poll> {
        self.create_poll_with_settings(question, options, PollSettings::default())
    }

    /// Creates a poll with explicit settings.
    pub fn create_poll_with_settings(
        &mut self,
        question: impl Into<String>,
        options: Vec<String>,
        settings: PollSettings,
    ) -> ReplicaResult<Poll> {
        let poll = Poll::new(question, options, self.local_node)?.with_settings(settings);
        self.polls.insert(poll.id, poll.clone());
        self.mark_changed(poll.id);
        debug!("Created poll {} with {} options", poll.id, poll.options.len());
        Ok(poll)
    }

    /// Instantiates a template through the normal creation path: fresh id,
    /// same validation.
    pub fn create_poll_from_template(&mut self, template: &PollTemplate) -> ReplicaResult<Poll> {
        self.create_poll_with_settings(
            template.question.clone(),
            template.options.clone(),
            template.settings,
        )
    }

    /// Records a vote cast on this node.
    ///
    /// Rejects an unknown poll or out-of-range index. Single-choice polls
    /// replace the voter's previous entry; multiple-choice polls toggle
    /// the index in the voter's selection set. Returns the record the
    /// caller must broadcast.
    pub fn record_local_vote(
        &mut self,
        poll_id: PollId,
        voter_id: VoterId,
        option_index: usize,
    ) -> ReplicaResult<VoteRecord> {
        let poll = self
            .polls
            .get_mut(&poll_id)
            .ok_or(ReplicaError::UnknownPoll(poll_id))?;
        poll.check_option(option_index)?;

        self.clock = self.clock.tick();
        let timestamp = self.clock;

        let selection = if poll.settings.multiple_choice {
            let mut current = poll
                .votes
                .get(&voter_id)
                .map(|entry| entry.selected.clone())
                .unwrap_or_default();
            match current.iter().position(|&index| index == option_index) {
                Some(position) => {
                    current.remove(position);
                }
                None => current.push(option_index),
            }
            current
        } else {
            vec![option_index]
        };

        let entry = VoteEntry::new(selection, timestamp);
        let selected = entry.selected.clone();
        poll.votes.insert(voter_id, entry);

        self.mark_changed(poll_id);
        Ok(VoteRecord {
            poll_id,
            voter_id,
            option_index,
            selected,
            timestamp,
        })
    }

    // ── Remote applies ───────────────────────────────────────────

    /// Applies a poll snapshot received from a peer.
    ///
    /// An unknown id is adopted after structural validation; a known id is
    /// merged field-wise. Applying an identical snapshot twice is a no-op.
    /// Returns whether local state changed.
    pub fn apply_remote_poll(&mut self, incoming: Poll) -> ReplicaResult<bool> {
        incoming.validate()?;
        let id = incoming.id;
        let newest_vote = incoming.votes.values().map(|entry| entry.timestamp).max();

        let changed = match self.polls.get(&id) {
            None => {
                let mut adopted = incoming;
                adopted.votes = sanitize_votes(adopted.votes, adopted.options.len());
                self.polls.insert(id, adopted);
                debug!("Adopted poll {} from remote snapshot", id);
                true
            }
            Some(current) => {
                let merged = merged_poll(current, &incoming);
                if merged == *current {
                    false
                } else {
                    self.polls.insert(id, merged);
                    true
                }
            }
        };

        if let Some(ts) = newest_vote {
            self.clock = self.clock.receive(&ts);
        }
        if changed {
            self.mark_changed(id);
        }
        Ok(changed)
    }

    /// Applies a vote received from a peer.
    ///
    /// A vote for an unknown poll is ignored, not an error; the sync loop
    /// will pull the poll eventually. A vote whose timestamp is older than
    /// or equal to the voter's stored timestamp is dropped, which makes
    /// replayed and reordered deliveries safe. Returns whether local state
    /// changed, so the caller can decide to relay.
    pub fn apply_remote_vote(&mut self, vote: VoteRecord) -> ReplicaResult<bool> {
        let Some(poll) = self.polls.get_mut(&vote.poll_id) else {
            debug!("Ignoring vote for unknown poll {}", vote.poll_id);
            return Ok(false);
        };
        poll.check_option(vote.option_index)?;
        for &index in &vote.selected {
            poll.check_option(index)?;
        }

        let applied = match poll.votes.get(&vote.voter_id) {
            Some(existing) => vote.timestamp > existing.timestamp,
            None => true,
        };
        if applied {
            poll.votes
                .insert(vote.voter_id, VoteEntry::new(vote.selected, vote.timestamp));
        }

        self.clock = self.clock.receive(&vote.timestamp);
        if applied {
            self.mark_changed(vote.poll_id);
        }
        Ok(applied)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Borrowed view of a poll.
    #[must_use]
    pub fn get(&self, poll_id: &PollId) -> Option<&Poll> {
        self.polls.get(poll_id)
    }

    /// Full copy of a poll for sending to a peer; `None` is the explicit
    /// "not found" a requester falls back to the directory on.
    #[must_use]
    pub fn snapshot(&self, poll_id: &PollId) -> Option<Poll> {
        self.polls.get(poll_id).cloned()
    }

    /// Per-option counts for a poll.
    pub fn tally(&self, poll_id: &PollId) -> ReplicaResult<Tally> {
        self.polls
            .get(poll_id)
            .map(Poll::tally)
            .ok_or(ReplicaError::UnknownPoll(*poll_id))
    }

    #[must_use]
    pub fn contains(&self, poll_id: &PollId) -> bool {
        self.polls.contains_key(poll_id)
    }

    /// Ids of every replicated poll, for sync-request advertising.
    #[must_use]
    pub fn poll_ids(&self) -> Vec<PollId> {
        self.polls.keys().copied().collect()
    }

    /// Snapshots of every replicated poll. Over-sending is safe because
    /// the receiving side's merge is idempotent.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Poll> {
        self.polls.values().cloned().collect()
    }

    /// Of the ids a peer declared, the ones this replica does not hold.
    #[must_use]
    pub fn unknown_ids(&self, declared: &[PollId]) -> Vec<PollId> {
        declared
            .iter()
            .filter(|id| !self.polls.contains_key(id))
            .copied()
            .collect()
    }

    /// Snapshots of the polls this node created, for directory
    /// re-advertising.
    #[must_use]
    pub fn local_polls(&self) -> Vec<Poll> {
        self.polls
            .values()
            .filter(|poll| poll.creator_id == self.local_node)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.polls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    /// Drains the ids of polls changed since the last call. The caller
    /// turns these into change notifications.
    pub fn take_changes(&mut self) -> Vec<PollId> {
        std::mem::take(&mut self.changed)
    }

    fn mark_changed(&mut self, poll_id: PollId) {
        if !self.changed.contains(&poll_id) {
            self.changed.push(poll_id);
        }
    }
}
