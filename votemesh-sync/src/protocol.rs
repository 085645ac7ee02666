//! Wire protocol envelopes.
//!
//! Every frame on a peer link is one JSON envelope `{type, payload}` with a
//! SCREAMING_SNAKE_CASE type tag and camelCase payload fields. Envelopes
//! are self-contained and replay-safe: the replica's merge rules make
//! applying the same envelope twice a no-op, so links may conservatively
//! re-send anything.

use serde::{Deserialize, Serialize};
use votemesh_replica::VoteRecord;
use votemesh_types::{HybridTimestamp, Poll, PollId, VoterId};

/// A mesh protocol envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    /// Ask a peer for its copy of one poll.
    RequestPoll(RequestPollMessage),

    /// A full poll snapshot, broadcast on create or sent in reply.
    PollSnapshot(Poll),

    /// One voter's current choice.
    Vote(VoteMessage),

    /// Reconciliation probe carrying the sender's known poll ids.
    SyncRequest(SyncRequestMessage),

    /// Snapshots the responder holds, sent in reply to a sync request.
    SyncResponse(SyncResponseMessage),

    /// Explicit failure reply (e.g. unknown poll).
    Error(ErrorMessage),
}

impl Envelope {
    /// The wire type tag, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::RequestPoll(_) => "REQUEST_POLL",
            Envelope::PollSnapshot(_) => "POLL_SNAPSHOT",
            Envelope::Vote(_) => "VOTE",
            Envelope::SyncRequest(_) => "SYNC_REQUEST",
            Envelope::SyncResponse(_) => "SYNC_RESPONSE",
            Envelope::Error(_) => "ERROR",
        }
    }
}

/// Payload of `REQUEST_POLL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPollMessage {
    /// The poll being asked for.
    pub poll_id: PollId,
}

/// Payload of `VOTE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteMessage {
    pub poll_id: PollId,
    pub voter_id: VoterId,
    /// The option the voter acted on.
    pub option_index: usize,
    /// The voter's complete selection after the vote. Senders that predate
    /// multiple-choice polls omit it; it then defaults to `[option_index]`.
    /// An explicit empty list is a full retraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<Vec<usize>>,
    pub timestamp: HybridTimestamp,
}

impl VoteMessage {
    /// Builds the wire form of a recorded vote.
    #[must_use]
    pub fn from_record(record: &VoteRecord) -> Self {
        Self {
            poll_id: record.poll_id,
            voter_id: record.voter_id,
            option_index: record.option_index,
            selected: Some(record.selected.clone()),
            timestamp: record.timestamp,
        }
    }

    /// Converts back into the replica's vote form.
    #[must_use]
    pub fn into_record(self) -> VoteRecord {
        let selected = self
            .selected
            .unwrap_or_else(|| vec![self.option_index]);
        VoteRecord {
            poll_id: self.poll_id,
            voter_id: self.voter_id,
            option_index: self.option_index,
            selected,
            timestamp: self.timestamp,
        }
    }
}

/// Payload of `SYNC_REQUEST`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestMessage {
    /// Poll ids the sender already holds a replica of.
    pub known_poll_ids: Vec<PollId>,
}

/// Payload of `SYNC_RESPONSE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponseMessage {
    /// Full snapshots for every poll the responder holds. Over-sending is
    /// deliberate: staleness is unknown at this layer and the merge is
    /// idempotent.
    pub polls: Vec<Poll>,
}

/// Payload of `ERROR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorMessage {
    /// Creates a new error message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The requested poll is not held by this peer.
    #[must_use]
    pub fn poll_not_found(id: &PollId) -> Self {
        Self::new("POLL_NOT_FOUND", format!("poll not found: {id}"))
    }
}
