//! Replica reconciliation over the mesh.
//!
//! The coordinator produces and consumes envelopes and tracks in-flight
//! poll fetches; it does no I/O of its own. The node loop moves the
//! envelopes and owns the timers, handing the coordinator an [`Instant`]
//! wherever a deadline matters.
//!
//! Reconciliation is deliberately conservative: a sync response carries
//! every snapshot the responder holds, and the requester's merge discards
//! whatever it already has. Redundant snapshots cost bandwidth, not
//! correctness.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::protocol::{
    Envelope, ErrorMessage, RequestPollMessage, SyncRequestMessage, SyncResponseMessage,
};
use votemesh_replica::PollReplicaStore;
use votemesh_types::{Poll, PollId};

/// Sync tuning. Defaults match the production mesh.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often the periodic reconciliation round runs, in milliseconds.
    pub sync_interval_ms: u64,
    /// How long a poll fetch waits for a peer before falling back to the
    /// directory, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 30_000,
            request_timeout_ms: 5_000,
        }
    }
}

/// One in-flight poll fetch and everyone waiting on it.
struct PendingFetch {
    deadline: Instant,
    waiters: Vec<oneshot::Sender<SyncResult<Poll>>>,
}

/// Reconciles the local replica against peers.
pub struct SyncCoordinator {
    config: SyncConfig,
    pending: HashMap<PollId, PendingFetch>,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ── Message producers ────────────────────────────────────────────

    /// The reconciliation probe, broadcast periodically and whenever a
    /// link opens.
    pub fn make_sync_request(&self, replica: &PollReplicaStore) -> Envelope {
        Envelope::SyncRequest(SyncRequestMessage {
            known_poll_ids: replica.poll_ids(),
        })
    }

    // ── Message handlers ─────────────────────────────────────────────

    /// Answers a reconciliation probe: every snapshot we hold, plus a
    /// reverse `REQUEST_POLL` for each declared id we lack.
    pub fn handle_sync_request(
        &self,
        request: &SyncRequestMessage,
        replica: &PollReplicaStore,
    ) -> Vec<Envelope> {
        let mut replies = vec![Envelope::SyncResponse(SyncResponseMessage {
            polls: replica.snapshots(),
        })];
        for poll_id in replica.unknown_ids(&request.known_poll_ids) {
            debug!("Sync peer holds unknown poll {}, requesting it", poll_id);
            replies.push(Envelope::RequestPoll(RequestPollMessage { poll_id }));
        }
        replies
    }

    /// Merges every snapshot in a sync response, resolving any fetches
    /// they answer. Invalid snapshots are skipped. Returns how many polls
    /// changed locally.
    pub fn handle_sync_response(
        &mut self,
        response: SyncResponseMessage,
        replica: &mut PollReplicaStore,
    ) -> usize {
        let mut changed = 0;
        for poll in response.polls {
            let poll_id = poll.id;
            match replica.apply_remote_poll(poll) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Skipping invalid snapshot for {}: {}", poll_id, e);
                    continue;
                }
            }
            self.resolve_fetch(&poll_id, replica);
        }
        changed
    }

    /// Answers a poll request with the snapshot, or an explicit error the
    /// requester can surface.
    pub fn handle_request_poll(
        &self,
        request: &RequestPollMessage,
        replica: &PollReplicaStore,
    ) -> Envelope {
        match replica.snapshot(&request.poll_id) {
            Some(poll) => Envelope::PollSnapshot(poll),
            None => Envelope::Error(ErrorMessage::poll_not_found(&request.poll_id)),
        }
    }

    /// Merges a single snapshot, resolving any fetch waiting on it.
    /// Returns whether local state changed.
    pub fn handle_poll_snapshot(
        &mut self,
        poll: Poll,
        replica: &mut PollReplicaStore,
    ) -> SyncResult<bool> {
        let poll_id = poll.id;
        let changed = replica.apply_remote_poll(poll)?;
        self.resolve_fetch(&poll_id, replica);
        Ok(changed)
    }

    // ── Poll fetches ─────────────────────────────────────────────────

    /// Starts or joins a fetch for a poll.
    ///
    /// A locally held poll resolves the waiter immediately. Otherwise the
    /// waiter parks until a snapshot arrives or the deadline passes, and
    /// the returned request must be broadcast; `None` means no new
    /// request needs to go out.
    pub fn begin_fetch(
        &mut self,
        poll_id: PollId,
        waiter: Option<oneshot::Sender<SyncResult<Poll>>>,
        replica: &PollReplicaStore,
        now: Instant,
    ) -> Option<Envelope> {
        if let Some(poll) = replica.snapshot(&poll_id) {
            if let Some(waiter) = waiter {
                let _ = waiter.send(Ok(poll));
            }
            return None;
        }

        if let Some(fetch) = self.pending.get_mut(&poll_id) {
            if let Some(waiter) = waiter {
                fetch.waiters.push(waiter);
            }
            return None;
        }

        debug!("Requesting poll {} from peers", poll_id);
        let deadline = now + Duration::from_millis(self.config.request_timeout_ms);
        self.pending.insert(
            poll_id,
            PendingFetch {
                deadline,
                waiters: waiter.into_iter().collect(),
            },
        );
        Some(Envelope::RequestPoll(RequestPollMessage { poll_id }))
    }

    /// The soonest fetch deadline, for the owner's timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|fetch| fetch.deadline).min()
    }

    /// Ids whose fetch deadline has passed.
    pub fn expired_fetches(&self, now: Instant) -> Vec<PollId> {
        self.pending
            .iter()
            .filter(|(_, fetch)| fetch.deadline <= now)
            .map(|(poll_id, _)| *poll_id)
            .collect()
    }

    /// Abandons a fetch, handing its waiters back to the caller for the
    /// directory fallback.
    pub fn take_fetch(
        &mut self,
        poll_id: &PollId,
    ) -> Option<Vec<oneshot::Sender<SyncResult<Poll>>>> {
        self.pending.remove(poll_id).map(|fetch| fetch.waiters)
    }

    /// Number of fetches still waiting on an answer.
    pub fn pending_fetches(&self) -> usize {
        self.pending.len()
    }

    fn resolve_fetch(&mut self, poll_id: &PollId, replica: &PollReplicaStore) {
        if !self.pending.contains_key(poll_id) {
            return;
        }
        let Some(poll) = replica.snapshot(poll_id) else {
            return;
        };
        if let Some(fetch) = self.pending.remove(poll_id) {
            debug!("Fetch for {} resolved by a peer", poll_id);
            for waiter in fetch.waiters {
                let _ = waiter.send(Ok(poll.clone()));
            }
        }
    }
}
