//! Proximity-ordered peer lookup table.
//!
//! A flat table re-sorted by XOR distance per lookup. At browser-mesh peer
//! counts (bounded by `K`) this beats maintaining k-bucket structures;
//! revisit if the mesh ever grows past a few hundred live entries.

use std::collections::HashMap;

use crate::distance::Distance;
use crate::now_millis;
use votemesh_types::NodeId;

/// Maximum entries returned by a `find_node` lookup.
pub const K: usize = 20;

/// A known peer and when it was last seen, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    pub node_id: NodeId,
    pub last_seen: u64,
}

/// Table of known peers ordered for lookup by XOR distance.
///
/// Entries expire `ttl_ms` after their last contact. Expired entries are
/// invisible to lookups immediately and removed from the map by
/// [`RoutingTable::prune_at`].
#[derive(Debug, Clone)]
pub struct RoutingTable {
    local_id: NodeId,
    ttl_ms: u64,
    entries: HashMap<NodeId, u64>,
}

impl RoutingTable {
    /// Creates an empty table for the given local node.
    #[must_use]
    pub fn new(local_id: NodeId, ttl_ms: u64) -> Self {
        Self {
            local_id,
            ttl_ms,
            entries: HashMap::new(),
        }
    }

    /// The id lookups are anchored to; never stored in the table itself.
    #[must_use]
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Inserts or refreshes a peer with the current clock.
    /// Returns true if the peer was not previously known.
    pub fn record(&mut self, node_id: NodeId) -> bool {
        self.record_at(node_id, now_millis())
    }

    /// Inserts or refreshes a peer, `last_seen = now`. The local id is
    /// never recorded.
    pub fn record_at(&mut self, node_id: NodeId, now: u64) -> bool {
        if node_id == self.local_id {
            return false;
        }
        self.entries.insert(node_id, now).is_none()
    }

    /// Drops a peer regardless of freshness.
    pub fn remove(&mut self, node_id: &NodeId) -> bool {
        self.entries.remove(node_id).is_some()
    }

    /// True if the peer is present and not expired at `now`.
    #[must_use]
    pub fn contains_at(&self, node_id: &NodeId, now: u64) -> bool {
        self.entries
            .get(node_id)
            .is_some_and(|&last_seen| !Self::expired(last_seen, self.ttl_ms, now))
    }

    /// The `k` live entries closest to `target` by XOR distance,
    /// using the current clock.
    #[must_use]
    pub fn find_closest(&self, target: &NodeId, k: usize) -> Vec<RoutingEntry> {
        self.find_closest_at(target, k, now_millis())
    }

    /// The `k` live entries closest to `target` by XOR distance at `now`.
    ///
    /// Full sort per call; see the module docs for why that is fine here.
    #[must_use]
    pub fn find_closest_at(&self, target: &NodeId, k: usize, now: u64) -> Vec<RoutingEntry> {
        let mut live: Vec<RoutingEntry> = self
            .entries
            .iter()
            .filter(|&(_, &last_seen)| !Self::expired(last_seen, self.ttl_ms, now))
            .map(|(&node_id, &last_seen)| RoutingEntry { node_id, last_seen })
            .collect();
        live.sort_by_key(|entry| Distance::between(&entry.node_id, target));
        live.truncate(k);
        live
    }

    /// Removes every expired entry; idempotent. Returns how many were
    /// dropped.
    pub fn prune_at(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl_ms;
        self.entries
            .retain(|_, &mut last_seen| !Self::expired(last_seen, ttl, now));
        before - self.entries.len()
    }

    /// Number of entries, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expired(last_seen: u64, ttl_ms: u64, now: u64) -> bool {
        now.saturating_sub(last_seen) > ttl_ms
    }
}
