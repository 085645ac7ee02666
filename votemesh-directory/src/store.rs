//! The TTL'd key-value store backing discovery.
//!
//! Keys are poll ids (value: full poll snapshot) or node ids (value: route
//! info). Writes are last-store-wins at this layer; poll-level conflict
//! resolution happens in the replica store, one layer up.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::now_millis;
use crate::routing::{RoutingEntry, RoutingTable, K};
use votemesh_types::{NodeId, Poll, PollId};

/// Directory tuning. Defaults match the production mesh: entries live one
/// hour, sweeps run every five minutes.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryConfig {
    /// How long a stored entry (and a routing entry) stays valid.
    pub entry_ttl_ms: u64,
    /// How often the owning loop should call `sweep`.
    pub sweep_interval_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            entry_ttl_ms: 3_600_000,
            sweep_interval_ms: 300_000,
        }
    }
}

/// What a directory entry is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryKey {
    Poll(PollId),
    Node(NodeId),
}

/// How to reach a node, as advertised by the node itself or a bootstrap
/// list. The address format is owned by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    pub node_id: NodeId,
    pub address: String,
}

/// What a directory entry holds.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryValue {
    PollSnapshot(Poll),
    NodeRoute(RouteInfo),
}

/// A stored value plus when it was stored, epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub value: DirectoryValue,
    pub stored_at: u64,
}

/// A node's local view of the discovery keyspace.
///
/// Owns its entries and routing table exclusively; values cross the API
/// boundary by clone. Expired entries are invisible to `get` immediately
/// and physically removed by `sweep`.
#[derive(Debug, Clone)]
pub struct KeyValueDirectory {
    config: DirectoryConfig,
    entries: HashMap<DirectoryKey, DirectoryEntry>,
    routing: RoutingTable,
}

impl KeyValueDirectory {
    /// Creates an empty directory anchored to the local node id.
    #[must_use]
    pub fn new(local_id: NodeId, config: DirectoryConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            routing: RoutingTable::new(local_id, config.entry_ttl_ms),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Upserts `{value, stored_at: now}` with the current clock.
    pub fn store(&mut self, key: DirectoryKey, value: DirectoryValue) {
        self.store_at(key, value, now_millis());
    }

    /// Upserts `{value, stored_at: now}`, overwriting any prior entry for
    /// `key` unconditionally. Storing a route also records the node as a
    /// live routing peer.
    pub fn store_at(&mut self, key: DirectoryKey, value: DirectoryValue, now: u64) {
        if let DirectoryValue::NodeRoute(route) = &value {
            self.routing.record_at(route.node_id, now);
        }
        self.entries.insert(
            key,
            DirectoryEntry {
                value,
                stored_at: now,
            },
        );
    }

    /// Looks up `key` with the current clock.
    #[must_use]
    pub fn get(&self, key: &DirectoryKey) -> Option<DirectoryValue> {
        self.get_at(key, now_millis())
    }

    /// Returns the stored value only while `now - stored_at < TTL`. An
    /// expired entry reads as absent; physical removal is `sweep`'s job.
    #[must_use]
    pub fn get_at(&self, key: &DirectoryKey, now: u64) -> Option<DirectoryValue> {
        let entry = self.entries.get(key)?;
        if now.saturating_sub(entry.stored_at) < self.config.entry_ttl_ms {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Stores a poll snapshot under its own id.
    pub fn publish_poll(&mut self, poll: Poll) {
        self.store(DirectoryKey::Poll(poll.id), DirectoryValue::PollSnapshot(poll));
    }

    /// Stores a node route under the node's id.
    pub fn publish_route(&mut self, route: RouteInfo) {
        self.store(
            DirectoryKey::Node(route.node_id),
            DirectoryValue::NodeRoute(route),
        );
    }

    /// Live poll snapshot for `id`, if any.
    #[must_use]
    pub fn poll(&self, id: &PollId) -> Option<Poll> {
        match self.get(&DirectoryKey::Poll(*id)) {
            Some(DirectoryValue::PollSnapshot(poll)) => Some(poll),
            _ => None,
        }
    }

    /// Live route for `node`, if any.
    #[must_use]
    pub fn route(&self, node: &NodeId) -> Option<RouteInfo> {
        match self.get(&DirectoryKey::Node(*node)) {
            Some(DirectoryValue::NodeRoute(route)) => Some(route),
            _ => None,
        }
    }

    /// The `K` live routing entries closest to `target` by XOR distance.
    #[must_use]
    pub fn find_node(&self, target: &NodeId) -> Vec<RoutingEntry> {
        self.find_node_at(target, now_millis())
    }

    /// `find_node` against an explicit clock.
    #[must_use]
    pub fn find_node_at(&self, target: &NodeId, now: u64) -> Vec<RoutingEntry> {
        self.routing.find_closest_at(target, K, now)
    }

    /// Inserts or refreshes a routing entry for a peer we discovered or
    /// heard from. Returns true if the peer was new.
    pub fn record_peer(&mut self, node_id: NodeId) -> bool {
        self.record_peer_at(node_id, now_millis())
    }

    pub fn record_peer_at(&mut self, node_id: NodeId, now: u64) -> bool {
        self.routing.record_at(node_id, now)
    }

    /// Drops a peer's routing entry, e.g. after its link closed.
    pub fn remove_peer(&mut self, node_id: &NodeId) -> bool {
        self.routing.remove(node_id)
    }

    /// Removes all value and routing entries past TTL; idempotent.
    /// Returns how many were dropped.
    pub fn sweep(&mut self) -> usize {
        self.sweep_at(now_millis())
    }

    pub fn sweep_at(&mut self, now: u64) -> usize {
        let ttl = self.config.entry_ttl_ms;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.stored_at) < ttl);
        let removed = before - self.entries.len() + self.routing.prune_at(now);
        if removed > 0 {
            debug!("Directory sweep removed {} expired entries", removed);
        }
        removed
    }

    /// Number of stored entries, including any expired but not yet swept.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of routing entries, including any expired but not yet swept.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.routing.len()
    }
}
