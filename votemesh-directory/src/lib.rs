//! Peer and poll discovery without a central registry.
//!
//! A [`KeyValueDirectory`] is each node's local view of the discovery
//! keyspace: poll snapshots and node routes stored under TTL, plus a
//! routing table ordered by XOR distance for `find_node` lookups. It is a
//! best-effort cache; losing every entry is recoverable because peers
//! re-advertise on reconnect.
//!
//! Nothing here performs I/O or keeps background tasks. Expiry is driven by
//! the caller's clock: every operation has a `*_at` variant taking an
//! explicit `now` in epoch milliseconds, and the plain variants use the
//! system clock.

mod distance;
mod routing;
mod store;

pub use distance::Distance;
pub use routing::{RoutingEntry, RoutingTable, K};
pub use store::{
    DirectoryConfig, DirectoryEntry, DirectoryKey, DirectoryValue, KeyValueDirectory, RouteInfo,
};

use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_millis() as u64
}
