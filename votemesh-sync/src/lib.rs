//! Mesh networking and poll synchronization for VoteMesh.
//!
//! This crate connects a [`PollReplicaStore`](votemesh_replica) to its
//! peers and keeps replicas convergent without any central server.
//!
//! # Architecture
//!
//! - [`transport`]: the [`LinkTransport`] seam the mesh dials and
//!   accepts through, plus an in-memory implementation for tests and
//!   simulations.
//! - [`PeerLink`]: one channel to one peer, with a strict
//!   `connecting → open → closed` lifecycle.
//! - [`MeshManager`]: owns the links. Joins via bootstrap nodes,
//!   discovers further peers through the directory, enforces the peer
//!   cap and reconnect cooldowns, and fans envelopes out.
//! - [`SyncCoordinator`]: produces and consumes sync traffic, and tracks
//!   in-flight poll fetches. Responses deliberately over-send: the
//!   receiving merge discards what it already has.
//! - [`VoteMeshNode`]: the event loop owning all of the above together
//!   with the directory, replica and template catalog. Callers drive it
//!   through a [`NodeHandle`].
//!
//! # Example
//!
//! ```
//! use votemesh_sync::{MeshConfig, NodeConfig};
//!
//! let config = NodeConfig {
//!     mesh: MeshConfig {
//!         max_peers: 4,
//!         ..MeshConfig::default()
//!     },
//!     ..NodeConfig::default()
//! };
//! assert!(config.initial_poll.is_none());
//! ```

mod coordinator;
mod error;
mod link;
mod manager;
mod node;
pub mod protocol;
pub mod transport;

pub use coordinator::{SyncConfig, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use link::{LinkState, PeerLink};
pub use manager::{BootstrapNode, MeshConfig, MeshEvent, MeshManager};
pub use node::{
    create_node, create_node_with_persistence, NodeCommand, NodeConfig, NodeEvent, NodeHandle,
    SyncStatus, VoteMeshNode,
};
pub use protocol::{
    Envelope, ErrorMessage, RequestPollMessage, SyncRequestMessage, SyncResponseMessage,
    VoteMessage,
};
pub use transport::{LinkChannels, LinkTransport, FRAME_CAPACITY};
