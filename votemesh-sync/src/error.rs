//! Error types for the mesh and sync layer.

use thiserror::Error;
use votemesh_replica::ReplicaError;
use votemesh_types::{NodeId, PollId};

/// Result type for mesh and sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in mesh and sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The replica rejected the operation.
    #[error("replica error: {0}")]
    Replica(#[from] ReplicaError),

    /// Peer not known to the transport or mesh.
    #[error("peer not found: {0}")]
    PeerNotFound(NodeId),

    /// Neither a peer nor the directory produced the poll; retry later.
    #[error("poll not found: {0}")]
    PollNotFound(PollId),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The node event loop is not running.
    #[error("node is not running")]
    NotRunning,
}
