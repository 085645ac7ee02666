//! Error types for the replica layer.

use thiserror::Error;
use votemesh_types::PollId;

/// Result type for replica operations.
pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// Errors that can occur in replica operations.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// The poll id is not known to this replica.
    #[error("unknown poll: {0}")]
    UnknownPoll(PollId),

    /// The input failed validation (empty question, too few options,
    /// out-of-range vote index).
    #[error("invalid poll data: {0}")]
    Invalid(#[from] votemesh_types::Error),

    /// No template registered under the given id.
    #[error("unknown template: {0}")]
    UnknownTemplate(String),
}
