//! Core type definitions for VoteMesh.
//!
//! This crate defines the fundamental types shared by every layer of the
//! mesh engine:
//! - Node, poll and voter identifiers (UUID-based)
//! - Hybrid Logical Clock timestamps for vote ordering
//! - The replicated `Poll` model and its derived tally
//!
//! Network messages, merge rules and storage live in the crates above this
//! one; nothing here performs I/O.

mod ids;
mod poll;
mod timestamp;

pub use ids::{NodeId, PollId, VoterId};
pub use poll::{Poll, PollSettings, Tally, VoteEntry};
pub use timestamp::HybridTimestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("poll question must not be empty")]
    EmptyQuestion,

    #[error("poll needs at least two options, got {0}")]
    TooFewOptions(usize),

    #[error("option index {index} out of range for {option_count} options")]
    OptionOutOfRange { index: usize, option_count: usize },
}
