//! Persistence collaborator seam.
//!
//! The replica functions fully in memory; a backend caches polls and
//! analytics on a single device, best effort. Callers treat every method
//! as fire-and-forget: a failing backend is logged and ignored, never
//! propagated into replication.

use async_trait::async_trait;
use thiserror::Error;

use crate::analytics::AnalyticsRecord;
use votemesh_types::{Poll, PollId};

/// Errors a persistence backend can report.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Local cache backend for polls and analytics.
///
/// Implementations must tolerate repeated saves of the same poll; the
/// newest write wins.
#[async_trait]
pub trait PollPersistence: Send + Sync {
    /// Saves or replaces a poll snapshot.
    async fn save_poll(&self, poll: &Poll) -> PersistenceResult<()>;

    /// Loads a previously saved poll.
    async fn get_poll(&self, id: &PollId) -> PersistenceResult<Option<Poll>>;

    /// Appends an analytics capture.
    async fn save_analytics(&self, record: &AnalyticsRecord) -> PersistenceResult<()>;
}

/// In-memory backend for tests and persistence-free deployments.
pub mod memory {
    use super::{AnalyticsRecord, PersistenceResult, Poll, PollId, PollPersistence};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Keeps everything in process memory.
    #[derive(Default)]
    pub struct MemoryPersistence {
        polls: Mutex<HashMap<PollId, Poll>>,
        analytics: Mutex<Vec<AnalyticsRecord>>,
    }

    impl MemoryPersistence {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of distinct polls saved.
        #[must_use]
        pub fn poll_count(&self) -> usize {
            self.polls.lock().unwrap().len()
        }

        /// Number of analytics captures appended.
        #[must_use]
        pub fn analytics_count(&self) -> usize {
            self.analytics.lock().unwrap().len()
        }

        /// The analytics captures recorded for one poll, oldest first.
        #[must_use]
        pub fn analytics_for(&self, poll_id: &PollId) -> Vec<AnalyticsRecord> {
            self.analytics
                .lock()
                .unwrap()
                .iter()
                .filter(|record| record.poll_id == *poll_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl PollPersistence for MemoryPersistence {
        async fn save_poll(&self, poll: &Poll) -> PersistenceResult<()> {
            self.polls.lock().unwrap().insert(poll.id, poll.clone());
            Ok(())
        }

        async fn get_poll(&self, id: &PollId) -> PersistenceResult<Option<Poll>> {
            Ok(self.polls.lock().unwrap().get(id).cloned())
        }

        async fn save_analytics(&self, record: &AnalyticsRecord) -> PersistenceResult<()> {
            self.analytics.lock().unwrap().push(record.clone());
            Ok(())
        }
    }
}
