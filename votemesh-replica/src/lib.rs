//! Replicated poll state for VoteMesh.
//!
//! The reconciliation core of the mesh: [`PollReplicaStore`] holds every
//! poll a node knows about and applies local intents and remote messages
//! under deterministic merge rules (earlier creation wins immutable
//! fields, last-writer-wins per voter for votes). Applies are idempotent
//! and commutative, so replicas converge regardless of delivery order.
//!
//! Also here: poll templates, derived voting trends, and the persistence
//! collaborator trait the node layer saves through.

mod analytics;
mod error;
mod merge;
mod persistence;
mod store;
mod templates;

pub use analytics::{vote_trends, AnalyticsRecord, VoteTrends, TREND_INTERVAL_MS};
pub use error::{ReplicaError, ReplicaResult};
pub use persistence::{memory::MemoryPersistence, PersistenceError, PersistenceResult, PollPersistence};
pub use store::{PollReplicaStore, VoteRecord};
pub use templates::{
    builtin_templates, PollTemplate, TemplateCatalog, CUSTOM_TEMPLATE_PREFIX,
};
