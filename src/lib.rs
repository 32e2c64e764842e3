pub mod cli;
pub mod config;
pub mod governance;
pub mod report;
pub mod storage;

pub use crate::config::{ConfigError, ConfigOverrides, IndexerConfig, SupportPolicy};
pub use crate::governance::{
    EventEnvelope, GovernorEvent, HandleOutcome, IndexerError, IndexerResult, Proposal,
    ProposalId, ProposalState, ProposalTracker, Provenance, Vote,
};
pub use crate::storage::errors::{StorageError, StorageResult};
pub use crate::storage::traits::{Storage, StorageBackend, StorageExtensions};
pub use crate::storage::{FileStorage, InMemoryStorage};
