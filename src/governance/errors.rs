//! Error types for event handling
//!
//! Every variant is a per-event failure. The caller decides whether to
//! skip the event, fix the feed and retry, or stop indexing.

use crate::governance::types::ProposalId;
use crate::storage::errors::StorageError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexerError {
    /// A second ProposalCreated for an id that already exists
    #[error("Proposal {proposal_id} already exists")]
    DuplicateProposal { proposal_id: ProposalId },

    /// An event references a proposal that was never created
    #[error("Proposal {proposal_id} not found; creation event missing or out of order")]
    UnknownProposal { proposal_id: ProposalId },

    /// Support code outside {0, 1, 2} under the strict policy
    #[error("Malformed support code {support} on vote for proposal {proposal_id}")]
    MalformedSupportCode { proposal_id: ProposalId, support: u8 },

    /// Event arrived behind the cursor, or its position was already used by another transaction
    #[error("Ordering violation at event {event_id}: {details}")]
    OrderingViolation { event_id: String, details: String },

    /// A weight tally or the vote count no longer fits
    #[error("Vote tally overflow on proposal {proposal_id}")]
    TallyOverflow { proposal_id: ProposalId },

    /// Malformed address, transaction hash or proposal id
    #[error("Invalid {kind}: '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },

    /// Storage-related error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type IndexerResult<T> = Result<T, IndexerError>;
