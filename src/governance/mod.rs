pub mod errors;
pub mod events;
pub mod proposal;
pub mod proposal_lifecycle;
pub mod types;

pub use errors::{IndexerError, IndexerResult};
pub use events::{
    EventEnvelope, GovernorEvent, ProposalCanceled, ProposalCreated, ProposalExecuted,
    ProposalQueued, VoteCast,
};
pub use proposal::{
    Account, GovernorLogRecord, Proposal, ProposalEventKind, ProposalEventRecord, ProposalState,
    Vote, VoteDirection,
};
pub use proposal_lifecycle::{HandleOutcome, ProposalTracker};
pub use types::{Address, EventPosition, ProposalId, Provenance, TxHash};
