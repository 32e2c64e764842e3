//! Decoded governor contract events as they arrive from the feed.
//!
//! One JSON object per event:
//!
//! ```json
//! {"block_number":10,"block_timestamp":1700000000,
//!  "transaction_hash":"0x..","log_index":0,
//!  "event":{"type":"ProposalQueued","proposal_id":"0xa1","eta_seconds":3600}}
//! ```
//!
//! uint256 quantities are decimal strings. `weight` is parsed into a U256;
//! the rest (values, thresholds, delays) are carried through verbatim.

use crate::governance::types::{decimal_u256, Address, ProposalId, Provenance};
use ethnum::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalCreated {
    pub proposal_id: ProposalId,
    pub proposer: Address,
    pub targets: Vec<Address>,
    pub values: Vec<String>,
    pub signatures: Vec<String>,
    pub calldatas: Vec<String>,
    pub vote_start: u64,
    pub vote_end: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCast {
    pub voter: Address,
    pub proposal_id: ProposalId,
    /// 0 = against, 1 = for, 2 = abstain
    pub support: u8,
    #[serde(with = "decimal_u256")]
    pub weight: U256,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalQueued {
    pub proposal_id: ProposalId,
    pub eta_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalExecuted {
    pub proposal_id: ProposalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalCanceled {
    pub proposal_id: ProposalId,
}

/// Every event the governor contract emits.
///
/// The first five drive proposal state. The rest are mirrored into
/// `governor_logs` as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GovernorEvent {
    ProposalCreated(ProposalCreated),
    VoteCast(VoteCast),
    ProposalQueued(ProposalQueued),
    ProposalExecuted(ProposalExecuted),
    ProposalCanceled(ProposalCanceled),

    /// Counted by the contract like VoteCast, but only mirrored here
    VoteCastWithParams {
        voter: Address,
        proposal_id: ProposalId,
        support: u8,
        #[serde(with = "decimal_u256")]
        weight: U256,
        #[serde(default)]
        reason: String,
        params: String,
    },
    ProposalThresholdSet {
        old_proposal_threshold: String,
        new_proposal_threshold: String,
    },
    QuorumNumeratorUpdated {
        old_quorum_numerator: String,
        new_quorum_numerator: String,
    },
    TimelockChange {
        old_timelock: Address,
        new_timelock: Address,
    },
    VotingDelaySet {
        old_voting_delay: String,
        new_voting_delay: String,
    },
    VotingPeriodSet {
        old_voting_period: String,
        new_voting_period: String,
    },
    Upgraded {
        implementation: Address,
    },
    Initialized {
        version: u64,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    #[serde(rename = "EIP712DomainChanged")]
    Eip712DomainChanged,
}

impl GovernorEvent {
    /// Event name as emitted by the contract
    pub fn name(&self) -> &'static str {
        match self {
            GovernorEvent::ProposalCreated(_) => "ProposalCreated",
            GovernorEvent::VoteCast(_) => "VoteCast",
            GovernorEvent::ProposalQueued(_) => "ProposalQueued",
            GovernorEvent::ProposalExecuted(_) => "ProposalExecuted",
            GovernorEvent::ProposalCanceled(_) => "ProposalCanceled",
            GovernorEvent::VoteCastWithParams { .. } => "VoteCastWithParams",
            GovernorEvent::ProposalThresholdSet { .. } => "ProposalThresholdSet",
            GovernorEvent::QuorumNumeratorUpdated { .. } => "QuorumNumeratorUpdated",
            GovernorEvent::TimelockChange { .. } => "TimelockChange",
            GovernorEvent::VotingDelaySet { .. } => "VotingDelaySet",
            GovernorEvent::VotingPeriodSet { .. } => "VotingPeriodSet",
            GovernorEvent::Upgraded { .. } => "Upgraded",
            GovernorEvent::Initialized { .. } => "Initialized",
            GovernorEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
            GovernorEvent::Eip712DomainChanged => "EIP712DomainChanged",
        }
    }

    /// Whether the event only gets mirrored, without touching a proposal
    pub fn is_informational(&self) -> bool {
        !matches!(
            self,
            GovernorEvent::ProposalCreated(_)
                | GovernorEvent::VoteCast(_)
                | GovernorEvent::ProposalQueued(_)
                | GovernorEvent::ProposalExecuted(_)
                | GovernorEvent::ProposalCanceled(_)
        )
    }
}

/// A decoded event plus where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub provenance: Provenance,
    pub event: GovernorEvent,
}

impl EventEnvelope {
    pub fn new(provenance: Provenance, event: GovernorEvent) -> Self {
        Self { provenance, event }
    }
}
