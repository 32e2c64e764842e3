use crate::config::SupportPolicy;
use crate::governance::errors::{IndexerError, IndexerResult};
use crate::governance::events::{GovernorEvent, ProposalCreated};
use crate::governance::types::{Address, ProposalId, Provenance};
use ethnum::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle states of a governor proposal.
///
/// Only `Pending`, `Active`, `Queued` and `Executed` are assigned by the
/// event handlers (`Canceled` too when `cancel_sets_state` is on). The others
/// depend on block time and vote outcome and are left to whoever evaluates
/// the proposal off-chain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalState {
    Pending,
    Active,
    Canceled,
    Defeated,
    Succeeded,
    Queued,
    Expired,
    Executed,
}

impl ProposalState {
    pub const ALL: [ProposalState; 8] = [
        ProposalState::Pending,
        ProposalState::Active,
        ProposalState::Canceled,
        ProposalState::Defeated,
        ProposalState::Succeeded,
        ProposalState::Queued,
        ProposalState::Expired,
        ProposalState::Executed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Pending => "Pending",
            ProposalState::Active => "Active",
            ProposalState::Canceled => "Canceled",
            ProposalState::Defeated => "Defeated",
            ProposalState::Succeeded => "Succeeded",
            ProposalState::Queued => "Queued",
            ProposalState::Expired => "Expired",
            ProposalState::Executed => "Executed",
        }
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProposalStateError(pub String);

impl fmt::Display for ParseProposalStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown proposal state '{}'", self.0)
    }
}

impl std::error::Error for ParseProposalStateError {}

impl FromStr for ProposalState {
    type Err = ParseProposalStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseProposalStateError(s.to_string()))
    }
}

/// Which tally a vote's weight lands in
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Against,
    For,
    Abstain,
}

impl VoteDirection {
    /// Maps a raw support code.
    ///
    /// Under `Permissive`, 1 is for, 0 is against and every other value is
    /// abstain. Under `Strict` only 2 is abstain and anything above it
    /// yields `None`.
    pub fn from_support(support: u8, policy: SupportPolicy) -> Option<VoteDirection> {
        match (support, policy) {
            (1, _) => Some(VoteDirection::For),
            (0, _) => Some(VoteDirection::Against),
            (2, SupportPolicy::Strict) => Some(VoteDirection::Abstain),
            (_, SupportPolicy::Strict) => None,
            (_, SupportPolicy::Permissive) => Some(VoteDirection::Abstain),
        }
    }
}

/// Identity of a proposer or voter. Nothing beyond the address is tracked.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Address,
}

/// Aggregate state of one proposal
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer: Address,
    pub targets: Vec<Address>,
    pub values: Vec<String>,
    pub signatures: Vec<String>,
    pub calldatas: Vec<String>,
    pub vote_start: u64,
    pub vote_end: u64,
    pub description: String,
    /// Block timestamp of the creation event
    pub created_at: u64,
    #[serde(with = "crate::governance::types::decimal_u256")]
    pub votes_for: U256,
    #[serde(with = "crate::governance::types::decimal_u256")]
    pub votes_against: U256,
    #[serde(with = "crate::governance::types::decimal_u256")]
    pub votes_abstain: U256,
    /// Number of VoteCast events, not weight
    pub votes_total: u64,
    pub state: ProposalState,
}

impl Proposal {
    /// Fresh proposal in `Pending` with all tallies at zero
    pub fn new(event: &ProposalCreated, created_at: u64) -> Self {
        Self {
            id: event.proposal_id.clone(),
            proposer: event.proposer.clone(),
            targets: event.targets.clone(),
            values: event.values.clone(),
            signatures: event.signatures.clone(),
            calldatas: event.calldatas.clone(),
            vote_start: event.vote_start,
            vote_end: event.vote_end,
            description: event.description.clone(),
            created_at,
            votes_for: U256::ZERO,
            votes_against: U256::ZERO,
            votes_abstain: U256::ZERO,
            votes_total: 0,
            state: ProposalState::Pending,
        }
    }

    /// Returns the storage key for this proposal
    pub fn storage_key(&self) -> String {
        self.id.to_string()
    }

    /// Adds one vote's weight to its tally and counts it.
    ///
    /// The proposal moves to `Active` whatever state it was in. Nothing is
    /// modified when a counter would overflow.
    pub fn record_vote(&mut self, direction: VoteDirection, weight: U256) -> IndexerResult<()> {
        let overflow = || IndexerError::TallyOverflow {
            proposal_id: self.id.clone(),
        };
        let votes_total = self.votes_total.checked_add(1).ok_or_else(overflow)?;
        let tally = match direction {
            VoteDirection::For => &mut self.votes_for,
            VoteDirection::Against => &mut self.votes_against,
            VoteDirection::Abstain => &mut self.votes_abstain,
        };
        let updated = tally.checked_add(weight).ok_or_else(overflow)?;

        *tally = updated;
        self.votes_total = votes_total;
        self.state = ProposalState::Active;
        Ok(())
    }

    pub fn mark_queued(&mut self) {
        self.state = ProposalState::Queued;
    }

    pub fn mark_executed(&mut self) {
        self.state = ProposalState::Executed;
    }

    pub fn mark_canceled(&mut self) {
        self.state = ProposalState::Canceled;
    }

    /// Sum of all tallied weight
    pub fn total_weight(&self) -> Option<U256> {
        self.votes_for
            .checked_add(self.votes_against)?
            .checked_add(self.votes_abstain)
    }
}

/// One cast vote. Append-only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// Log id of the VoteCast event
    pub id: String,
    pub voter: Address,
    pub proposal: ProposalId,
    /// Raw support code as emitted
    pub support: u8,
    #[serde(with = "crate::governance::types::decimal_u256")]
    pub weight: U256,
    pub reason: String,
    pub provenance: Provenance,
}

impl Vote {
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.proposal, self.id)
    }
}

/// What an audit record mirrors
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum ProposalEventKind {
    Created,
    Queued { eta_seconds: u64 },
    Executed,
    Canceled,
}

/// Immutable audit record of a proposal lifecycle event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProposalEventRecord {
    /// `<block>-<log index>` of the source event
    pub id: String,
    pub proposal: ProposalId,
    #[serde(flatten)]
    pub kind: ProposalEventKind,
    pub provenance: Provenance,
}

impl ProposalEventRecord {
    pub fn new(proposal: ProposalId, kind: ProposalEventKind, provenance: &Provenance) -> Self {
        Self {
            id: provenance.event_id(),
            proposal,
            kind,
            provenance: provenance.clone(),
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.proposal, self.id)
    }
}

/// Mirror of an informational governor event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GovernorLogRecord {
    /// Log id of the source event
    pub id: String,
    pub event: GovernorEvent,
    pub provenance: Provenance,
}
