#![allow(dead_code)]

use governor_indexer::config::IndexerConfig;
use governor_indexer::governance::{
    Address, EventEnvelope, GovernorEvent, ProposalCanceled, ProposalCreated, ProposalExecuted,
    ProposalId, ProposalQueued, ProposalTracker, Provenance, TxHash, VoteCast,
};
use governor_indexer::storage::InMemoryStorage;
use ethnum::U256;

pub const PROPOSER: &str = "0x1111111111111111111111111111111111111111";
pub const TARGET: &str = "0x2222222222222222222222222222222222222222";
pub const VOTER_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const VOTER_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const VOTER_C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

pub fn address(s: &str) -> Address {
    s.parse().expect("valid address")
}

pub fn proposal_id(s: &str) -> ProposalId {
    s.parse().expect("valid proposal id")
}

/// A transaction hash unique to (block, log)
pub fn tx_hash(block: u64, log_index: u32) -> TxHash {
    format!("0x{:064x}", block * 10_000 + log_index as u64)
        .parse()
        .expect("valid tx hash")
}

pub fn provenance(block: u64, log_index: u32) -> Provenance {
    Provenance {
        block_number: block,
        block_timestamp: 1_700_000_000 + block * 12,
        transaction_hash: tx_hash(block, log_index),
        log_index,
    }
}

pub fn created(id: &str, vote_start: u64, vote_end: u64) -> GovernorEvent {
    GovernorEvent::ProposalCreated(ProposalCreated {
        proposal_id: proposal_id(id),
        proposer: address(PROPOSER),
        targets: vec![address(TARGET)],
        values: vec!["0".to_string()],
        signatures: vec!["transfer(address,uint256)".to_string()],
        calldatas: vec!["0xdeadbeef".to_string()],
        vote_start,
        vote_end,
        description: "Fund the treasury".to_string(),
    })
}

pub fn vote(id: &str, voter: &str, support: u8, weight: u128) -> GovernorEvent {
    vote_u256(id, voter, support, U256::new(weight))
}

pub fn vote_u256(id: &str, voter: &str, support: u8, weight: U256) -> GovernorEvent {
    GovernorEvent::VoteCast(VoteCast {
        voter: address(voter),
        proposal_id: proposal_id(id),
        support,
        weight,
        reason: String::new(),
    })
}

pub fn weight(n: u128) -> U256 {
    U256::new(n)
}

pub fn queued(id: &str, eta_seconds: u64) -> GovernorEvent {
    GovernorEvent::ProposalQueued(ProposalQueued {
        proposal_id: proposal_id(id),
        eta_seconds,
    })
}

pub fn executed(id: &str) -> GovernorEvent {
    GovernorEvent::ProposalExecuted(ProposalExecuted {
        proposal_id: proposal_id(id),
    })
}

pub fn canceled(id: &str) -> GovernorEvent {
    GovernorEvent::ProposalCanceled(ProposalCanceled {
        proposal_id: proposal_id(id),
    })
}

pub fn envelope(block: u64, log_index: u32, event: GovernorEvent) -> EventEnvelope {
    EventEnvelope::new(provenance(block, log_index), event)
}

pub fn memory_tracker(config: IndexerConfig) -> ProposalTracker<InMemoryStorage> {
    ProposalTracker::new(InMemoryStorage::new(), config)
}

/// One JSON Lines feed entry
pub fn feed_line(block: u64, log_index: u32, event: GovernorEvent) -> String {
    serde_json::to_string(&envelope(block, log_index, event)).expect("serializable envelope")
}
