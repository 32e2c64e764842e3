use crate::config::IndexerConfig;
use crate::governance::errors::{IndexerError, IndexerResult};
use crate::governance::events::{
    EventEnvelope, GovernorEvent, ProposalCanceled, ProposalCreated, ProposalExecuted,
    ProposalQueued, VoteCast,
};
use crate::governance::proposal::{
    Account, GovernorLogRecord, Proposal, ProposalEventKind, ProposalEventRecord, Vote,
    VoteDirection,
};
use crate::governance::types::{Address, EventPosition, ProposalId, Provenance, TxHash};
use crate::storage::namespaces::{
    ACCOUNTS, GOVERNOR_LOGS, INDEXER, PROPOSALS, PROPOSAL_EVENTS, VOTES,
};
use crate::storage::traits::Storage;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

const CURSOR_KEY: &str = "cursor";

/// What `handle` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Applied,
    /// Already applied from the same transaction; nothing written
    Redelivered,
}

/// Marker left for every applied event.
///
/// Markers are kept for the whole history, one small record per event, so
/// replaying any already indexed stretch of a feed reports `Redelivered`
/// instead of failing the ordering check.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct ProcessedMarker {
    transaction_hash: TxHash,
}

fn processed_key(event_id: &str) -> String {
    format!("processed/{}", event_id)
}

/// Derives proposal state, vote tallies and audit records from an ordered
/// stream of governor events.
///
/// `handle` is the normal entry point: it guards ordering and redelivery and
/// applies each event inside one store transaction. The `on_*` handlers can
/// also be called directly; each validates everything before its first
/// write, so a rejected event leaves the store untouched either way.
pub struct ProposalTracker<S: Storage> {
    storage: S,
    config: IndexerConfig,
}

impl<S: Storage> ProposalTracker<S> {
    pub fn new(storage: S, config: IndexerConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Applies one event atomically.
    pub fn handle(&mut self, envelope: &EventEnvelope) -> IndexerResult<HandleOutcome> {
        let provenance = &envelope.provenance;
        let event_id = provenance.event_id();

        if self.config.dedup_redeliveries {
            let seen: Option<ProcessedMarker> = self
                .storage
                .get_json_opt(INDEXER, &processed_key(&event_id))?;
            if let Some(marker) = seen {
                if marker.transaction_hash == provenance.transaction_hash {
                    debug!(
                        "Skipping redelivered {} at {}",
                        envelope.event.name(),
                        event_id
                    );
                    return Ok(HandleOutcome::Redelivered);
                }
                return Err(IndexerError::OrderingViolation {
                    event_id,
                    details: format!(
                        "position already applied from transaction {}",
                        marker.transaction_hash
                    ),
                });
            }
        }

        if self.config.enforce_ordering {
            if let Some(cursor) = self.cursor()? {
                if provenance.position() <= cursor {
                    return Err(IndexerError::OrderingViolation {
                        event_id,
                        details: format!("not after last applied event {}", cursor),
                    });
                }
            }
        }

        self.storage.begin_transaction()?;
        match self.apply(envelope) {
            Ok(()) => {
                self.storage.commit_transaction()?;
                Ok(HandleOutcome::Applied)
            }
            Err(e) => {
                if let Err(rollback_err) = self.storage.rollback_transaction() {
                    error!(
                        "Rollback failed after {} at {}: {}",
                        envelope.event.name(),
                        event_id,
                        rollback_err
                    );
                }
                warn!("Rejected {} at {}: {}", envelope.event.name(), event_id, e);
                Err(e)
            }
        }
    }

    fn apply(&mut self, envelope: &EventEnvelope) -> IndexerResult<()> {
        let provenance = &envelope.provenance;
        match &envelope.event {
            GovernorEvent::ProposalCreated(event) => {
                self.on_proposal_created(event, provenance)?;
            }
            GovernorEvent::VoteCast(event) => {
                self.on_vote_cast(event, provenance)?;
            }
            GovernorEvent::ProposalQueued(event) => {
                self.on_proposal_queued(event, provenance)?;
            }
            GovernorEvent::ProposalExecuted(event) => {
                self.on_proposal_executed(event, provenance)?;
            }
            GovernorEvent::ProposalCanceled(event) => {
                self.on_proposal_canceled(event, provenance)?;
            }
            other => {
                self.on_governor_log(other, provenance)?;
            }
        }

        let position = provenance.position();
        self.storage.set_json(INDEXER, CURSOR_KEY, &position)?;
        if self.config.dedup_redeliveries {
            self.storage.set_json(
                INDEXER,
                &processed_key(&provenance.event_id()),
                &ProcessedMarker {
                    transaction_hash: provenance.transaction_hash.clone(),
                },
            )?;
        }
        Ok(())
    }

    pub fn on_proposal_created(
        &mut self,
        event: &ProposalCreated,
        provenance: &Provenance,
    ) -> IndexerResult<Proposal> {
        if self.storage.contains(PROPOSALS, event.proposal_id.as_str())? {
            return Err(IndexerError::DuplicateProposal {
                proposal_id: event.proposal_id.clone(),
            });
        }

        self.upsert_account(&event.proposer)?;

        let proposal = Proposal::new(event, provenance.block_timestamp);
        self.storage
            .set_json(PROPOSALS, &proposal.storage_key(), &proposal)?;
        self.append_proposal_event(ProposalEventRecord::new(
            proposal.id.clone(),
            ProposalEventKind::Created,
            provenance,
        ))?;

        info!(
            "Proposal {} created by {} (voting {}..{})",
            proposal.id, proposal.proposer, proposal.vote_start, proposal.vote_end
        );
        Ok(proposal)
    }

    pub fn on_vote_cast(&mut self, event: &VoteCast, provenance: &Provenance) -> IndexerResult<Vote> {
        let mut proposal = self.load_proposal(&event.proposal_id)?;

        let direction = VoteDirection::from_support(event.support, self.config.support_policy)
            .ok_or_else(|| IndexerError::MalformedSupportCode {
                proposal_id: event.proposal_id.clone(),
                support: event.support,
            })?;
        let previous_state = proposal.state;
        proposal.record_vote(direction, event.weight)?;

        self.upsert_account(&event.voter)?;
        let vote = Vote {
            id: provenance.log_id(),
            voter: event.voter.clone(),
            proposal: proposal.id.clone(),
            support: event.support,
            weight: event.weight,
            reason: event.reason.clone(),
            provenance: provenance.clone(),
        };
        self.storage.set_json(VOTES, &vote.storage_key(), &vote)?;
        self.storage
            .set_json(PROPOSALS, &proposal.storage_key(), &proposal)?;

        if previous_state != proposal.state {
            info!(
                "Proposal {} moved {} -> {} on vote from {}",
                proposal.id, previous_state, proposal.state, vote.voter
            );
        }
        debug!(
            "Vote on {}: {:?} weight {} (for {}, against {}, abstain {}, count {})",
            proposal.id,
            direction,
            vote.weight,
            proposal.votes_for,
            proposal.votes_against,
            proposal.votes_abstain,
            proposal.votes_total
        );
        Ok(vote)
    }

    pub fn on_proposal_queued(
        &mut self,
        event: &ProposalQueued,
        provenance: &Provenance,
    ) -> IndexerResult<ProposalEventRecord> {
        let mut proposal = self.load_proposal(&event.proposal_id)?;
        proposal.mark_queued();
        self.storage
            .set_json(PROPOSALS, &proposal.storage_key(), &proposal)?;

        let record = ProposalEventRecord::new(
            proposal.id.clone(),
            ProposalEventKind::Queued {
                eta_seconds: event.eta_seconds,
            },
            provenance,
        );
        self.append_proposal_event(record.clone())?;
        info!("Proposal {} queued, eta {}", proposal.id, event.eta_seconds);
        Ok(record)
    }

    pub fn on_proposal_executed(
        &mut self,
        event: &ProposalExecuted,
        provenance: &Provenance,
    ) -> IndexerResult<ProposalEventRecord> {
        let mut proposal = self.load_proposal(&event.proposal_id)?;
        proposal.mark_executed();
        self.storage
            .set_json(PROPOSALS, &proposal.storage_key(), &proposal)?;

        let record =
            ProposalEventRecord::new(proposal.id.clone(), ProposalEventKind::Executed, provenance);
        self.append_proposal_event(record.clone())?;
        info!("Proposal {} executed", proposal.id);
        Ok(record)
    }

    /// Records the cancellation. The proposal's state only changes when
    /// `cancel_sets_state` is on.
    pub fn on_proposal_canceled(
        &mut self,
        event: &ProposalCanceled,
        provenance: &Provenance,
    ) -> IndexerResult<ProposalEventRecord> {
        let mut proposal = self.load_proposal(&event.proposal_id)?;
        if self.config.cancel_sets_state {
            proposal.mark_canceled();
            self.storage
                .set_json(PROPOSALS, &proposal.storage_key(), &proposal)?;
        }

        let record =
            ProposalEventRecord::new(proposal.id.clone(), ProposalEventKind::Canceled, provenance);
        self.append_proposal_event(record.clone())?;
        info!("Proposal {} canceled (state {})", proposal.id, proposal.state);
        Ok(record)
    }

    /// Mirrors an event that does not affect any proposal
    pub fn on_governor_log(
        &mut self,
        event: &GovernorEvent,
        provenance: &Provenance,
    ) -> IndexerResult<GovernorLogRecord> {
        let record = GovernorLogRecord {
            id: provenance.log_id(),
            event: event.clone(),
            provenance: provenance.clone(),
        };
        self.storage.set_json(GOVERNOR_LOGS, &record.id, &record)?;
        debug!("Mirrored {} at {}", event.name(), provenance.event_id());
        Ok(record)
    }

    fn load_proposal(&self, id: &ProposalId) -> IndexerResult<Proposal> {
        self.storage
            .get_json_opt(PROPOSALS, id.as_str())?
            .ok_or_else(|| IndexerError::UnknownProposal {
                proposal_id: id.clone(),
            })
    }

    fn upsert_account(&mut self, address: &Address) -> IndexerResult<()> {
        if !self.storage.contains(ACCOUNTS, address.as_str())? {
            let account = Account {
                id: address.clone(),
            };
            self.storage.set_json(ACCOUNTS, address.as_str(), &account)?;
            debug!("New account {}", address);
        }
        Ok(())
    }

    fn append_proposal_event(&mut self, record: ProposalEventRecord) -> IndexerResult<()> {
        self.storage
            .set_json(PROPOSAL_EVENTS, &record.storage_key(), &record)?;
        Ok(())
    }

    // --- Reads ---

    pub fn proposal(&self, id: &ProposalId) -> IndexerResult<Option<Proposal>> {
        Ok(self.storage.get_json_opt(PROPOSALS, id.as_str())?)
    }

    pub fn proposals(&self) -> IndexerResult<Vec<Proposal>> {
        let mut proposals = Vec::new();
        for key in self.storage.list_keys(PROPOSALS, None)? {
            proposals.push(self.storage.get_json(PROPOSALS, &key)?);
        }
        Ok(proposals)
    }

    pub fn account(&self, address: &Address) -> IndexerResult<Option<Account>> {
        Ok(self.storage.get_json_opt(ACCOUNTS, address.as_str())?)
    }

    /// Votes on a proposal in chain order
    pub fn votes(&self, id: &ProposalId) -> IndexerResult<Vec<Vote>> {
        let prefix = format!("{}/", id);
        let mut votes: Vec<Vote> = Vec::new();
        for key in self.storage.list_keys(VOTES, Some(&prefix))? {
            votes.push(self.storage.get_json(VOTES, &key)?);
        }
        votes.sort_by_key(|v| v.provenance.position());
        Ok(votes)
    }

    /// Lifecycle audit records of a proposal in chain order
    pub fn proposal_events(&self, id: &ProposalId) -> IndexerResult<Vec<ProposalEventRecord>> {
        let prefix = format!("{}/", id);
        let mut records: Vec<ProposalEventRecord> = Vec::new();
        for key in self.storage.list_keys(PROPOSAL_EVENTS, Some(&prefix))? {
            records.push(self.storage.get_json(PROPOSAL_EVENTS, &key)?);
        }
        records.sort_by_key(|r| r.provenance.position());
        Ok(records)
    }

    /// Mirrored informational events in chain order
    pub fn governor_logs(&self) -> IndexerResult<Vec<GovernorLogRecord>> {
        let mut records: Vec<GovernorLogRecord> = Vec::new();
        for key in self.storage.list_keys(GOVERNOR_LOGS, None)? {
            records.push(self.storage.get_json(GOVERNOR_LOGS, &key)?);
        }
        records.sort_by_key(|r| r.provenance.position());
        Ok(records)
    }

    /// Position of the last event applied through `handle`
    pub fn cursor(&self) -> IndexerResult<Option<EventPosition>> {
        Ok(self.storage.get_json_opt(INDEXER, CURSOR_KEY)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupportPolicy;
    use crate::governance::proposal::ProposalState;
    use crate::storage::implementations::in_memory::InMemoryStorage;
    use ethnum::U256;

    fn addr(byte: &str) -> Address {
        format!("0x{}", byte.repeat(20)).parse().unwrap()
    }

    fn prov(block: u64, log: u32) -> Provenance {
        Provenance {
            block_number: block,
            block_timestamp: 1_000 + block,
            transaction_hash: format!("0x{:064x}", block * 1_000 + log as u64).parse().unwrap(),
            log_index: log,
        }
    }

    fn created(id: &str) -> ProposalCreated {
        ProposalCreated {
            proposal_id: id.parse().unwrap(),
            proposer: addr("01"),
            targets: vec![addr("02")],
            values: vec!["0".to_string()],
            signatures: vec![String::new()],
            calldatas: vec!["0x".to_string()],
            vote_start: 100,
            vote_end: 200,
            description: "test".to_string(),
        }
    }

    fn vote(id: &str, voter: &str, support: u8, weight: u128) -> VoteCast {
        VoteCast {
            voter: addr(voter),
            proposal_id: id.parse().unwrap(),
            support,
            weight: U256::new(weight),
            reason: String::new(),
        }
    }

    fn tracker(config: IndexerConfig) -> ProposalTracker<InMemoryStorage> {
        ProposalTracker::new(InMemoryStorage::new(), config)
    }

    #[test]
    fn test_create_writes_proposal_account_and_audit_record() {
        let mut t = tracker(IndexerConfig::default());
        let proposal = t.on_proposal_created(&created("0xa1"), &prov(1, 0)).unwrap();

        assert_eq!(proposal.state, ProposalState::Pending);
        assert_eq!(proposal.created_at, 1_001);
        assert!(t.account(&addr("01")).unwrap().is_some());
        let events = t.proposal_events(&proposal.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ProposalEventKind::Created);
        assert_eq!(events[0].id, "1-0");
    }

    #[test]
    fn test_strict_policy_rejects_before_writing() {
        let config = IndexerConfig {
            support_policy: SupportPolicy::Strict,
            ..Default::default()
        };
        let mut t = tracker(config);
        t.on_proposal_created(&created("0xa1"), &prov(1, 0)).unwrap();
        let before = t.storage().clone();

        let err = t.on_vote_cast(&vote("0xa1", "03", 3, 10), &prov(2, 0)).unwrap_err();
        assert!(matches!(err, IndexerError::MalformedSupportCode { support: 3, .. }));
        assert_eq!(t.storage().len(), before.len());
        assert!(t.account(&addr("03")).unwrap().is_none());
    }

    #[test]
    fn test_cancel_sets_state_when_configured() {
        let config = IndexerConfig {
            cancel_sets_state: true,
            ..Default::default()
        };
        let mut t = tracker(config);
        t.on_proposal_created(&created("0xa1"), &prov(1, 0)).unwrap();
        t.on_proposal_canceled(
            &ProposalCanceled {
                proposal_id: "0xa1".parse().unwrap(),
            },
            &prov(2, 0),
        )
        .unwrap();

        let proposal = t.proposal(&"0xa1".parse().unwrap()).unwrap().unwrap();
        assert_eq!(proposal.state, ProposalState::Canceled);
    }

    #[test]
    fn test_votes_listed_in_chain_order() {
        let mut t = tracker(IndexerConfig::default());
        t.on_proposal_created(&created("0xa1"), &prov(1, 0)).unwrap();
        // Transaction hashes sort opposite to chain position here
        let mut late = prov(9, 0);
        late.transaction_hash = format!("0x{}", "00".repeat(32)).parse().unwrap();
        let mut early = prov(3, 5);
        early.transaction_hash = format!("0x{}", "ff".repeat(32)).parse().unwrap();
        t.on_vote_cast(&vote("0xa1", "03", 1, 1), &late).unwrap();
        t.on_vote_cast(&vote("0xa1", "04", 0, 2), &early).unwrap();

        let votes = t.votes(&"0xa1".parse().unwrap()).unwrap();
        let blocks: Vec<u64> = votes.iter().map(|v| v.provenance.block_number).collect();
        assert_eq!(blocks, vec![3, 9]);
    }
}
