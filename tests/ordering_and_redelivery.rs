use governor_indexer::config::IndexerConfig;
use governor_indexer::governance::{EventPosition, HandleOutcome, IndexerError};

mod test_helpers;
use test_helpers::*;

#[test]
fn test_redelivered_vote_is_skipped() {
    let mut tracker = memory_tracker(IndexerConfig::default());
    tracker.handle(&envelope(1, 0, created("0xa1", 100, 200))).unwrap();

    let ballot = envelope(2, 0, vote("0xa1", VOTER_A, 1, 50));
    assert_eq!(tracker.handle(&ballot).unwrap(), HandleOutcome::Applied);
    let keys_after_first = tracker.storage().len();
    assert_eq!(tracker.handle(&ballot).unwrap(), HandleOutcome::Redelivered);

    let proposal = tracker.proposal(&proposal_id("0xa1")).unwrap().unwrap();
    assert_eq!(proposal.votes_for, weight(50));
    assert_eq!(proposal.votes_total, 1);
    assert_eq!(tracker.storage().len(), keys_after_first);
}

#[test]
fn test_conflicting_redelivery_is_an_ordering_violation() {
    let mut tracker = memory_tracker(IndexerConfig::default());
    tracker.handle(&envelope(1, 0, created("0xa1", 100, 200))).unwrap();
    tracker.handle(&envelope(2, 0, vote("0xa1", VOTER_A, 1, 50))).unwrap();

    // Same position, different transaction
    let mut forged = envelope(2, 0, vote("0xa1", VOTER_B, 0, 10));
    forged.provenance.transaction_hash = tx_hash(99, 99);
    let err = tracker.handle(&forged).unwrap_err();
    assert!(matches!(err, IndexerError::OrderingViolation { ref event_id, .. } if event_id == "2-0"));
}

#[test]
fn test_out_of_order_event_writes_nothing() {
    let mut tracker = memory_tracker(IndexerConfig::default());
    tracker.handle(&envelope(5, 0, created("0xa1", 100, 200))).unwrap();
    tracker.handle(&envelope(5, 2, vote("0xa1", VOTER_A, 1, 50))).unwrap();
    let keys_before = tracker.storage().len();

    for (block, log) in [(5, 1), (4, 9), (1, 0)] {
        let err = tracker
            .handle(&envelope(block, log, vote("0xa1", VOTER_B, 0, 10)))
            .unwrap_err();
        assert!(matches!(err, IndexerError::OrderingViolation { .. }));
    }

    assert_eq!(tracker.storage().len(), keys_before);
    assert_eq!(
        tracker.cursor().unwrap(),
        Some(EventPosition {
            block_number: 5,
            log_index: 2
        })
    );
    let proposal = tracker.proposal(&proposal_id("0xa1")).unwrap().unwrap();
    assert_eq!(proposal.votes_against, weight(0));
}

#[test]
fn test_cursor_tracks_last_applied_event() {
    let mut tracker = memory_tracker(IndexerConfig::default());
    assert_eq!(tracker.cursor().unwrap(), None);

    tracker.handle(&envelope(7, 3, created("0xa1", 100, 200))).unwrap();
    assert_eq!(
        tracker.cursor().unwrap(),
        Some(EventPosition {
            block_number: 7,
            log_index: 3
        })
    );

    // A failed event does not move the cursor
    tracker
        .handle(&envelope(8, 0, queued("0xffff", 1)))
        .unwrap_err();
    assert_eq!(
        tracker.cursor().unwrap(),
        Some(EventPosition {
            block_number: 7,
            log_index: 3
        })
    );
}

#[test]
fn test_guards_can_be_disabled() {
    let config = IndexerConfig {
        dedup_redeliveries: false,
        enforce_ordering: false,
        ..Default::default()
    };
    let mut tracker = memory_tracker(config);
    tracker.handle(&envelope(9, 0, created("0xa1", 100, 200))).unwrap();

    let ballot = envelope(3, 0, vote("0xa1", VOTER_A, 1, 50));
    assert_eq!(tracker.handle(&ballot).unwrap(), HandleOutcome::Applied);
    assert_eq!(tracker.handle(&ballot).unwrap(), HandleOutcome::Applied);

    let proposal = tracker.proposal(&proposal_id("0xa1")).unwrap().unwrap();
    // Both deliveries counted; the vote record is keyed by log id and overwritten
    assert_eq!(proposal.votes_for, weight(100));
    assert_eq!(proposal.votes_total, 2);
    assert_eq!(tracker.votes(&proposal_id("0xa1")).unwrap().len(), 1);
}

#[test]
fn test_replaying_an_indexed_feed_is_all_redeliveries() {
    let mut tracker = memory_tracker(IndexerConfig::default());
    let feed = vec![
        envelope(1, 0, created("0xa1", 100, 200)),
        envelope(2, 0, vote("0xa1", VOTER_A, 1, 50)),
        envelope(2, 1, vote("0xa1", VOTER_B, 0, 30)),
        envelope(3, 0, queued("0xa1", 3600)),
    ];
    for event in &feed {
        assert_eq!(tracker.handle(event).unwrap(), HandleOutcome::Applied);
    }
    let keys_after_first_pass = tracker.storage().len();

    // Older positions are still recognised, not only the one at the cursor
    for event in &feed {
        assert_eq!(tracker.handle(event).unwrap(), HandleOutcome::Redelivered);
    }
    assert_eq!(tracker.storage().len(), keys_after_first_pass);
    let proposal = tracker.proposal(&proposal_id("0xa1")).unwrap().unwrap();
    assert_eq!(proposal.votes_for, weight(50));
    assert_eq!(proposal.votes_total, 2);
}
