use chrono::Utc;
use rusqlite::Connection;
use tempfile::TempDir;
use tokio_stream::StreamExt;

use super::*;
use crate::poll::{Poll, ResultsVisibility, VotingMode};
use crate::vote::{Ballot, VoteRecord, VoterId};

struct Fixture {
    reconciler: Reconciler,
    store: Arc<SqliteStore>,
    feed: Arc<TallyFeed>,
    surgery: Connection,
    _dir: TempDir,
}

/// File-backed fixture with a second raw connection for staging damage.
fn fixture() -> Fixture {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("reconcile.db");
    let store = Arc::new(SqliteStore::open(&path).expect("failed to open store"));
    let feed = Arc::new(TallyFeed::new());
    let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&feed));
    let surgery = Connection::open(&path).expect("failed to open surgery conn");
    Fixture {
        reconciler,
        store,
        feed,
        surgery,
        _dir: dir,
    }
}

fn seed_poll(store: &SqliteStore, id: &str, options: usize) -> Poll {
    let poll = Poll::new(
        PollId::new(id).expect("valid poll id"),
        "Snack preference?",
        (0..options).map(|i| format!("option-{i}")).collect(),
        "creator-1",
        VotingMode::SingleChoice,
        ResultsVisibility::Live,
    )
    .expect("valid poll");
    store.create_poll(&poll).expect("failed to create poll");
    poll
}

fn cast(store: &SqliteStore, poll: &Poll, voter: &str, selection: u32) {
    let record = VoteRecord::new(
        poll.id.clone(),
        VoterId::new(voter).expect("valid voter id"),
        Ballot::single(selection),
        None,
        None,
        Utc::now(),
    )
    .expect("valid record");
    store.record_vote(&record).expect("failed to record vote");
}

#[test]
fn consistent_poll_left_untouched() {
    let fx = fixture();
    let poll = seed_poll(&fx.store, "p1", 2);
    cast(&fx.store, &poll, "v1", 0);
    cast(&fx.store, &poll, "v2", 1);

    let before = fx
        .store
        .tally(&poll.id)
        .expect("tally query failed")
        .expect("tally should exist");

    let outcome = fx.reconciler.reconcile(&poll.id).expect("reconcile failed");
    assert!(outcome.is_consistent());

    let after = fx
        .store
        .tally(&poll.id)
        .expect("tally query failed")
        .expect("tally should exist");
    assert_eq!(after, before, "consistent state must not be rewritten");
}

#[test]
fn voteless_poll_is_consistent() {
    let fx = fixture();
    let poll = seed_poll(&fx.store, "p1", 3);

    let outcome = fx.reconciler.reconcile(&poll.id).expect("reconcile failed");
    assert!(outcome.is_consistent());
    assert!(
        fx.store.tally(&poll.id).expect("tally query failed").is_none(),
        "reconciling a voteless poll must not materialize a tally row"
    );
}

#[test]
fn undercounted_tally_rebuilt_from_records() {
    let fx = fixture();
    let poll = seed_poll(&fx.store, "p1", 2);
    for voter in ["v1", "v2", "v3", "v4"] {
        cast(&fx.store, &poll, voter, 0);
    }
    cast(&fx.store, &poll, "v5", 1);

    // Damage mirrors a lost increment: counters behind the records.
    fx.surgery
        .execute_batch(
            "UPDATE tallies SET counts = '[3,0]', total = 3 WHERE poll_id = 'p1';
             UPDATE polls SET total_votes = 3 WHERE poll_id = 'p1';",
        )
        .expect("failed to stage drift");

    let outcome = fx.reconciler.reconcile(&poll.id).expect("reconcile failed");
    let ReconcileOutcome::Corrected {
        previous,
        corrected,
    } = outcome
    else {
        panic!("drift must be corrected, got {outcome:?}");
    };
    let previous = previous.expect("stored tally was readable");
    assert_eq!(previous.counts, vec![3, 0]);
    assert_eq!(previous.total, 3);
    assert_eq!(corrected.counts, vec![4, 1]);
    assert_eq!(corrected.total, 5);
    assert!(corrected.is_conserved());

    let stored = fx
        .store
        .tally(&poll.id)
        .expect("tally query failed")
        .expect("tally should exist");
    assert_eq!(stored.counts, vec![4, 1]);
    let poll = fx
        .store
        .poll(&poll.id)
        .expect("poll query failed")
        .expect("poll should exist");
    assert_eq!(poll.total_votes, 5, "denormalized counter repaired too");
}

#[test]
fn unreadable_tally_row_rebuilt() {
    let fx = fixture();
    let poll = seed_poll(&fx.store, "p1", 2);
    cast(&fx.store, &poll, "v1", 1);

    fx.surgery
        .execute("UPDATE tallies SET counts = 'not-json' WHERE poll_id = 'p1'", [])
        .expect("failed to stage corruption");

    let outcome = fx.reconciler.reconcile(&poll.id).expect("reconcile failed");
    let ReconcileOutcome::Corrected {
        previous,
        corrected,
    } = outcome
    else {
        panic!("corruption must be corrected, got {outcome:?}");
    };
    assert!(previous.is_none(), "unreadable rows carry no previous tally");
    assert_eq!(corrected.counts, vec![0, 1]);
}

#[test]
fn missing_tally_row_restored_when_records_exist() {
    let fx = fixture();
    let poll = seed_poll(&fx.store, "p1", 2);
    cast(&fx.store, &poll, "v1", 0);

    fx.surgery
        .execute("DELETE FROM tallies WHERE poll_id = 'p1'", [])
        .expect("failed to drop tally row");

    let outcome = fx.reconciler.reconcile(&poll.id).expect("reconcile failed");
    assert!(!outcome.is_consistent());

    let stored = fx
        .store
        .tally(&poll.id)
        .expect("tally query failed")
        .expect("tally row should be restored");
    assert_eq!(stored.counts, vec![1, 0]);
}

#[test]
fn poll_counter_drift_alone_is_repaired() {
    let fx = fixture();
    let poll = seed_poll(&fx.store, "p1", 2);
    cast(&fx.store, &poll, "v1", 0);

    fx.surgery
        .execute("UPDATE polls SET total_votes = 9 WHERE poll_id = 'p1'", [])
        .expect("failed to stage counter drift");

    let outcome = fx.reconciler.reconcile(&poll.id).expect("reconcile failed");
    assert!(!outcome.is_consistent());

    let poll = fx
        .store
        .poll(&poll.id)
        .expect("poll query failed")
        .expect("poll should exist");
    assert_eq!(poll.total_votes, 1);
}

#[test]
fn out_of_range_record_skipped_not_fatal() {
    let fx = fixture();
    let poll = seed_poll(&fx.store, "p1", 2);
    cast(&fx.store, &poll, "v1", 0);

    // A record selecting an option the poll never had, counted into the
    // poll counter by whatever wrote it. The reconciler must count around
    // the record while repairing the counter.
    fx.surgery
        .execute_batch(
            "INSERT INTO votes (poll_id, voter_id, ballot, cast_at)
             VALUES ('p1', 'intruder', '[7]', '2026-01-01T00:00:00+00:00');
             UPDATE polls SET total_votes = 2 WHERE poll_id = 'p1';",
        )
        .expect("failed to insert rogue record");

    let outcome = fx.reconciler.reconcile(&poll.id).expect("reconcile failed");
    let ReconcileOutcome::Corrected { corrected, .. } = outcome else {
        panic!("counter drift from the rogue row must trigger correction");
    };
    assert_eq!(corrected.counts, vec![1, 0], "rogue selection not counted");
    assert_eq!(corrected.total, 1);

    let poll = fx
        .store
        .poll(&poll.id)
        .expect("poll query failed")
        .expect("poll should exist");
    assert_eq!(poll.total_votes, 1);
}

#[test]
fn unknown_poll_is_an_error() {
    let fx = fixture();
    let ghost = PollId::new("ghost").expect("valid poll id");
    assert!(matches!(
        fx.reconciler.reconcile(&ghost),
        Err(ReconcileError::UnknownPoll { .. })
    ));
}

#[test]
fn sweep_isolates_per_poll_failures() {
    let fx = fixture();
    let healthy = seed_poll(&fx.store, "healthy", 2);
    cast(&fx.store, &healthy, "v1", 0);

    let drifted = seed_poll(&fx.store, "drifted", 2);
    cast(&fx.store, &drifted, "v1", 0);
    fx.surgery
        .execute("UPDATE tallies SET total = 7 WHERE poll_id = 'drifted'", [])
        .expect("failed to stage drift");

    let broken = seed_poll(&fx.store, "broken", 2);
    cast(&fx.store, &broken, "v1", 0);
    fx.surgery
        .execute("UPDATE votes SET ballot = 'gibberish' WHERE poll_id = 'broken'", [])
        .expect("failed to break vote row");

    let summary = fx.reconciler.reconcile_all().expect("sweep failed");
    assert_eq!(summary.polls_examined, 3);
    assert_eq!(summary.corrected, 1);
    assert_eq!(summary.failed, 1);

    // The healthy poll is still intact.
    let tally = fx
        .store
        .tally(&healthy.id)
        .expect("tally query failed")
        .expect("tally should exist");
    assert_eq!(tally.total, 1);
}

#[tokio::test]
async fn correction_reaches_live_subscribers() {
    let fx = fixture();
    let poll = seed_poll(&fx.store, "p1", 2);
    cast(&fx.store, &poll, "v1", 0);

    fx.surgery
        .execute("UPDATE tallies SET counts = '[5,5]', total = 10 WHERE poll_id = 'p1'", [])
        .expect("failed to stage drift");

    let mut updates = fx.feed.subscribe(
        fx.store
            .tally(&poll.id)
            .expect("tally query failed")
            .expect("tally should exist"),
    );
    assert_eq!(updates.next().await.expect("snapshot").total, 10);

    fx.reconciler.reconcile(&poll.id).expect("reconcile failed");

    let repaired = updates.next().await.expect("corrected tally");
    assert_eq!(repaired.counts, vec![1, 0]);
    assert_eq!(repaired.total, 1);
}

#[test]
fn task_shutdown_handle_round_trips() {
    let store = Arc::new(SqliteStore::in_memory().expect("failed to create store"));
    let feed = Arc::new(TallyFeed::new());
    let task = ReconcilerTask::new(
        Reconciler::new(store, feed),
        Duration::from_secs(60),
    );

    let handle = task.shutdown_handle();
    assert!(!handle.load(Ordering::Relaxed));
    handle.store(true, Ordering::Relaxed);
    assert!(handle.load(Ordering::Relaxed));
}

#[test]
fn task_clamps_sweep_interval() {
    let mk = || {
        let store = Arc::new(SqliteStore::in_memory().expect("failed to create store"));
        let feed = Arc::new(TallyFeed::new());
        Reconciler::new(store, feed)
    };

    let task = ReconcilerTask::new(mk(), Duration::from_millis(1));
    assert_eq!(task.sweep_interval(), MIN_SWEEP_INTERVAL);

    let task = ReconcilerTask::new(mk(), Duration::from_secs(7 * 24 * 60 * 60));
    assert_eq!(task.sweep_interval(), MAX_SWEEP_INTERVAL);
}
