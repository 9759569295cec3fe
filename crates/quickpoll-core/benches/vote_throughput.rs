//! Throughput benchmarks for the vote pipeline.
//!
//! Measures the storage hot path and the full submission pipeline:
//!
//! - `vote/record`: one `record_vote` transaction, counted and duplicate
//!   acknowledgment paths
//! - `vote/submit`: full validate-record-publish round trip through the
//!   aggregator
//! - `vote/submit_batch`: sustained submissions at several batch sizes
//! - `vote/read`: tally lookup and a full reconciliation recount
//!
//! All numbers are against a file-backed WAL store; the in-memory store is
//! faster and not representative of deployment.

#![allow(missing_docs)]
#![allow(clippy::cast_possible_truncation)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, SamplingMode,
    Throughput,
};
use tempfile::TempDir;

use quickpoll_core::{
    Aggregator, AggregatorConfig, Ballot, Poll, PollId, Reconciler, ResultsVisibility, SqliteStore,
    TallyFeed, VoteRecord, VoteSubmission, VoterId, VotingMode,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Unique voter ids across criterion's repeated closure invocations; a
/// reused id would silently benchmark the duplicate path instead.
static VOTER_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_voter(prefix: &str) -> String {
    format!("{prefix}-{}", VOTER_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// Opens a file-backed store with one seeded poll. The `TempDir` must stay
/// alive as long as the store is in use.
fn seeded_store(option_count: usize) -> (SqliteStore, PollId, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = SqliteStore::open(dir.path().join("bench.db")).expect("failed to open store");
    let poll = Poll::new(
        PollId::new("bench-poll").expect("valid poll id"),
        "Which option?",
        (0..option_count).map(|i| format!("option-{i}")).collect(),
        "owner",
        VotingMode::SingleChoice,
        ResultsVisibility::Live,
    )
    .expect("valid poll");
    store.create_poll(&poll).expect("failed to create poll");
    (store, poll.id, dir)
}

fn make_record(poll_id: &PollId, voter: &str, option: u32) -> VoteRecord {
    VoteRecord::new(
        poll_id.clone(),
        VoterId::new(voter).expect("valid voter id"),
        Ballot::single(option),
        None,
        None,
        Utc::now(),
    )
    .expect("valid record")
}

fn make_submission(poll_id: &PollId, voter: &str, option: u32) -> VoteSubmission {
    VoteSubmission::new(
        poll_id.clone(),
        VoterId::new(voter).expect("valid voter id"),
        Ballot::single(option),
    )
}

// =============================================================================
// Storage Hot Path
// =============================================================================

/// Benchmark one `record_vote` transaction.
///
/// `first_ballot` measures the counted path: vote insert, tally rewrite,
/// and counter bump in one committed transaction. `duplicate_ack` measures
/// the acknowledgment path, which reads the existing record and rolls the
/// transaction back without writing.
fn bench_record_vote(c: &mut Criterion) {
    let mut group = c.benchmark_group("vote/record");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(60);
    group.measurement_time(Duration::from_secs(8));

    group.bench_function("first_ballot", |b| {
        let (store, poll_id, _dir) = seeded_store(4);
        b.iter_batched(
            || {
                let seq = VOTER_SEQ.fetch_add(1, Ordering::Relaxed);
                make_record(&poll_id, &format!("record-voter-{seq}"), (seq % 4) as u32)
            },
            |record| {
                black_box(store.record_vote(&record).expect("failed to record vote"));
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("duplicate_ack", |b| {
        let (store, poll_id, _dir) = seeded_store(4);
        let original = make_record(&poll_id, "repeat-voter", 0);
        store
            .record_vote(&original)
            .expect("failed to seed the original vote");

        b.iter(|| black_box(store.record_vote(&original).expect("failed to acknowledge")));
    });

    group.finish();
}

// =============================================================================
// Submission Pipeline
// =============================================================================

/// Benchmark the full submission pipeline: poll lookup, validation, the
/// record transaction, and feed publication.
fn bench_submit_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let mut group = c.benchmark_group("vote/submit");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(60);

    let (store, poll_id, _dir) = seeded_store(4);
    let store = Arc::new(store);
    let feed = Arc::new(TallyFeed::new());
    let aggregator = Arc::new(Aggregator::new(
        AggregatorConfig::new(),
        Arc::clone(&store),
        feed,
    ));

    group.bench_function("counted", |b| {
        b.iter_batched(
            || {
                let seq = VOTER_SEQ.fetch_add(1, Ordering::Relaxed);
                make_submission(&poll_id, &format!("pipeline-voter-{seq}"), (seq % 4) as u32)
            },
            |submission| {
                let aggregator = Arc::clone(&aggregator);
                rt.block_on(async move {
                    black_box(
                        aggregator
                            .submit_vote(submission)
                            .await
                            .expect("submission succeeds"),
                    );
                });
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark sustained submission throughput at several batch sizes.
fn bench_submit_batches(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let mut group = c.benchmark_group("vote/submit_batch");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(30);

    for batch_size in [10usize, 50, 100] {
        group.throughput(Throughput::Elements(batch_size as u64));

        group.bench_with_input(
            BenchmarkId::new("distinct_voters", batch_size),
            &batch_size,
            |b, &size| {
                let (store, poll_id, _dir) = seeded_store(4);
                let feed = Arc::new(TallyFeed::new());
                let aggregator = Arc::new(Aggregator::new(
                    AggregatorConfig::new(),
                    Arc::new(store),
                    feed,
                ));

                b.iter(|| {
                    let aggregator = Arc::clone(&aggregator);
                    let poll_id = poll_id.clone();
                    rt.block_on(async move {
                        for i in 0..size {
                            let submission = make_submission(
                                &poll_id,
                                &next_voter("batch-voter"),
                                (i % 4) as u32,
                            );
                            aggregator
                                .submit_vote(submission)
                                .await
                                .expect("submission succeeds");
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// Read Paths
// =============================================================================

/// Benchmark tally lookup and a full reconciliation recount against a poll
/// with 500 recorded votes.
fn bench_read_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("vote/read");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(60);

    let (store, poll_id, _dir) = seeded_store(4);
    for i in 0..500u32 {
        store
            .record_vote(&make_record(&poll_id, &format!("reader-{i}"), i % 4))
            .expect("failed to seed votes");
    }

    group.bench_function("tally_lookup", |b| {
        b.iter(|| black_box(store.tally(&poll_id).expect("tally readable")));
    });

    let store = Arc::new(store);
    let reconciler = Reconciler::new(Arc::clone(&store), Arc::new(TallyFeed::new()));
    group.bench_function("reconcile_500_records", |b| {
        b.iter(|| black_box(reconciler.reconcile(&poll_id).expect("reconcile succeeds")));
    });

    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    name = vote_benchmarks;
    config = Criterion::default()
        .with_output_color(true)
        .significance_level(0.05)
        .noise_threshold(0.02);
    targets = bench_record_vote, bench_submit_pipeline, bench_submit_batches, bench_read_paths
);

criterion_main!(vote_benchmarks);
