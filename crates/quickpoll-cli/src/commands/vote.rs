//! Ballot submission command.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use quickpoll_core::protocol::{submit_status, VoteRequest};
use quickpoll_core::{AggregationOutcome, Aggregator, AggregatorConfig, SqliteStore, TallyFeed};

/// Arguments for `quickpoll vote`.
#[derive(Args, Debug)]
pub struct VoteArgs {
    /// Target poll identifier
    poll: String,

    /// Voter identifier; the deduplication key for repeat submissions
    #[arg(long)]
    voter: String,

    /// Selected option index; repeat for multi-choice ballots
    #[arg(short, long = "select", required = true)]
    selections: Vec<u32>,

    /// Display name recorded with the ballot
    #[arg(long)]
    name: Option<String>,

    /// Device fingerprint recorded with the ballot
    #[arg(long)]
    fingerprint: Option<String>,
}

/// Submit one ballot through the aggregation pipeline.
///
/// Resubmitting the same voter's ballot is safe: the engine acknowledges
/// the original vote instead of counting again.
pub fn run(db: &Path, retry: AggregatorConfig, args: VoteArgs) -> Result<()> {
    let store = Arc::new(
        SqliteStore::open(db)
            .with_context(|| format!("failed to open database {}", db.display()))?,
    );
    let feed = Arc::new(TallyFeed::new());
    let aggregator = Aggregator::new(retry, store, feed);

    let request = VoteRequest {
        poll_id: args.poll,
        voter_id: args.voter,
        ballot: args.selections,
        voter_name: args.name,
        device_fingerprint: args.fingerprint,
    };
    let submission = request.into_submission()?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = rt.block_on(aggregator.submit_vote(submission));
    let status = submit_status(&result);

    match result {
        Ok(AggregationOutcome::Counted(tally)) => {
            println!("counted ({status}); poll now at {} votes", tally.total);
            Ok(())
        }
        Ok(AggregationOutcome::AlreadyVoted(record)) => {
            println!(
                "already voted ({status}); ballot [{}] cast at {}",
                record.ballot, record.cast_at
            );
            Ok(())
        }
        Err(err) => bail!("vote not counted ({status}): {err}"),
    }
}
