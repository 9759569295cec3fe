//! Tally inspection command.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use quickpoll_core::{Poll, PollId, QuerySurface, SqliteStore, Tally, TallyFeed};

/// Arguments for `quickpoll tally`.
#[derive(Args, Debug)]
pub struct TallyArgs {
    /// Poll identifier
    poll: String,

    /// Keep printing the tally as new ballots are counted (Ctrl-C to stop)
    #[arg(short, long)]
    follow: bool,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
}

/// Print a poll's current tally, or follow it as it changes.
///
/// Follow mode polls the database: the in-process subscription feed only
/// carries commits made by the same process, and the CLI votes from
/// separate invocations.
pub fn run(db: &Path, args: TallyArgs) -> Result<()> {
    let store = Arc::new(
        SqliteStore::open(db)
            .with_context(|| format!("failed to open database {}", db.display()))?,
    );
    let queries = QuerySurface::new(store, Arc::new(TallyFeed::new()));
    let poll_id = PollId::new(args.poll)?;
    let poll = queries.poll(&poll_id)?;

    if !args.follow {
        let tally = queries.tally(&poll_id)?;
        print_tally(&poll, &tally, args.json)?;
        return Ok(());
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    rt.block_on(async {
        let mut last_revision: Option<u64> = None;
        loop {
            let tally = queries.tally(&poll_id)?;
            if last_revision != Some(tally.revision) {
                last_revision = Some(tally.revision);
                print_tally(&poll, &tally, args.json)?;
            }
            tokio::select! {
                () = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = tokio::signal::ctrl_c() => return Ok(()),
            }
        }
    })
}

#[allow(clippy::cast_precision_loss)] // vote counts stay far below 2^52
fn print_tally(poll: &Poll, tally: &Tally, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tally)?);
        return Ok(());
    }

    println!("{} ({} votes, updated {})", poll.title, tally.total, tally.last_updated);
    let width = poll
        .options
        .iter()
        .map(|label| label.len())
        .max()
        .unwrap_or(0);
    for (index, label) in poll.options.iter().enumerate() {
        let count = tally.counts.get(index).copied().unwrap_or(0);
        let share = if tally.total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / tally.total as f64
        };
        println!("  [{index}] {label:<width$}  {count:>6}  {share:>5.1}%");
    }
    Ok(())
}
