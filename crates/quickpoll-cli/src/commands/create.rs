//! Poll creation command.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use quickpoll_core::{Poll, PollId, ResultsVisibility, SqliteStore, VotingMode};
use uuid::Uuid;

/// Arguments for `quickpoll create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Question shown to voters
    title: String,

    /// Option label; repeat once per option (2-10)
    #[arg(short, long = "option", required = true)]
    options: Vec<String>,

    /// Poll identifier; generated when omitted
    #[arg(long)]
    id: Option<String>,

    /// Creator identifier recorded on the poll
    #[arg(long, default_value = "cli")]
    creator: String,

    /// Allow ballots that select several options
    #[arg(long)]
    multi_choice: bool,

    /// Reveal results to a voter only after their ballot is counted
    #[arg(long)]
    reveal_after_vote: bool,

    /// Stop accepting ballots at this instant (RFC 3339)
    #[arg(long)]
    expires_at: Option<DateTime<Utc>>,
}

/// Create a poll in the engine database.
pub fn run(db: &Path, args: CreateArgs) -> Result<()> {
    let id = match args.id {
        Some(raw) => PollId::new(raw)?,
        None => PollId::new(Uuid::new_v4().simple().to_string())?,
    };
    let mode = if args.multi_choice {
        VotingMode::MultiChoice
    } else {
        VotingMode::SingleChoice
    };
    let visibility = if args.reveal_after_vote {
        ResultsVisibility::AfterVote
    } else {
        ResultsVisibility::Live
    };

    let mut poll = Poll::new(id, args.title, args.options, args.creator, mode, visibility)?;
    if let Some(expires_at) = args.expires_at {
        poll = poll.with_expiry(expires_at)?;
    }

    let store = SqliteStore::open(db)
        .with_context(|| format!("failed to open database {}", db.display()))?;
    store.create_poll(&poll)?;

    println!(
        "created poll {} ({} options, {}, results {})",
        poll.id,
        poll.option_count(),
        poll.mode,
        poll.visibility
    );
    if let Some(deadline) = poll.expires_at {
        println!("accepting ballots until {deadline}");
    }
    Ok(())
}
