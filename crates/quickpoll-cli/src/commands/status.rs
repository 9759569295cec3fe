//! Database statistics command.

use std::path::Path;

use anyhow::{Context, Result};
use quickpoll_core::SqliteStore;

/// Print row counts and database size.
pub fn run(db: &Path) -> Result<()> {
    let store = SqliteStore::open(db)
        .with_context(|| format!("failed to open database {}", db.display()))?;
    let stats = store.stats()?;

    println!("polls:    {}", stats.poll_count);
    println!("votes:    {}", stats.vote_count);
    println!("tallies:  {}", stats.tally_count);
    println!("db size:  {} bytes", stats.db_size_bytes);
    Ok(())
}
