//! Tally reconciliation command.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use quickpoll_core::{
    PollId, ReconcileOutcome, Reconciler, ReconcilerTask, SqliteStore, TallyFeed,
};

/// Arguments for `quickpoll reconcile`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Poll identifier; every poll when omitted
    poll: Option<String>,

    /// Keep sweeping at the configured interval (Ctrl-C to stop)
    #[arg(short, long, conflicts_with = "poll")]
    watch: bool,
}

/// Recount from vote records and repair any stored drift.
pub fn run(db: &Path, sweep_interval: Duration, args: ReconcileArgs) -> Result<()> {
    let store = Arc::new(
        SqliteStore::open(db)
            .with_context(|| format!("failed to open database {}", db.display()))?,
    );
    let reconciler = Reconciler::new(store, Arc::new(TallyFeed::new()));

    if args.watch {
        return watch(reconciler, sweep_interval);
    }

    match args.poll {
        Some(raw) => {
            let poll_id = PollId::new(raw)?;
            match reconciler.reconcile(&poll_id)? {
                ReconcileOutcome::Consistent => println!("{poll_id}: consistent"),
                ReconcileOutcome::Corrected {
                    previous,
                    corrected,
                } => {
                    println!("{poll_id}: corrected drift");
                    match previous {
                        Some(stored) => println!(
                            "  stored    total {:>6}  counts {:?}",
                            stored.total, stored.counts
                        ),
                        None => println!("  stored    missing or unreadable"),
                    }
                    println!(
                        "  recounted total {:>6}  counts {:?}",
                        corrected.total, corrected.counts
                    );
                }
            }
        }
        None => {
            let summary = reconciler.reconcile_all()?;
            println!(
                "{} polls examined, {} corrected, {} failed",
                summary.polls_examined, summary.corrected, summary.failed
            );
        }
    }
    Ok(())
}

/// Run the periodic sweep until interrupted.
fn watch(reconciler: Reconciler, sweep_interval: Duration) -> Result<()> {
    let task = ReconcilerTask::new(reconciler, sweep_interval);
    let shutdown = task.shutdown_handle();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    rt.block_on(async {
        tokio::select! {
            () = task.run() => {}
            _ = tokio::signal::ctrl_c() => {
                shutdown.store(true, Ordering::Relaxed);
            }
        }
    });
    Ok(())
}
