//! Tally drift detection and repair.
//!
//! Tallies are derived state. Under normal operation they can never
//! disagree with the vote records, but operator surgery, partial restores,
//! or bugs in earlier versions of the engine can leave them wrong. The
//! [`Reconciler`] recomputes each poll's tally from its vote records,
//! compares against the stored projection, and rewrites the stored state
//! when they disagree. Vote records are the source of truth; reconciliation
//! never touches them.
//!
//! [`ReconcilerTask`] wraps the reconciler in a periodic sweep with a
//! shutdown handle, for deployments that want continuous checking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::feed::TallyFeed;
use crate::poll::PollId;
use crate::store::{SqliteStore, StoreError, TallyRepair};
use crate::tally::Tally;

#[cfg(test)]
mod tests;

// =============================================================================
// Constants
// =============================================================================

/// Default pause between periodic sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Minimum configurable sweep interval.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum configurable sweep interval.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Error Types
// =============================================================================

/// Errors surfaced by reconciliation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReconcileError {
    /// The requested poll does not exist.
    #[error("unknown poll: {poll_id}")]
    UnknownPoll {
        /// The missing identifier.
        poll_id: String,
    },

    /// The store failed mid-reconciliation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of reconciling one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Stored tally and poll counter agree with the vote records.
    Consistent,
    /// Stored state disagreed and was rewritten.
    Corrected {
        /// The tally as previously stored; `None` if the stored row was
        /// unreadable.
        previous: Option<Tally>,
        /// The tally recomputed from vote records and now stored.
        corrected: Tally,
    },
}

impl ReconcileOutcome {
    /// Whether the stored state needed no repair.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

/// Counts from one full sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Polls examined.
    pub polls_examined: u64,
    /// Polls whose stored state was rewritten.
    pub corrected: u64,
    /// Polls that could not be reconciled this sweep.
    pub failed: u64,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Recomputes tallies from vote records and repairs stored drift.
pub struct Reconciler {
    store: Arc<SqliteStore>,
    feed: Arc<TallyFeed>,
}

impl Reconciler {
    /// Creates a reconciler over the given store and feed.
    ///
    /// Corrections publish to `feed` so live subscribers converge on the
    /// repaired tally without resubscribing.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, feed: Arc<TallyFeed>) -> Self {
        Self { store, feed }
    }

    /// Reconciles one poll.
    ///
    /// The recount, the comparison against both the stored tally row and
    /// the poll's denormalized vote counter, and any rewrite all run in
    /// one store transaction: a ballot committing concurrently is either
    /// included in the recount or untouched by it, never overwritten by a
    /// stale one. Corrections are published to the live feed.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnknownPoll`] for missing polls, or a
    /// store error if the recount transaction fails. Transient write
    /// contention is not retried here; the next sweep covers it.
    pub fn reconcile(&self, poll_id: &PollId) -> Result<ReconcileOutcome, ReconcileError> {
        match self.store.reconcile_tally(poll_id) {
            Ok(TallyRepair::Consistent) => {
                debug!(poll_id = %poll_id, "Tally consistent");
                Ok(ReconcileOutcome::Consistent)
            }
            Ok(TallyRepair::Repaired {
                previous,
                corrected,
            }) => {
                self.feed.publish(&corrected);
                warn!(
                    poll_id = %poll_id,
                    stored_total = previous.as_ref().map_or(0, |t| t.total),
                    corrected_total = corrected.total,
                    "Corrected tally drift"
                );
                Ok(ReconcileOutcome::Corrected {
                    previous,
                    corrected,
                })
            }
            Err(StoreError::UnknownPoll { poll_id }) => {
                Err(ReconcileError::UnknownPoll { poll_id })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reconciles every poll in the store.
    ///
    /// Per-poll failures are logged and counted, not propagated; a single
    /// damaged poll must not starve the rest of the sweep.
    ///
    /// # Errors
    ///
    /// Returns an error only if the poll listing itself fails.
    pub fn reconcile_all(&self) -> Result<ReconcileSummary, ReconcileError> {
        let poll_ids = self.store.poll_ids()?;
        let mut summary = ReconcileSummary::default();

        for poll_id in poll_ids {
            summary.polls_examined += 1;
            match self.reconcile(&poll_id) {
                Ok(ReconcileOutcome::Consistent) => {}
                Ok(ReconcileOutcome::Corrected { .. }) => summary.corrected += 1,
                Err(err) => {
                    warn!(poll_id = %poll_id, error = %err, "Reconciliation failed for poll");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

// =============================================================================
// ReconcilerTask
// =============================================================================

/// Periodic reconciliation sweep with a shutdown handle.
pub struct ReconcilerTask {
    reconciler: Reconciler,
    sweep_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ReconcilerTask {
    /// Creates a task sweeping at `sweep_interval`, clamped to
    /// `[MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL]`.
    #[must_use]
    pub fn new(reconciler: Reconciler, sweep_interval: Duration) -> Self {
        Self {
            reconciler,
            sweep_interval: sweep_interval.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle for requesting shutdown.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// The effective sweep interval after clamping.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Runs sweeps until shutdown is requested.
    ///
    /// Sweep failures are logged and the loop continues; only shutdown
    /// ends it.
    #[allow(clippy::cast_possible_truncation)] // sweep_interval is far below u64::MAX ms
    pub async fn run(&self) {
        info!(
            sweep_interval_ms = self.sweep_interval.as_millis() as u64,
            "Reconciler task starting"
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.reconciler.reconcile_all() {
                Ok(summary) => {
                    if summary.corrected > 0 || summary.failed > 0 {
                        info!(
                            polls_examined = summary.polls_examined,
                            corrected = summary.corrected,
                            failed = summary.failed,
                            "Reconciliation sweep finished"
                        );
                    } else {
                        debug!(
                            polls_examined = summary.polls_examined,
                            "Reconciliation sweep found no drift"
                        );
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Reconciliation sweep failed");
                }
            }

            tokio::time::sleep(self.sweep_interval).await;
        }

        info!("Reconciler task shutting down");
    }
}
