//! Per-poll tally projection.
//!
//! A [`Tally`] is derived state: one counter per poll option plus a total,
//! maintained transactionally alongside vote records and reproducible from
//! them at any time. The conservation invariant is that `total` equals the
//! sum of `counts`; the reconciler additionally checks both against the
//! underlying vote records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::poll::PollId;


/// Counted results for one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    /// Poll these counts belong to.
    pub poll_id: PollId,
    /// One counter per poll option, index-aligned with the option labels.
    pub counts: Vec<u64>,
    /// Number of ballots counted.
    pub total: u64,
    /// Write sequence assigned by the store: incremented on every rewrite
    /// of the stored row. Commits happen in revision order, so the live
    /// feed uses it to drop publishes that arrive out of order. Tallies
    /// recomputed outside the store carry `0` until the store stamps them.
    pub revision: u64,
    /// Instant of the last mutation.
    pub last_updated: DateTime<Utc>,
}

impl Tally {
    /// An all-zero tally for a poll with `option_count` options.
    #[must_use]
    pub fn zero(poll_id: PollId, option_count: usize, at: DateTime<Utc>) -> Self {
        Self {
            poll_id,
            counts: vec![0; option_count],
            total: 0,
            revision: 0,
            last_updated: at,
        }
    }

    /// Counts one ballot for `option`, stamping `at` as the update instant.
    ///
    /// Returns `false` without mutating anything if `option` is out of
    /// range for this tally; callers decide whether that is a validation
    /// bug or corrupt stored data.
    #[must_use]
    pub fn record(&mut self, option: u32, at: DateTime<Utc>) -> bool {
        let Some(slot) = self.counts.get_mut(option as usize) else {
            return false;
        };
        *slot += 1;
        self.total += 1;
        self.last_updated = at;
        true
    }

    /// Number of option counters.
    #[must_use]
    pub fn option_count(&self) -> usize {
        self.counts.len()
    }

    /// Whether `total` equals the sum of the per-option counters.
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.counts.iter().sum::<u64>() == self.total
    }

    /// Whether two tallies agree on counts and total.
    ///
    /// Update timestamps and revisions are excluded: a recomputed tally
    /// carries the cast instant of the latest record and no store-assigned
    /// revision, yet may still agree with the stored counts.
    #[must_use]
    pub fn agrees_with(&self, other: &Self) -> bool {
        self.poll_id == other.poll_id && self.counts == other.counts && self.total == other.total
    }
}
