//! Vote submission pipeline.
//!
//! This module implements the [`Aggregator`], the single write path for
//! ballots. Every submission runs the same sequence:
//!
//! 1. **Poll lookup**: the target poll must exist and still be open.
//! 2. **Ballot validation**: selection cardinality must match the poll's
//!    voting mode and every index must name a real option.
//! 3. **Transactional record**: the store inserts the vote record and the
//!    tally increment in one transaction, keyed on `(poll, voter)`. A
//!    pre-existing record turns the submission into an acknowledgment of
//!    the earlier vote; nothing is written twice.
//! 4. **Publication**: newly committed tallies are pushed to the live
//!    feed after the transaction commits.
//!
//! There is no voted-already pre-check anywhere in this pipeline. Two
//! concurrent submissions from one voter race on the insert itself, and
//! the transaction guarantees exactly one of them counts.
//!
//! # Retry Policy
//!
//! The store fails fast on write contention. The aggregator absorbs those
//! transient faults with bounded exponential backoff plus uniform jitter;
//! only validation failures and an exhausted retry budget reach the
//! caller. A submission that fails with [`SubmitError::Unavailable`] has
//! written nothing and is safe to resubmit verbatim.

// Backoff arithmetic stays far below u64 milliseconds.
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::feed::TallyFeed;
use crate::poll::{Poll, PollId, VotingMode};
use crate::store::{RecordOutcome, SqliteStore, StoreError};
use crate::tally::Tally;
use crate::vote::{Ballot, VoteRecord, VoterId};


// =============================================================================
// Constants
// =============================================================================

/// Default number of attempts before a submission gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Hard upper bound on `max_attempts` to keep worst-case submission
/// latency bounded.
pub const MAX_ATTEMPTS: u32 = 16;

/// Default first-retry delay.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Default ceiling on the exponential delay, before jitter.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_millis(500);

// =============================================================================
// Error Types
// =============================================================================

/// Reasons a submission is rejected without being recorded.
///
/// Rejections are terminal: resubmitting the identical ballot fails the
/// same way. They map to client errors at transport boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The target poll does not exist.
    #[error("unknown poll: {poll_id}")]
    UnknownPoll {
        /// The missing identifier.
        poll_id: String,
    },

    /// The target poll stopped accepting ballots at `closed_at`.
    #[error("poll {poll_id} closed at {closed_at}")]
    PollClosed {
        /// The closed poll.
        poll_id: String,
        /// The expiry instant.
        closed_at: DateTime<Utc>,
    },

    /// A single-choice poll received a ballot with several selections.
    #[error("poll {poll_id} is single-choice but ballot selects {selections} options")]
    SingleChoiceExceeded {
        /// The target poll.
        poll_id: String,
        /// Number of selections on the offending ballot.
        selections: usize,
    },

    /// A ballot selected an option index the poll does not have.
    #[error("option index {index} out of range for poll with {option_count} options")]
    OptionOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of options on the poll.
        option_count: usize,
    },

    /// Voter name or device fingerprint violated its byte bound.
    #[error("invalid submission metadata: {reason}")]
    InvalidMetadata {
        /// What failed validation.
        reason: String,
    },
}

/// Errors surfaced by [`Aggregator::submit_vote`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmitError {
    /// The submission was rejected by validation and recorded nothing.
    #[error(transparent)]
    Rejected(#[from] ValidationError),

    /// The store could not commit within the retry budget. Nothing was
    /// recorded; the identical submission may be retried later.
    #[error("store unavailable after {attempts} attempts: {source}")]
    Unavailable {
        /// Attempts made before giving up.
        attempts: u32,
        /// The last store failure observed.
        source: StoreError,
    },
}

impl SubmitError {
    /// Whether retrying the same submission later can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Retry policy for the submission pipeline.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Attempts per submission, counting the first.
    /// Default: [`DEFAULT_MAX_ATTEMPTS`]. Hard cap: [`MAX_ATTEMPTS`].
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each subsequent retry.
    pub backoff_base: Duration,
    /// Ceiling on the exponential delay, before jitter.
    pub backoff_cap: Duration,
}

impl AggregatorConfig {
    /// Creates a configuration with default retry policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }

    /// Sets the attempt budget, clamping to `[1, MAX_ATTEMPTS]`.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.clamp(1, MAX_ATTEMPTS);
        self
    }

    /// Sets the first-retry delay, clamping to at least one millisecond.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base.max(Duration::from_millis(1));
        self
    }

    /// Sets the delay ceiling, clamping to at least the base delay.
    #[must_use]
    pub fn with_backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = cap.max(self.backoff_base);
        self
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Submission
// =============================================================================

/// One voter's ballot for one poll, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSubmission {
    /// Target poll.
    pub poll_id: PollId,
    /// Submitting voter; the deduplication key together with `poll_id`.
    pub voter_id: VoterId,
    /// Selected options.
    pub ballot: Ballot,
    /// Display name for named polls.
    pub voter_name: Option<String>,
    /// Client-reported device fingerprint.
    pub device_fingerprint: Option<String>,
}

impl VoteSubmission {
    /// Creates a submission with no optional metadata.
    #[must_use]
    pub const fn new(poll_id: PollId, voter_id: VoterId, ballot: Ballot) -> Self {
        Self {
            poll_id,
            voter_id,
            ballot,
            voter_name: None,
            device_fingerprint: None,
        }
    }

    /// Attaches a display name.
    #[must_use]
    pub fn with_voter_name(mut self, name: impl Into<String>) -> Self {
        self.voter_name = Some(name.into());
        self
    }

    /// Attaches a device fingerprint.
    #[must_use]
    pub fn with_device_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(fingerprint.into());
        self
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationOutcome {
    /// The ballot was recorded and counted; carries the tally as committed
    /// by this submission's transaction.
    Counted(Tally),
    /// The voter had already voted on this poll; carries their original
    /// record. Nothing was written.
    AlreadyVoted(VoteRecord),
}

impl AggregationOutcome {
    /// Stable string form for logs and wire acknowledgments.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Counted(_) => "counted",
            Self::AlreadyVoted(_) => "already_voted",
        }
    }

    /// Whether this submission changed the tally.
    #[must_use]
    pub const fn is_counted(&self) -> bool {
        matches!(self, Self::Counted(_))
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// The single write path for ballots.
///
/// # Synchronization Protocol
///
/// The aggregator holds `Arc`-wrapped shared references to the store and
/// the feed and has no interior mutability of its own. Any number of
/// concurrent `submit_vote` calls may run against one instance; the store
/// transaction is the serialization point.
pub struct Aggregator {
    config: AggregatorConfig,
    store: Arc<SqliteStore>,
    feed: Arc<TallyFeed>,
}

/// Internal per-attempt outcome, before retry classification.
enum AttemptError {
    Rejected(ValidationError),
    Store(StoreError),
}

impl From<ValidationError> for AttemptError {
    fn from(err: ValidationError) -> Self {
        Self::Rejected(err)
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl Aggregator {
    /// Creates an aggregator over the given store and feed.
    #[must_use]
    pub fn new(config: AggregatorConfig, store: Arc<SqliteStore>, feed: Arc<TallyFeed>) -> Self {
        Self {
            config,
            store,
            feed,
        }
    }

    /// Submits one ballot, retrying transient store contention.
    ///
    /// On `Ok`, the ballot is durably counted exactly once across all
    /// submissions this voter ever made for this poll. On `Err`, nothing
    /// was written by this call.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Rejected`] for validation failures and
    /// [`SubmitError::Unavailable`] once the retry budget is exhausted.
    pub async fn submit_vote(
        &self,
        submission: VoteSubmission,
    ) -> Result<AggregationOutcome, SubmitError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt_submission(&submission) {
                Ok(outcome) => {
                    debug!(
                        poll_id = %submission.poll_id,
                        voter_id = %submission.voter_id,
                        outcome = outcome.as_str(),
                        attempt,
                        "Vote submission resolved"
                    );
                    return Ok(outcome);
                }
                Err(AttemptError::Rejected(reason)) => {
                    debug!(
                        poll_id = %submission.poll_id,
                        voter_id = %submission.voter_id,
                        reason = %reason,
                        "Vote submission rejected"
                    );
                    return Err(SubmitError::Rejected(reason));
                }
                Err(AttemptError::Store(source))
                    if source.is_transient() && attempt < self.config.max_attempts =>
                {
                    let delay = self.backoff_delay(attempt);
                    debug!(
                        poll_id = %submission.poll_id,
                        voter_id = %submission.voter_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Store contended, backing off"
                    );
                    sleep(delay).await;
                }
                Err(AttemptError::Store(source)) => {
                    warn!(
                        poll_id = %submission.poll_id,
                        voter_id = %submission.voter_id,
                        attempts = attempt,
                        transient = source.is_transient(),
                        error = %source,
                        "Vote submission failed without recording"
                    );
                    return Err(SubmitError::Unavailable {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Runs one submission attempt end to end.
    fn attempt_submission(
        &self,
        submission: &VoteSubmission,
    ) -> Result<AggregationOutcome, AttemptError> {
        let poll =
            self.store
                .poll(&submission.poll_id)?
                .ok_or_else(|| ValidationError::UnknownPoll {
                    poll_id: submission.poll_id.to_string(),
                })?;
        Self::validate(&poll, submission)?;

        let record = VoteRecord::new(
            submission.poll_id.clone(),
            submission.voter_id.clone(),
            submission.ballot.clone(),
            submission.voter_name.clone(),
            submission.device_fingerprint.clone(),
            Utc::now(),
        )
        .map_err(|e| ValidationError::InvalidMetadata {
            reason: e.to_string(),
        })?;

        match self.store.record_vote(&record)? {
            RecordOutcome::Recorded(tally) => {
                // Publish only after the transaction has committed.
                self.feed.publish(&tally);
                Ok(AggregationOutcome::Counted(tally))
            }
            RecordOutcome::Duplicate(existing) => Ok(AggregationOutcome::AlreadyVoted(existing)),
        }
    }

    /// Checks a ballot against the poll's rules.
    fn validate(poll: &Poll, submission: &VoteSubmission) -> Result<(), ValidationError> {
        let now = Utc::now();
        if poll.is_closed_at(now) {
            return Err(ValidationError::PollClosed {
                poll_id: poll.id.to_string(),
                // is_closed_at is only true when an expiry is set.
                closed_at: poll.expires_at.unwrap_or(now),
            });
        }
        if poll.mode == VotingMode::SingleChoice && submission.ballot.len() > 1 {
            return Err(ValidationError::SingleChoiceExceeded {
                poll_id: poll.id.to_string(),
                selections: submission.ballot.len(),
            });
        }
        if let Some(&index) = submission
            .ballot
            .selections()
            .iter()
            .find(|&&index| index as usize >= poll.option_count())
        {
            return Err(ValidationError::OptionOutOfRange {
                index,
                option_count: poll.option_count(),
            });
        }
        Ok(())
    }

    /// Delay before retry number `attempt + 1`: exponential in the attempt
    /// count, capped, with uniform jitter up to half the capped delay.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(15);
        let exponential = self.config.backoff_base.saturating_mul(1 << shift);
        let capped = exponential.min(self.config.backoff_cap);
        let jitter_ceiling = capped.as_millis() as u64 / 2;
        let jitter = rand::thread_rng().gen_range(0..=jitter_ceiling);
        capped + Duration::from_millis(jitter)
    }

    /// The tally feed this aggregator publishes to.
    #[must_use]
    pub fn feed(&self) -> &Arc<TallyFeed> {
        &self.feed
    }

    /// The store this aggregator writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }
}
