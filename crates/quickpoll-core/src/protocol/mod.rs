//! Wire types and status mapping for transport layers.
//!
//! The engine itself is transport-agnostic; this module defines the
//! ingress shape a submission arrives in ([`VoteRequest`]), its
//! conversion into validated domain types, and the mapping from engine
//! outcomes to HTTP-style status codes. Deserialization is fail-closed:
//! unknown fields reject the request rather than being dropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregator::{AggregationOutcome, SubmitError, ValidationError, VoteSubmission};
use crate::poll::{PollError, PollId};
use crate::query::QueryError;
use crate::vote::{Ballot, VoteError, VoterId};


/// Status for a newly counted vote.
pub const STATUS_COUNTED: u16 = 201;

/// Status for an acknowledged duplicate.
pub const STATUS_ALREADY_VOTED: u16 = 200;

/// Status for a malformed or invalid submission.
pub const STATUS_INVALID: u16 = 400;

/// Status for an unknown poll.
pub const STATUS_UNKNOWN_POLL: u16 = 404;

/// Status for a submission the store could not commit in time.
pub const STATUS_UNAVAILABLE: u16 = 503;

/// A vote submission as it arrives from a client.
///
/// Field bounds are enforced during [`VoteRequest::into_submission`], not
/// at deserialization time, so a rejected request can still be logged in
/// full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    /// Target poll identifier.
    pub poll_id: String,
    /// Submitting voter identifier.
    pub voter_id: String,
    /// Selected option indices, in preference order.
    pub ballot: Vec<u32>,
    /// Display name for named polls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_name: Option<String>,
    /// Client-reported device fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
}

/// Reasons a request fails conversion into a submission.
///
/// All variants are client errors and map to [`STATUS_INVALID`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RequestError {
    /// Poll identifier failed validation.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// Voter identifier or ballot failed validation.
    #[error(transparent)]
    Vote(#[from] VoteError),
}

impl VoteRequest {
    /// Validates identifiers and ballot shape, producing a submission.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] if the poll id, voter id, or ballot are
    /// structurally invalid. Rules that need the poll definition (index
    /// range, voting mode) are checked later by the aggregator.
    pub fn into_submission(self) -> Result<VoteSubmission, RequestError> {
        let poll_id = PollId::new(self.poll_id)?;
        let voter_id = VoterId::new(self.voter_id)?;
        let ballot = Ballot::new(self.ballot)?;

        let mut submission = VoteSubmission::new(poll_id, voter_id, ballot);
        if let Some(name) = self.voter_name {
            submission = submission.with_voter_name(name);
        }
        if let Some(fingerprint) = self.device_fingerprint {
            submission = submission.with_device_fingerprint(fingerprint);
        }
        Ok(submission)
    }
}

/// Maps a submission result to its status code.
///
/// New votes are `201`, acknowledged duplicates `200`, validation
/// failures `400` (`404` when the poll itself is unknown), and exhausted
/// retry budgets `503`. A `503` means nothing was recorded and the client
/// should retry the identical request.
#[must_use]
pub fn submit_status(result: &Result<AggregationOutcome, SubmitError>) -> u16 {
    match result {
        Ok(AggregationOutcome::Counted(_)) => STATUS_COUNTED,
        Ok(AggregationOutcome::AlreadyVoted(_)) => STATUS_ALREADY_VOTED,
        Err(SubmitError::Rejected(ValidationError::UnknownPoll { .. })) => STATUS_UNKNOWN_POLL,
        Err(SubmitError::Rejected(_)) => STATUS_INVALID,
        Err(SubmitError::Unavailable { .. }) => STATUS_UNAVAILABLE,
    }
}

/// Maps a read failure to its status code.
#[must_use]
pub fn query_status(error: &QueryError) -> u16 {
    match error {
        QueryError::UnknownPoll { .. } => STATUS_UNKNOWN_POLL,
        QueryError::Store(_) => STATUS_UNAVAILABLE,
    }
}
