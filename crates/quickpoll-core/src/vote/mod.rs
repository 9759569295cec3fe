//! Ballots and durable vote records.
//!
//! A [`VoteRecord`] is the engine's idempotency anchor: exactly one record
//! may exist per `(poll, voter)` pair, and the tally increment is committed
//! in the same transaction that creates the record. Everything else in the
//! system (tallies, the denormalized poll counter) is derived state that
//! can be rebuilt from these records.
//!
//! A [`Ballot`] carries the voter's selected option indices. Structural
//! rules (non-empty, no duplicate indices) are enforced here; rules that
//! need poll context (index range, single-choice cardinality) are enforced
//! by the aggregator before a record is written.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::poll::{validate_token, PollId, TokenError};


/// Maximum byte length of a voter identifier.
pub const MAX_VOTER_ID_LEN: usize = 64;

/// Maximum byte length of an optional display name.
pub const MAX_VOTER_NAME_LEN: usize = 128;

/// Maximum byte length of an optional device fingerprint.
pub const MAX_FINGERPRINT_LEN: usize = 512;

/// Maximum number of selections a single ballot may carry.
///
/// Matches the maximum option count of a poll; a ballot can never select
/// more distinct options than exist.
pub const MAX_SELECTIONS: usize = crate::poll::MAX_OPTIONS;

// =============================================================================
// Errors
// =============================================================================

/// Validation failures raised while constructing ballots and vote records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VoteError {
    /// Voter identifier was empty.
    #[error("voter id is empty")]
    EmptyVoterId,

    /// Voter identifier exceeded [`MAX_VOTER_ID_LEN`].
    #[error("voter id is {len} bytes, limit is {max}")]
    VoterIdTooLong {
        /// Observed length in bytes.
        len: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// Voter identifier contained a character outside `[A-Za-z0-9_-]`.
    #[error("voter id contains invalid character {ch:?}")]
    VoterIdInvalidCharacter {
        /// First offending character.
        ch: char,
    },

    /// Ballot carried no selections.
    #[error("ballot selects no options")]
    EmptyBallot,

    /// Ballot carried more than [`MAX_SELECTIONS`] selections.
    #[error("ballot selects {count} options, limit is {max}")]
    TooManySelections {
        /// Observed selection count.
        count: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// Ballot selected the same option index more than once.
    #[error("ballot selects option {index} more than once")]
    DuplicateSelection {
        /// The repeated option index.
        index: u32,
    },

    /// Display name exceeded [`MAX_VOTER_NAME_LEN`].
    #[error("voter name is {len} bytes, limit is {max}")]
    NameTooLong {
        /// Observed length in bytes.
        len: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// Device fingerprint exceeded [`MAX_FINGERPRINT_LEN`].
    #[error("device fingerprint is {len} bytes, limit is {max}")]
    FingerprintTooLong {
        /// Observed length in bytes.
        len: usize,
        /// Permitted maximum.
        max: usize,
    },
}

// =============================================================================
// VoterId
// =============================================================================

/// Unique identifier of a voter within a poll.
///
/// One vote record exists per `(poll, voter)` pair, so this identifier is
/// the deduplication key for repeat submissions. Anonymous deployments
/// typically derive it from a device fingerprint, named deployments from
/// an account id; the engine treats both as opaque tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VoterId(String);

impl VoterId {
    /// Validates and wraps a voter identifier.
    ///
    /// # Errors
    ///
    /// Returns [`VoteError`] if the identifier is empty, too long, or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, VoteError> {
        let id = id.into();
        match validate_token(&id, MAX_VOTER_ID_LEN) {
            Ok(()) => Ok(Self(id)),
            Err(TokenError::Empty) => Err(VoteError::EmptyVoterId),
            Err(TokenError::TooLong { len }) => Err(VoteError::VoterIdTooLong {
                len,
                max: MAX_VOTER_ID_LEN,
            }),
            Err(TokenError::InvalidCharacter { ch }) => {
                Err(VoteError::VoterIdInvalidCharacter { ch })
            }
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VoterId {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// =============================================================================
// Ballot
// =============================================================================

/// The option indices selected by one voter.
///
/// Selections preserve submission order. For tally purposes only the first
/// selection is counted; the full ballot is persisted verbatim so richer
/// counting schemes can be replayed from history later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Ballot(Vec<u32>);

impl Ballot {
    /// Validates and wraps a selection list.
    ///
    /// # Errors
    ///
    /// Returns [`VoteError`] if the list is empty, oversized, or selects
    /// the same index twice.
    pub fn new(selections: Vec<u32>) -> Result<Self, VoteError> {
        if selections.is_empty() {
            return Err(VoteError::EmptyBallot);
        }
        if selections.len() > MAX_SELECTIONS {
            return Err(VoteError::TooManySelections {
                count: selections.len(),
                max: MAX_SELECTIONS,
            });
        }
        for (i, &index) in selections.iter().enumerate() {
            if selections[..i].contains(&index) {
                return Err(VoteError::DuplicateSelection { index });
            }
        }
        Ok(Self(selections))
    }

    /// Convenience constructor for a single selection.
    #[must_use]
    pub fn single(index: u32) -> Self {
        Self(vec![index])
    }

    /// The selection that contributes to the tally.
    #[must_use]
    pub fn counted_selection(&self) -> u32 {
        self.0[0]
    }

    /// All selections in submission order.
    #[must_use]
    pub fn selections(&self) -> &[u32] {
        &self.0
    }

    /// Number of selections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; empty ballots cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for index in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{index}")?;
            first = false;
        }
        Ok(())
    }
}

// =============================================================================
// VoteRecord
// =============================================================================

/// A durable record of one accepted ballot.
///
/// Records are append-only: once written they are never updated or
/// deleted, which is what makes tallies reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRecord {
    /// Poll the ballot was cast on.
    pub poll_id: PollId,
    /// Voter who cast it.
    pub voter_id: VoterId,
    /// The selections, in submission order.
    pub ballot: Ballot,
    /// Display name supplied on named polls.
    pub voter_name: Option<String>,
    /// Best-effort device fingerprint supplied by the client.
    pub device_fingerprint: Option<String>,
    /// Instant the record was accepted.
    pub cast_at: DateTime<Utc>,
}

impl VoteRecord {
    /// Validates optional metadata and constructs a record stamped `cast_at`.
    ///
    /// # Errors
    ///
    /// Returns [`VoteError`] if the display name or fingerprint exceed
    /// their byte limits.
    pub fn new(
        poll_id: PollId,
        voter_id: VoterId,
        ballot: Ballot,
        voter_name: Option<String>,
        device_fingerprint: Option<String>,
        cast_at: DateTime<Utc>,
    ) -> Result<Self, VoteError> {
        if let Some(name) = &voter_name {
            if name.len() > MAX_VOTER_NAME_LEN {
                return Err(VoteError::NameTooLong {
                    len: name.len(),
                    max: MAX_VOTER_NAME_LEN,
                });
            }
        }
        if let Some(fp) = &device_fingerprint {
            if fp.len() > MAX_FINGERPRINT_LEN {
                return Err(VoteError::FingerprintTooLong {
                    len: fp.len(),
                    max: MAX_FINGERPRINT_LEN,
                });
            }
        }
        Ok(Self {
            poll_id,
            voter_id,
            ballot,
            voter_name,
            device_fingerprint,
            cast_at,
        })
    }

    /// Rehydrates a record from trusted storage without re-validating.
    pub(crate) fn from_parts(
        poll_id: PollId,
        voter_id: VoterId,
        ballot: Ballot,
        voter_name: Option<String>,
        device_fingerprint: Option<String>,
        cast_at: DateTime<Utc>,
    ) -> Self {
        Self {
            poll_id,
            voter_id,
            ballot,
            voter_name,
            device_fingerprint,
            cast_at,
        }
    }
}
