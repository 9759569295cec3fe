//! Poll definitions and validation.
//!
//! A [`Poll`] is the immutable frame that votes are counted against: an
//! identifier, a question, an ordered list of option labels, and the rules
//! under which ballots are accepted ([`VotingMode`], [`ResultsVisibility`],
//! optional expiry). Options never change after creation, which is what
//! allows tallies to be stored as a dense per-index count vector and
//! recomputed from vote records at any time.
//!
//! All constructors validate field bounds and fail closed. Identifiers are
//! restricted to a URL-safe token alphabet so they can travel in share
//! links and be embedded in storage keys without escaping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Maximum byte length of a poll identifier.
pub const MAX_POLL_ID_LEN: usize = 64;

/// Maximum byte length of a poll title.
pub const MAX_TITLE_LEN: usize = 512;

/// Maximum byte length of a single option label.
pub const MAX_OPTION_LEN: usize = 256;

/// Minimum number of options a poll must offer.
pub const MIN_OPTIONS: usize = 2;

/// Maximum number of options a poll may offer.
pub const MAX_OPTIONS: usize = 10;

// =============================================================================
// Errors
// =============================================================================

/// Validation failures raised while constructing poll state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PollError {
    /// Poll identifier was empty.
    #[error("poll id is empty")]
    EmptyId,

    /// Poll identifier exceeded [`MAX_POLL_ID_LEN`].
    #[error("poll id is {len} bytes, limit is {max}")]
    IdTooLong {
        /// Observed length in bytes.
        len: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// Poll identifier contained a character outside `[A-Za-z0-9_-]`.
    #[error("poll id contains invalid character {ch:?}")]
    IdInvalidCharacter {
        /// First offending character.
        ch: char,
    },

    /// Poll title was empty or whitespace-only.
    #[error("poll title is empty")]
    EmptyTitle,

    /// Poll title exceeded [`MAX_TITLE_LEN`].
    #[error("poll title is {len} bytes, limit is {max}")]
    TitleTooLong {
        /// Observed length in bytes.
        len: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// Fewer than [`MIN_OPTIONS`] options were supplied.
    #[error("poll has {count} options, minimum is {min}")]
    TooFewOptions {
        /// Observed option count.
        count: usize,
        /// Permitted minimum.
        min: usize,
    },

    /// More than [`MAX_OPTIONS`] options were supplied.
    #[error("poll has {count} options, limit is {max}")]
    TooManyOptions {
        /// Observed option count.
        count: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// An option label was empty or whitespace-only.
    #[error("option {index} is empty")]
    EmptyOption {
        /// Zero-based index of the offending option.
        index: usize,
    },

    /// An option label exceeded [`MAX_OPTION_LEN`].
    #[error("option {index} is {len} bytes, limit is {max}")]
    OptionTooLong {
        /// Zero-based index of the offending option.
        index: usize,
        /// Observed length in bytes.
        len: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// Creator identifier failed token validation.
    #[error("poll creator id is invalid: {reason}")]
    InvalidCreator {
        /// Explanation of the failure.
        reason: String,
    },

    /// Expiry timestamp was not strictly after the creation timestamp.
    #[error("poll expiry {expires_at} is not after creation {created_at}")]
    ExpiryBeforeCreation {
        /// Requested expiry.
        expires_at: DateTime<Utc>,
        /// Poll creation time.
        created_at: DateTime<Utc>,
    },

    /// A persisted mode or visibility string did not match any known value.
    #[error("unknown {field} value: {value}")]
    UnknownVariant {
        /// Field being parsed (`mode` or `visibility`).
        field: &'static str,
        /// The unrecognized string.
        value: String,
    },
}

/// Checks that `s` is a non-empty token of `[A-Za-z0-9_-]` no longer than
/// `max` bytes. Returns the first offending character if any.
pub(crate) fn validate_token(s: &str, max: usize) -> Result<(), TokenError> {
    if s.is_empty() {
        return Err(TokenError::Empty);
    }
    if s.len() > max {
        return Err(TokenError::TooLong { len: s.len() });
    }
    if let Some(ch) = s
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return Err(TokenError::InvalidCharacter { ch });
    }
    Ok(())
}

/// Low-level token validation outcome shared by identifier newtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenError {
    Empty,
    TooLong { len: usize },
    InvalidCharacter { ch: char },
}

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier of a poll.
///
/// Poll ids are opaque URL-safe tokens. The engine never interprets their
/// content; uniqueness is enforced by the store at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PollId(String);

impl PollId {
    /// Validates and wraps a poll identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PollError`] if the identifier is empty, too long, or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, PollError> {
        let id = id.into();
        match validate_token(&id, MAX_POLL_ID_LEN) {
            Ok(()) => Ok(Self(id)),
            Err(TokenError::Empty) => Err(PollError::EmptyId),
            Err(TokenError::TooLong { len }) => Err(PollError::IdTooLong {
                len,
                max: MAX_POLL_ID_LEN,
            }),
            Err(TokenError::InvalidCharacter { ch }) => Err(PollError::IdInvalidCharacter { ch }),
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PollId {
    type Err = PollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// =============================================================================
// Voting rules
// =============================================================================

/// How many option selections a single ballot may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VotingMode {
    /// Exactly one option per ballot.
    SingleChoice,
    /// One or more distinct options per ballot.
    MultiChoice,
}

impl VotingMode {
    /// Stable string form used in storage and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleChoice => "single-choice",
            Self::MultiChoice => "multi-choice",
        }
    }
}

impl fmt::Display for VotingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VotingMode {
    type Err = PollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single-choice" => Ok(Self::SingleChoice),
            "multi-choice" => Ok(Self::MultiChoice),
            other => Err(PollError::UnknownVariant {
                field: "mode",
                value: other.to_string(),
            }),
        }
    }
}

/// When a poll's running tally is visible to participants.
///
/// The engine itself always answers tally queries; visibility is metadata
/// that outer surfaces enforce when rendering results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultsVisibility {
    /// Results are shown to a voter only after their ballot is counted.
    AfterVote,
    /// Results are shown live to everyone, voted or not.
    Live,
}

impl ResultsVisibility {
    /// Stable string form used in storage and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AfterVote => "after-vote",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for ResultsVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultsVisibility {
    type Err = PollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "after-vote" => Ok(Self::AfterVote),
            "live" => Ok(Self::Live),
            other => Err(PollError::UnknownVariant {
                field: "visibility",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Poll
// =============================================================================

/// An immutable poll definition.
///
/// `total_votes` is a denormalized count of accepted ballots maintained by
/// the store inside the same transaction that records each vote. It is
/// always recoverable from the vote records themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Poll {
    /// Unique identifier.
    pub id: PollId,
    /// Question shown to voters.
    pub title: String,
    /// Ordered option labels. Ballot indices refer into this list.
    pub options: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Identifier of the creating user.
    pub created_by: String,
    /// Optional expiry; ballots at or after this instant are rejected.
    pub expires_at: Option<DateTime<Utc>>,
    /// Ballot cardinality rule.
    pub mode: VotingMode,
    /// Result visibility rule.
    pub visibility: ResultsVisibility,
    /// Denormalized accepted-ballot count.
    pub total_votes: u64,
}

impl Poll {
    /// Validates and constructs a new poll with `total_votes = 0` and
    /// `created_at` set to the current time.
    ///
    /// # Errors
    ///
    /// Returns [`PollError`] when the title, option list, or creator id
    /// violate the documented bounds.
    pub fn new(
        id: PollId,
        title: impl Into<String>,
        options: Vec<String>,
        created_by: impl Into<String>,
        mode: VotingMode,
        visibility: ResultsVisibility,
    ) -> Result<Self, PollError> {
        let title = title.into();
        let created_by = created_by.into();

        if title.trim().is_empty() {
            return Err(PollError::EmptyTitle);
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(PollError::TitleTooLong {
                len: title.len(),
                max: MAX_TITLE_LEN,
            });
        }
        if options.len() < MIN_OPTIONS {
            return Err(PollError::TooFewOptions {
                count: options.len(),
                min: MIN_OPTIONS,
            });
        }
        if options.len() > MAX_OPTIONS {
            return Err(PollError::TooManyOptions {
                count: options.len(),
                max: MAX_OPTIONS,
            });
        }
        for (index, label) in options.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(PollError::EmptyOption { index });
            }
            if label.len() > MAX_OPTION_LEN {
                return Err(PollError::OptionTooLong {
                    index,
                    len: label.len(),
                    max: MAX_OPTION_LEN,
                });
            }
        }
        if let Err(err) = validate_token(&created_by, MAX_POLL_ID_LEN) {
            return Err(PollError::InvalidCreator {
                reason: match err {
                    TokenError::Empty => "empty".to_string(),
                    TokenError::TooLong { len } => {
                        format!("{len} bytes exceeds limit of {MAX_POLL_ID_LEN}")
                    }
                    TokenError::InvalidCharacter { ch } => format!("invalid character {ch:?}"),
                },
            });
        }

        Ok(Self {
            id,
            title,
            options,
            created_at: Utc::now(),
            created_by,
            expires_at: None,
            mode,
            visibility,
            total_votes: 0,
        })
    }

    /// Sets an expiry instant.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::ExpiryBeforeCreation`] if `expires_at` is not
    /// strictly after the poll's creation time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Result<Self, PollError> {
        if expires_at <= self.created_at {
            return Err(PollError::ExpiryBeforeCreation {
                expires_at,
                created_at: self.created_at,
            });
        }
        self.expires_at = Some(expires_at);
        Ok(self)
    }

    /// Rehydrates a poll from trusted storage without re-validating bounds.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: PollId,
        title: String,
        options: Vec<String>,
        created_at: DateTime<Utc>,
        created_by: String,
        expires_at: Option<DateTime<Utc>>,
        mode: VotingMode,
        visibility: ResultsVisibility,
        total_votes: u64,
    ) -> Self {
        Self {
            id,
            title,
            options,
            created_at,
            created_by,
            expires_at,
            mode,
            visibility,
            total_votes,
        }
    }

    /// Number of options on this poll.
    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    /// Whether the poll no longer accepts ballots at instant `at`.
    ///
    /// A poll with no expiry never closes. Expiry is inclusive: a ballot
    /// arriving exactly at `expires_at` is already late.
    #[must_use]
    pub fn is_closed_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| at >= deadline)
    }
}
