//! `SQLite`-backed poll, vote, and tally storage.
//!
//! This module uses `SQLite` with WAL mode as the system of record. Its
//! central operation, [`SqliteStore::record_vote`], commits the vote record
//! and the tally increment in one `BEGIN IMMEDIATE` transaction keyed on
//! `(poll_id, voter_id)`, which is what makes vote counting exactly-once
//! under at-least-once submission.
//!
//! The store deliberately runs with `busy_timeout = 0`: lock contention
//! surfaces immediately as a transient error instead of stalling inside
//! `SQLite`, and the aggregator's bounded retry loop owns the backoff
//! policy. Callers that bypass the aggregator must be prepared to see
//! [`StoreError::is_transient`] failures under write contention.

// SQLite returns i64 for row IDs and counts, but they're always non-negative,
// and stored totals stay far below i64::MAX.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use thiserror::Error;
use tracing::warn;

use crate::poll::{Poll, PollId, ResultsVisibility, VotingMode};
use crate::tally::Tally;
use crate::vote::{Ballot, VoteRecord, VoterId};


/// Schema applied to every new connection. Pragmas are connection-scoped
/// and re-applied on open; DDL is idempotent.
const SCHEMA: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 0;

CREATE TABLE IF NOT EXISTS polls (
    poll_id      TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    options      TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    created_by   TEXT NOT NULL,
    expires_at   TEXT,
    mode         TEXT NOT NULL,
    visibility   TEXT NOT NULL,
    total_votes  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS votes (
    poll_id             TEXT NOT NULL REFERENCES polls(poll_id),
    voter_id            TEXT NOT NULL,
    ballot              TEXT NOT NULL,
    voter_name          TEXT,
    device_fingerprint  TEXT,
    cast_at             TEXT NOT NULL,
    PRIMARY KEY (poll_id, voter_id)
);

CREATE TABLE IF NOT EXISTS tallies (
    poll_id       TEXT PRIMARY KEY REFERENCES polls(poll_id),
    counts        TEXT NOT NULL,
    total         INTEGER NOT NULL,
    revision      INTEGER NOT NULL,
    last_updated  TEXT NOT NULL
);
";

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column encoding failed.
    #[error("column encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Attempted to create a poll whose id is already taken.
    #[error("poll already exists: {poll_id}")]
    PollExists {
        /// The conflicting identifier.
        poll_id: String,
    },

    /// Operation referenced a poll that does not exist.
    #[error("unknown poll: {poll_id}")]
    UnknownPoll {
        /// The missing identifier.
        poll_id: String,
    },

    /// A stored row failed to parse back into domain types.
    #[error("corrupt row for poll {poll_id}: {detail}")]
    Corrupt {
        /// Poll whose data is damaged.
        poll_id: String,
        /// What failed to parse.
        detail: String,
    },
}

impl StoreError {
    /// Whether this error reflects momentary lock contention rather than a
    /// persistent fault. Transient errors are safe to retry after backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of [`SqliteStore::record_vote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The vote was recorded and counted; carries the post-commit tally.
    Recorded(Tally),
    /// A record already existed for this `(poll, voter)` pair; nothing was
    /// written. Carries the pre-existing record.
    Duplicate(VoteRecord),
}

/// Outcome of [`SqliteStore::reconcile_tally`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyRepair {
    /// Stored tally and poll counter agree with the vote records.
    Consistent,
    /// Stored state disagreed and was rewritten in the same transaction
    /// that recounted the records.
    Repaired {
        /// The tally as previously stored; `None` if the row was missing
        /// or unreadable.
        previous: Option<Tally>,
        /// The tally recomputed from the vote records and now stored.
        corrected: Tally,
    },
}

/// Row counts and on-disk size, for operational introspection.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of polls.
    pub poll_count: u64,
    /// Number of vote records across all polls.
    pub vote_count: u64,
    /// Number of materialized tally rows.
    pub tally_count: u64,
    /// Database size in bytes.
    pub db_size_bytes: u64,
}

// =============================================================================
// SqliteStore
// =============================================================================

/// The poll store backed by `SQLite`.
///
/// WAL mode allows concurrent readers while a write transaction is in
/// progress. Vote records are append-only; tallies and the denormalized
/// `total_votes` counter are derived state rewritten under the same
/// transaction as the record that changes them.
pub struct SqliteStore {
    conn: Arc<std::sync::Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates a store at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Self::initialize_connection(&conn)?;

        Ok(Self {
            conn: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_connection(&conn)?;

        Ok(Self {
            conn: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    fn initialize_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Creates a poll.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PollExists`] if the identifier is taken.
    pub fn create_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        let options = serde_json::to_string(&poll.options)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let taken: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM polls WHERE poll_id = ?1",
                params![poll.id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::PollExists {
                poll_id: poll.id.to_string(),
            });
        }

        tx.execute(
            "INSERT INTO polls (poll_id, title, options, created_at, created_by, expires_at, mode, visibility, total_votes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                poll.id.as_str(),
                poll.title,
                options,
                poll.created_at,
                poll.created_by,
                poll.expires_at,
                poll.mode.as_str(),
                poll.visibility.as_str(),
                poll.total_votes as i64,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Loads a poll by id, or `None` if no such poll exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    pub fn poll(&self, poll_id: &PollId) -> Result<Option<Poll>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::read_poll(&conn, poll_id)
    }

    /// Lists all poll ids in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn poll_ids(&self) -> Result<Vec<PollId>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT poll_id FROM polls ORDER BY rowid ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        ids.into_iter()
            .map(|raw| {
                PollId::new(raw.clone()).map_err(|e| StoreError::Corrupt {
                    poll_id: raw,
                    detail: format!("poll_id column: {e}"),
                })
            })
            .collect()
    }

    /// Records one vote and its tally increment atomically.
    ///
    /// This is the create-if-absent gate: if no record exists for
    /// `(record.poll_id, record.voter_id)`, the record is inserted, the
    /// tally counter for the ballot's counted selection is incremented,
    /// and the poll's `total_votes` is bumped, all in one `BEGIN IMMEDIATE`
    /// transaction. If a record already exists the transaction writes
    /// nothing and the existing record is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownPoll`] if the poll does not exist, a
    /// transient database error under write contention, or
    /// [`StoreError::Corrupt`] if the stored tally cannot accept the
    /// ballot's counted selection.
    pub fn record_vote(&self, record: &VoteRecord) -> Result<RecordOutcome, StoreError> {
        let ballot = serde_json::to_string(record.ballot.selections())?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let poll_options: Option<String> = tx
            .query_row(
                "SELECT options FROM polls WHERE poll_id = ?1",
                params![record.poll_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(options_json) = poll_options else {
            return Err(StoreError::UnknownPoll {
                poll_id: record.poll_id.to_string(),
            });
        };
        let options: Vec<String> =
            serde_json::from_str(&options_json).map_err(|e| StoreError::Corrupt {
                poll_id: record.poll_id.to_string(),
                detail: format!("options column: {e}"),
            })?;

        let inserted = tx.execute(
            "INSERT INTO votes (poll_id, voter_id, ballot, voter_name, device_fingerprint, cast_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(poll_id, voter_id) DO NOTHING",
            params![
                record.poll_id.as_str(),
                record.voter_id.as_str(),
                ballot,
                record.voter_name,
                record.device_fingerprint,
                record.cast_at,
            ],
        )?;

        if inserted == 0 {
            let existing = Self::read_vote(&tx, &record.poll_id, &record.voter_id)?.ok_or_else(
                || StoreError::Corrupt {
                    poll_id: record.poll_id.to_string(),
                    detail: "vote insert conflicted but no existing row found".to_string(),
                },
            )?;
            // Nothing written; dropping the transaction rolls it back.
            return Ok(RecordOutcome::Duplicate(existing));
        }

        let mut tally = Self::read_tally(&tx, &record.poll_id)?
            .unwrap_or_else(|| Tally::zero(record.poll_id.clone(), options.len(), record.cast_at));
        let counted = record.ballot.counted_selection();
        if !tally.record(counted, record.cast_at) {
            return Err(StoreError::Corrupt {
                poll_id: record.poll_id.to_string(),
                detail: format!(
                    "counted selection {counted} out of range for {} tally counters",
                    tally.option_count()
                ),
            });
        }
        tally.revision += 1;
        Self::write_tally(&tx, &tally)?;

        tx.execute(
            "UPDATE polls SET total_votes = total_votes + 1 WHERE poll_id = ?1",
            params![record.poll_id.as_str()],
        )?;

        tx.commit()?;
        Ok(RecordOutcome::Recorded(tally))
    }

    /// Loads the tally for a poll, or `None` if no votes have been counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored counts are
    /// corrupt.
    pub fn tally(&self, poll_id: &PollId) -> Result<Option<Tally>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::read_tally(&conn, poll_id)
    }

    /// Loads one vote record, or `None` if the voter has not voted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    pub fn vote(&self, poll_id: &PollId, voter_id: &VoterId) -> Result<Option<VoteRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::read_vote(&conn, poll_id, voter_id)
    }

    /// Loads all vote records for a poll in acceptance order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored row is corrupt.
    pub fn votes_for(&self, poll_id: &PollId) -> Result<Vec<VoteRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::read_votes(&conn, poll_id)
    }

    /// Recounts a poll's vote records and repairs the stored tally and
    /// poll counter if they disagree, all in one `BEGIN IMMEDIATE`
    /// transaction.
    ///
    /// The single transaction is what makes this safe to run against live
    /// voting: a concurrent vote either commits before the recount and is
    /// included, or commits after it and never sees its increment
    /// overwritten by a stale recount.
    ///
    /// A vote record whose counted selection is out of range for the poll
    /// is skipped with a warning rather than aborting the repair; its row
    /// is kept for later forensics. An unreadable tally row counts as
    /// drift and is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownPoll`] if the poll does not exist, or
    /// a transient database error under write contention.
    pub fn reconcile_tally(&self, poll_id: &PollId) -> Result<TallyRepair, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(poll) = Self::read_poll(&tx, poll_id)? else {
            return Err(StoreError::UnknownPoll {
                poll_id: poll_id.to_string(),
            });
        };

        let records = Self::read_votes(&tx, poll_id)?;
        let mut recomputed = Tally::zero(poll_id.clone(), poll.option_count(), poll.created_at);
        for record in &records {
            let counted = record.ballot.counted_selection();
            if !recomputed.record(counted, record.cast_at) {
                warn!(
                    poll_id = %poll_id,
                    voter_id = %record.voter_id,
                    selection = counted,
                    option_count = poll.option_count(),
                    "Skipping vote record with out-of-range selection"
                );
            }
        }

        let (previous, readable) = match Self::read_tally(&tx, poll_id) {
            Ok(stored) => (stored, true),
            Err(err @ StoreError::Corrupt { .. }) => {
                warn!(poll_id = %poll_id, error = %err, "Stored tally unreadable, rebuilding");
                (None, false)
            }
            Err(err) => return Err(err),
        };

        let stored_agrees = match &previous {
            Some(stored) => stored.agrees_with(&recomputed),
            // No tally row reads as all zeroes.
            None => readable && recomputed.total == 0,
        };
        if stored_agrees && poll.total_votes == recomputed.total {
            // Nothing written; dropping the transaction rolls it back.
            return Ok(TallyRepair::Consistent);
        }

        let current: Option<i64> = tx
            .query_row(
                "SELECT revision FROM tallies WHERE poll_id = ?1",
                params![poll_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let mut corrected = recomputed;
        corrected.last_updated = Utc::now();
        corrected.revision = current.unwrap_or(0) as u64 + 1;
        Self::write_tally(&tx, &corrected)?;

        tx.execute(
            "UPDATE polls SET total_votes = ?2 WHERE poll_id = ?1",
            params![poll_id.as_str(), corrected.total as i64],
        )?;

        tx.commit()?;
        Ok(TallyRepair::Repaired {
            previous,
            corrected,
        })
    }

    /// Overwrites the stored tally for a poll and resets the poll's
    /// denormalized `total_votes` to match. Returns the revision assigned
    /// to the rewritten row; the caller's `revision` field is ignored.
    ///
    /// Operator seam for staging or undoing manual edits; routine drift
    /// repair goes through [`SqliteStore::reconcile_tally`], which
    /// recounts and rewrites under one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownPoll`] if the poll does not exist.
    pub fn replace_tally(&self, tally: &Tally) -> Result<u64, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE polls SET total_votes = ?2 WHERE poll_id = ?1",
            params![tally.poll_id.as_str(), tally.total as i64],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownPoll {
                poll_id: tally.poll_id.to_string(),
            });
        }

        let current: Option<i64> = tx
            .query_row(
                "SELECT revision FROM tallies WHERE poll_id = ?1",
                params![tally.poll_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let mut stamped = tally.clone();
        stamped.revision = current.unwrap_or(0) as u64 + 1;
        Self::write_tally(&tx, &stamped)?;

        tx.commit()?;
        Ok(stamped.revision)
    }

    /// Gathers row counts and database size.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be gathered.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock().unwrap();

        let poll_count: i64 = conn.query_row("SELECT COUNT(*) FROM polls", [], |row| row.get(0))?;
        let vote_count: i64 = conn.query_row("SELECT COUNT(*) FROM votes", [], |row| row.get(0))?;
        let tally_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM tallies", [], |row| row.get(0))?;

        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(StoreStats {
            poll_count: poll_count as u64,
            vote_count: vote_count as u64,
            tally_count: tally_count as u64,
            db_size_bytes: (page_count * page_size) as u64,
        })
    }

    // =========================================================================
    // Row mapping helpers
    // =========================================================================

    fn read_poll(conn: &Connection, poll_id: &PollId) -> Result<Option<Poll>, StoreError> {
        let row = conn
            .query_row(
                "SELECT title, options, created_at, created_by, expires_at, mode, visibility, total_votes
                 FROM polls
                 WHERE poll_id = ?1",
                params![poll_id.as_str()],
                |row| {
                    Ok(RawPoll {
                        title: row.get(0)?,
                        options: row.get(1)?,
                        created_at: row.get(2)?,
                        created_by: row.get(3)?,
                        expires_at: row.get(4)?,
                        mode: row.get(5)?,
                        visibility: row.get(6)?,
                        total_votes: row.get(7)?,
                    })
                },
            )
            .optional()?;

        row.map(|raw| raw.into_poll(poll_id.clone())).transpose()
    }

    fn read_vote(
        conn: &Connection,
        poll_id: &PollId,
        voter_id: &VoterId,
    ) -> Result<Option<VoteRecord>, StoreError> {
        let row = conn
            .query_row(
                "SELECT poll_id, voter_id, ballot, voter_name, device_fingerprint, cast_at
                 FROM votes
                 WHERE poll_id = ?1 AND voter_id = ?2",
                params![poll_id.as_str(), voter_id.as_str()],
                |row| {
                    Ok(RawVote {
                        poll_id: row.get(0)?,
                        voter_id: row.get(1)?,
                        ballot: row.get(2)?,
                        voter_name: row.get(3)?,
                        device_fingerprint: row.get(4)?,
                        cast_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        row.map(RawVote::into_record).transpose()
    }

    fn read_votes(conn: &Connection, poll_id: &PollId) -> Result<Vec<VoteRecord>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT poll_id, voter_id, ballot, voter_name, device_fingerprint, cast_at
             FROM votes
             WHERE poll_id = ?1
             ORDER BY rowid ASC",
        )?;

        let rows = stmt
            .query_map(params![poll_id.as_str()], |row| {
                Ok(RawVote {
                    poll_id: row.get(0)?,
                    voter_id: row.get(1)?,
                    ballot: row.get(2)?,
                    voter_name: row.get(3)?,
                    device_fingerprint: row.get(4)?,
                    cast_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawVote::into_record).collect()
    }

    fn read_tally(conn: &Connection, poll_id: &PollId) -> Result<Option<Tally>, StoreError> {
        let row = conn
            .query_row(
                "SELECT counts, total, revision, last_updated FROM tallies WHERE poll_id = ?1",
                params![poll_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, DateTime<Utc>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((counts_json, total, revision, last_updated)) = row else {
            return Ok(None);
        };
        let counts: Vec<u64> =
            serde_json::from_str(&counts_json).map_err(|e| StoreError::Corrupt {
                poll_id: poll_id.to_string(),
                detail: format!("counts column: {e}"),
            })?;

        Ok(Some(Tally {
            poll_id: poll_id.clone(),
            counts,
            total: total as u64,
            revision: revision as u64,
            last_updated,
        }))
    }

    fn write_tally(conn: &Connection, tally: &Tally) -> Result<(), StoreError> {
        let counts = serde_json::to_string(&tally.counts)?;
        conn.execute(
            "INSERT INTO tallies (poll_id, counts, total, revision, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(poll_id) DO UPDATE SET
                 counts = excluded.counts,
                 total = excluded.total,
                 revision = excluded.revision,
                 last_updated = excluded.last_updated",
            params![
                tally.poll_id.as_str(),
                counts,
                tally.total as i64,
                tally.revision as i64,
                tally.last_updated,
            ],
        )?;
        Ok(())
    }
}

/// Poll row as stored, before domain parsing.
struct RawPoll {
    title: String,
    options: String,
    created_at: DateTime<Utc>,
    created_by: String,
    expires_at: Option<DateTime<Utc>>,
    mode: String,
    visibility: String,
    total_votes: i64,
}

impl RawPoll {
    fn into_poll(self, poll_id: PollId) -> Result<Poll, StoreError> {
        let corrupt = |detail: String| StoreError::Corrupt {
            poll_id: poll_id.to_string(),
            detail,
        };

        let options: Vec<String> = serde_json::from_str(&self.options)
            .map_err(|e| corrupt(format!("options column: {e}")))?;
        let mode: VotingMode = self
            .mode
            .parse()
            .map_err(|e| corrupt(format!("mode column: {e}")))?;
        let visibility: ResultsVisibility = self
            .visibility
            .parse()
            .map_err(|e| corrupt(format!("visibility column: {e}")))?;

        Ok(Poll::from_parts(
            poll_id,
            self.title,
            options,
            self.created_at,
            self.created_by,
            self.expires_at,
            mode,
            visibility,
            self.total_votes as u64,
        ))
    }
}

/// Vote row as stored, before domain parsing.
struct RawVote {
    poll_id: String,
    voter_id: String,
    ballot: String,
    voter_name: Option<String>,
    device_fingerprint: Option<String>,
    cast_at: DateTime<Utc>,
}

impl RawVote {
    fn into_record(self) -> Result<VoteRecord, StoreError> {
        let corrupt = |poll_id: &str, detail: String| StoreError::Corrupt {
            poll_id: poll_id.to_string(),
            detail,
        };

        let selections: Vec<u32> = serde_json::from_str(&self.ballot)
            .map_err(|e| corrupt(&self.poll_id, format!("ballot column: {e}")))?;
        let ballot = Ballot::new(selections)
            .map_err(|e| corrupt(&self.poll_id, format!("ballot column: {e}")))?;
        let poll_id = PollId::new(self.poll_id.clone())
            .map_err(|e| corrupt(&self.poll_id, format!("poll_id column: {e}")))?;
        let voter_id = VoterId::new(self.voter_id)
            .map_err(|e| corrupt(poll_id.as_str(), format!("voter_id column: {e}")))?;

        Ok(VoteRecord::from_parts(
            poll_id,
            voter_id,
            ballot,
            self.voter_name,
            self.device_fingerprint,
            self.cast_at,
        ))
    }
}
