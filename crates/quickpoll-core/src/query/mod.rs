//! Read-side access to polls, tallies, and vote status.
//!
//! The [`QuerySurface`] answers point-in-time questions against the store
//! and hands out live tally subscriptions backed by the feed. It never
//! writes. Reads run against the same `SQLite` connection as writes, so a
//! tally returned here always reflects some committed transaction, never
//! a partially applied one.

use std::sync::Arc;

use thiserror::Error;

use crate::feed::{TallyFeed, TallyUpdates};
use crate::poll::{Poll, PollId};
use crate::store::{SqliteStore, StoreError};
use crate::tally::Tally;
use crate::vote::{VoteRecord, VoterId};


/// Errors surfaced by read operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The requested poll does not exist.
    #[error("unknown poll: {poll_id}")]
    UnknownPoll {
        /// The missing identifier.
        poll_id: String,
    },

    /// The store failed to answer.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-only facade over the store and the live feed.
pub struct QuerySurface {
    store: Arc<SqliteStore>,
    feed: Arc<TallyFeed>,
}

impl QuerySurface {
    /// Creates a query surface over the given store and feed.
    ///
    /// The feed must be the same instance the aggregator publishes to,
    /// otherwise subscriptions will never observe new votes.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, feed: Arc<TallyFeed>) -> Self {
        Self { store, feed }
    }

    /// Loads a poll definition.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownPoll`] if no such poll exists.
    pub fn poll(&self, poll_id: &PollId) -> Result<Poll, QueryError> {
        self.store
            .poll(poll_id)?
            .ok_or_else(|| QueryError::UnknownPoll {
                poll_id: poll_id.to_string(),
            })
    }

    /// Whether a poll exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot answer.
    pub fn poll_exists(&self, poll_id: &PollId) -> Result<bool, QueryError> {
        Ok(self.store.poll(poll_id)?.is_some())
    }

    /// Lists all poll ids in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot answer.
    pub fn poll_ids(&self) -> Result<Vec<PollId>, QueryError> {
        Ok(self.store.poll_ids()?)
    }

    /// The current tally for a poll.
    ///
    /// A poll nobody has voted on yet reads as an all-zero tally with one
    /// counter per option, stamped with the poll's creation time. Callers
    /// cannot tell a missing tally row from a genuinely empty one, which
    /// is the intended contract.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownPoll`] if no such poll exists.
    pub fn tally(&self, poll_id: &PollId) -> Result<Tally, QueryError> {
        let poll = self.poll(poll_id)?;
        match self.store.tally(poll_id)? {
            Some(tally) => Ok(tally),
            None => Ok(Tally::zero(
                poll.id.clone(),
                poll.option_count(),
                poll.created_at,
            )),
        }
    }

    /// The vote record a voter holds on a poll, if any.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownPoll`] if no such poll exists.
    pub fn vote(
        &self,
        poll_id: &PollId,
        voter_id: &VoterId,
    ) -> Result<Option<VoteRecord>, QueryError> {
        if !self.poll_exists(poll_id)? {
            return Err(QueryError::UnknownPoll {
                poll_id: poll_id.to_string(),
            });
        }
        Ok(self.store.vote(poll_id, voter_id)?)
    }

    /// Whether a voter has already voted on a poll.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownPoll`] if no such poll exists.
    pub fn has_voted(&self, poll_id: &PollId, voter_id: &VoterId) -> Result<bool, QueryError> {
        Ok(self.vote(poll_id, voter_id)?.is_some())
    }

    /// Subscribes to live tally updates for a poll.
    ///
    /// The stream opens with the current tally and then yields the newest
    /// committed tally after each change.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownPoll`] if no such poll exists.
    pub fn subscribe(&self, poll_id: &PollId) -> Result<TallyUpdates, QueryError> {
        let seed = self.tally(poll_id)?;
        let updates = self.feed.subscribe(seed);
        // A ballot can commit between the seed read and the channel
        // opening; its publish finds no channel and is dropped. Re-read
        // and republish to close the window. The feed's revision guard
        // drops the republish when nothing newer committed.
        self.feed.publish(&self.tally(poll_id)?);
        Ok(updates)
    }
}
