//! # quickpoll-core
//!
//! Vote aggregation engine for QuickPoll: idempotent ballot recording,
//! transactional tallying, live tally feeds, and drift reconciliation.
//!
//! The engine accepts ballots from an unreliable delivery layer that may
//! submit the same vote many times, and guarantees each `(poll, voter)`
//! pair is counted exactly once. Vote records are the source of truth;
//! per-poll tallies are a projection maintained in the same transaction
//! and recomputable from the records whenever the two drift apart.
//!
//! # Architecture
//!
//! ```text
//!                 submit_vote
//!                      |
//!                      v
//!               +-------------+   one transaction    +-------------+
//!               |  Aggregator | -------------------> | SqliteStore |
//!               | (validate,  |   vote record +      | polls/votes |
//!               |  retry)     |   tally + counter    | /tallies    |
//!               +-------------+                      +-------------+
//!                      | publish after commit              ^
//!                      v                                   | recount
//!               +-------------+                      +-------------+
//!               |  TallyFeed  | <------------------- | Reconciler  |
//!               | (watch push)|   corrected tallies  | (sweeps)    |
//!               +-------------+                      +-------------+
//!                      |
//!                      v
//!                TallyUpdates subscribers        QuerySurface reads
//! ```
//!
//! # Modules
//!
//! - [`poll`]: Poll definitions, identifiers, and voting rules
//! - [`vote`]: Voter identifiers, ballots, and immutable vote records
//! - [`tally`]: The per-poll count projection and its conservation checks
//! - [`store`]: `SQLite` persistence with single-transaction vote recording
//! - [`aggregator`]: The submission pipeline with bounded retry on contention
//! - [`feed`]: Live tally subscriptions over `tokio::sync::watch` channels
//! - [`query`]: Read-side access to polls, tallies, and vote status
//! - [`reconcile`]: Recount-and-repair of tally drift, one-shot or periodic
//! - [`protocol`]: Ingress request shape and status-code mapping
//! - [`config`]: TOML engine configuration
//!
//! # Counting Guarantee
//!
//! No component ever pre-checks "has this voter voted?" before writing.
//! The primary key on `(poll_id, voter_id)` arbitrates inside the store
//! transaction, so concurrent duplicate submissions race on the insert
//! itself and exactly one wins. The losers receive the winner's original
//! record back as an acknowledgment.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use quickpoll_core::{
//!     Aggregator, AggregatorConfig, Ballot, Poll, PollId, QuerySurface,
//!     ResultsVisibility, SqliteStore, TallyFeed, VoteSubmission, VoterId,
//!     VotingMode,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::in_memory()?);
//! let feed = Arc::new(TallyFeed::default());
//!
//! let poll = Poll::new(
//!     PollId::new("lunch")?,
//!     "Where should we eat?",
//!     vec!["Tacos".into(), "Ramen".into()],
//!     "alice",
//!     VotingMode::SingleChoice,
//!     ResultsVisibility::Live,
//! )?;
//! store.create_poll(&poll)?;
//!
//! let aggregator = Aggregator::new(
//!     AggregatorConfig::new(),
//!     Arc::clone(&store),
//!     Arc::clone(&feed),
//! );
//! let submission = VoteSubmission::new(
//!     poll.id.clone(),
//!     VoterId::new("bob")?,
//!     Ballot::single(1),
//! );
//! let outcome = aggregator.submit_vote(submission).await?;
//! assert!(outcome.is_counted());
//!
//! let queries = QuerySurface::new(store, feed);
//! let tally = queries.tally(&poll.id)?;
//! assert_eq!(tally.counts, vec![0, 1]);
//! assert_eq!(tally.total, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregator;
pub mod config;
pub mod feed;
pub mod poll;
pub mod protocol;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod tally;
pub mod vote;

// Re-export the engine surface at the crate root for convenience.
pub use aggregator::{
    AggregationOutcome, Aggregator, AggregatorConfig, SubmitError, ValidationError, VoteSubmission,
};
pub use config::{ConfigError, EngineConfig};
pub use feed::{TallyFeed, TallyUpdates};
pub use poll::{Poll, PollError, PollId, ResultsVisibility, VotingMode};
pub use protocol::{RequestError, VoteRequest};
pub use query::{QueryError, QuerySurface};
pub use reconcile::{
    ReconcileError, ReconcileOutcome, ReconcileSummary, Reconciler, ReconcilerTask,
};
pub use store::{RecordOutcome, SqliteStore, StoreError, StoreStats, TallyRepair};
pub use tally::Tally;
pub use vote::{Ballot, VoteError, VoteRecord, VoterId};
