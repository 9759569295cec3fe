//! Command implementations.

pub mod create;
pub mod reconcile;
pub mod status;
pub mod tally;
pub mod vote;
