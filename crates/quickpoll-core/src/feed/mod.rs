//! Live tally distribution.
//!
//! The [`TallyFeed`] hands out one broadcast channel per poll, built on
//! [`tokio::sync::watch`]. Watch channels keep only the latest value:
//! a subscriber that falls behind skips intermediate tallies and observes
//! the newest committed state, which is exactly the delivery contract for
//! live results. Every value a subscriber observes is a tally that was
//! committed to the store.
//!
//! Channels are created lazily on first subscription and garbage-collected
//! on the first publish after the last subscriber has gone away.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;
use tracing::trace;

use crate::poll::PollId;
use crate::tally::Tally;


/// Per-poll tally broadcast hub.
///
/// Cheap to share behind an [`std::sync::Arc`]; all methods take `&self`.
#[derive(Default)]
pub struct TallyFeed {
    channels: Mutex<HashMap<PollId, watch::Sender<Tally>>>,
}

impl TallyFeed {
    /// Creates an empty feed with no active channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a committed tally to subscribers of its poll.
    ///
    /// Publishers race each other between commit and publish, so arrival
    /// order here is not commit order. The store's revision restores it: a
    /// publish at or below the revision the channel already holds is
    /// dropped, which keeps the channel from resting on a stale tally and
    /// from waking subscribers for state they have already seen.
    ///
    /// A publish with no live subscribers tears the poll's channel down;
    /// the next subscriber starts a fresh one seeded from the store.
    pub fn publish(&self, tally: &Tally) {
        let mut channels = self.channels.lock().unwrap();
        let Some(sender) = channels.get(&tally.poll_id) else {
            return;
        };
        if sender.receiver_count() == 0 {
            trace!(poll_id = %tally.poll_id, "Collecting idle tally channel");
            channels.remove(&tally.poll_id);
            return;
        }
        sender.send_if_modified(|current| {
            if tally.revision > current.revision {
                *current = tally.clone();
                true
            } else {
                trace!(
                    poll_id = %tally.poll_id,
                    published = tally.revision,
                    held = current.revision,
                    "Dropping out-of-order tally publish"
                );
                false
            }
        });
    }

    /// Subscribes to a poll's tally updates.
    ///
    /// The stream yields the current tally as its first item and the
    /// latest committed tally after each subsequent change. `seed` is the
    /// caller's store snapshot; it backs the channel only when this is the
    /// poll's first live subscription.
    pub fn subscribe(&self, seed: Tally) -> TallyUpdates {
        let mut channels = self.channels.lock().unwrap();
        let receiver = match channels.entry(seed.poll_id.clone()) {
            Entry::Occupied(entry) => entry.get().subscribe(),
            Entry::Vacant(entry) => {
                trace!(poll_id = %seed.poll_id, "Opening tally channel");
                let (sender, receiver) = watch::channel(seed);
                entry.insert(sender);
                receiver
            }
        };
        TallyUpdates {
            inner: WatchStream::new(receiver),
        }
    }

    /// Number of polls with an open channel.
    #[must_use]
    pub fn active_channels(&self) -> usize {
        self.channels.lock().unwrap().len()
    }
}

/// Stream of committed tallies for one poll.
///
/// Yields the current tally immediately, then the newest committed tally
/// after each change. Intermediate states may be skipped; store revisions
/// observed through one stream never go backwards.
pub struct TallyUpdates {
    inner: WatchStream<Tally>,
}

impl Stream for TallyUpdates {
    type Item = Tally;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for TallyUpdates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TallyUpdates").finish_non_exhaustive()
    }
}
