//! Change notifications for update observers.
//!
//! Events are delivered over a [`tokio::sync::broadcast`] channel so any
//! number of UI threads can subscribe. Slow subscribers that fall behind see
//! `Lagged` and should re-read the coordinator's accessors.

use super::state::UpdateState;
use tokio::sync::broadcast;

/// Buffered events per subscriber before older ones are dropped.
const EVENT_CAPACITY: usize = 256;

/// Something observable about the update session changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    /// The lifecycle state was (re)entered.
    StateChanged {
        /// The new state.
        state: UpdateState,
    },
    /// A download progress tick was recorded.
    Progress {
        /// Bytes written so far.
        bytes_downloaded: u64,
        /// Expected size, if announced.
        total_bytes: Option<u64>,
    },
}

/// Fan-out of [`UpdateEvent`]s to subscribers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<UpdateEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Register a new subscriber. It only sees events emitted afterwards.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.tx.subscribe()
    }

    /// Deliver `event` to every subscriber. Must not be called while holding
    /// the session lock.
    pub fn emit(&self, event: UpdateEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}
