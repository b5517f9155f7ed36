//! In-process change feed for the document store
//!
//! Every successful write is announced on a broadcast channel. Listeners
//! (document and collection watches) use the notices as wake-ups and then
//! re-read current state from the store, so a lagged or dropped notice only
//! delays an emission, it never corrupts one.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// A document was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChanged {
    pub collection: String,
    pub id: String,
    /// Store-assigned timestamp of the write
    pub update_time: DateTime<Utc>,
}

/// Broadcast channel of [`DocumentChanged`] notices
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<DocumentChanged>,
}

impl ChangeFeed {
    /// Creates a new feed buffering up to `capacity` notices per receiver
    ///
    /// Slow receivers that fall further behind observe a lag, which the
    /// watch loops treat as "something changed".
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future notices
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentChanged> {
        self.tx.subscribe()
    }

    /// Announce a write, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, notice: DocumentChanged) {
        let _ = self.tx.send(notice);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
