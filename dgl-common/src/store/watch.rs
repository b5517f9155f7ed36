//! Listener loops shared by all store backends
//!
//! A watch re-reads the store after every relevant wake-up (change notice,
//! feed lag, or poll tick) and emits only when the observed state differs
//! from the last emission.

use super::{DocumentSnapshot, DocumentStore, Subscription};
use crate::events::DocumentChanged;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 16;

pub(super) fn watch_document<S: DocumentStore>(
    store: S,
    collection: String,
    id: String,
) -> Subscription<DocumentSnapshot> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let subscription = Subscription::new(rx, cancel.clone());
    let watch_id = subscription.id();

    // Subscribe before the first read so no write can slip in between.
    let mut changes = store.changes();
    let poll = store.poll_interval();

    tokio::spawn(async move {
        debug!("watch {} attached to {}/{}", watch_id, collection, id);
        let mut last: Option<(bool, Option<DateTime<Utc>>)> = None;

        loop {
            match store.get(&collection, &id).await {
                Ok(snapshot) => {
                    let fingerprint = snapshot.fingerprint();
                    if last != Some(fingerprint) {
                        last = Some(fingerprint);
                        if tx.send(Ok(snapshot)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("watch {} failed to read {}/{}: {}", watch_id, collection, id, e);
                    if tx.send(Err(e)).await.is_err() {
                        break;
                    }
                }
            }

            let relevant = |notice: &DocumentChanged| notice.collection == collection && notice.id == id;
            if !wait_for_change(&mut changes, &cancel, poll, relevant).await {
                break;
            }
        }

        debug!("watch {} on {}/{} detached", watch_id, collection, id);
    });

    subscription
}

pub(super) fn watch_collection<S: DocumentStore>(
    store: S,
    collection: String,
) -> Subscription<Vec<DocumentSnapshot>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let subscription = Subscription::new(rx, cancel.clone());
    let watch_id = subscription.id();

    let mut changes = store.changes();
    let poll = store.poll_interval();

    tokio::spawn(async move {
        debug!("watch {} attached to collection {}", watch_id, collection);
        let mut last: Option<Vec<(String, Option<DateTime<Utc>>)>> = None;

        loop {
            match store.list(&collection).await {
                Ok(snapshots) => {
                    let fingerprint: Vec<_> = snapshots
                        .iter()
                        .map(|snapshot| (snapshot.id.clone(), snapshot.update_time))
                        .collect();
                    if last.as_ref() != Some(&fingerprint) {
                        last = Some(fingerprint);
                        if tx.send(Ok(snapshots)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("watch {} failed to list {}: {}", watch_id, collection, e);
                    if tx.send(Err(e)).await.is_err() {
                        break;
                    }
                }
            }

            let relevant = |notice: &DocumentChanged| notice.collection == collection;
            if !wait_for_change(&mut changes, &cancel, poll, relevant).await {
                break;
            }
        }

        debug!("watch {} on collection {} detached", watch_id, collection);
    });

    subscription
}

/// Wait until something worth a re-read happens
///
/// Returns false when the watch should stop (cancelled or feed closed).
async fn wait_for_change(
    changes: &mut broadcast::Receiver<DocumentChanged>,
    cancel: &CancellationToken,
    poll: Option<Duration>,
    relevant: impl Fn(&DocumentChanged) -> bool,
) -> bool {
    let tick = poll_tick(poll);
    tokio::pin!(tick);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            _ = &mut tick => return true,
            received = changes.recv() => match received {
                Ok(notice) if relevant(&notice) => return true,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("change feed lagged by {} notices", skipped);
                    return true;
                }
                Err(RecvError::Closed) => return false,
            },
        }
    }
}

async fn poll_tick(poll: Option<Duration>) {
    match poll {
        Some(interval) => tokio::time::sleep(interval).await,
        None => std::future::pending::<()>().await,
    }
}
