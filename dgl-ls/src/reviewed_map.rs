//! Corpus-wide reviewed flags
//!
//! Listens to the whole `labels` collection and keeps `id -> reviewed` for
//! the ids of the manifest. Subscribers are only woken when some entry
//! actually changes, whether the change came from the store or from a local
//! toggle.

use dgl_common::normalize::normalize_reviewed;
use dgl_common::store::{DocumentSnapshot, DocumentStore, LABELS};
use dgl_common::Manifest;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reviewed flag per labeled manifest image
pub type Reviewed = BTreeMap<String, bool>;

struct Inner {
    ids: HashSet<String>,
    tx: watch::Sender<Reviewed>,
    cancel: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Shared handle; the listener stops when the last clone is dropped
#[derive(Clone)]
pub struct ReviewedMap {
    inner: Arc<Inner>,
}

impl ReviewedMap {
    /// Start listening to `labels` for the images of `manifest`
    pub fn attach<S: DocumentStore>(store: &S, manifest: &Manifest) -> Self {
        let (tx, _) = watch::channel(Reviewed::new());
        let inner = Arc::new(Inner {
            ids: manifest.ids().map(str::to_string).collect(),
            tx,
            cancel: CancellationToken::new(),
        });

        let mut subscription = store.watch_collection(LABELS);
        let cancel = inner.cancel.clone();
        let listener = Arc::downgrade(&inner);

        tokio::spawn(async move {
            loop {
                let emission = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    emission = subscription.next() => emission,
                };
                let Some(inner) = listener.upgrade() else {
                    break;
                };
                match emission {
                    Some(Ok(snapshots)) => inner.rebuild(&snapshots),
                    Some(Err(e)) => warn!("Reviewed map listener failed: {}", e),
                    None => break,
                }
            }
            debug!("reviewed map listener stopped");
        });

        Self { inner }
    }

    /// Record a local reviewed toggle ahead of the store round trip
    pub fn apply_local(&self, id: &str, reviewed: bool) {
        if !self.inner.ids.contains(id) {
            return;
        }
        self.inner.tx.send_if_modified(|map| {
            if map.get(id) == Some(&reviewed) {
                false
            } else {
                map.insert(id.to_string(), reviewed);
                true
            }
        });
    }

    pub fn is_reviewed(&self, id: &str) -> bool {
        self.inner.tx.borrow().get(id).copied().unwrap_or(false)
    }

    pub fn reviewed_count(&self) -> usize {
        self.inner.tx.borrow().values().filter(|reviewed| **reviewed).count()
    }

    /// Number of manifest images tracked
    pub fn manifest_len(&self) -> usize {
        self.inner.ids.len()
    }

    pub fn snapshot(&self) -> Reviewed {
        self.inner.tx.borrow().clone()
    }

    /// Receiver notified on every effective change
    pub fn subscribe(&self) -> watch::Receiver<Reviewed> {
        self.inner.tx.subscribe()
    }

    pub fn detach(&self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn rebuild(&self, snapshots: &[DocumentSnapshot]) {
        let next: Reviewed = snapshots
            .iter()
            .filter(|snapshot| self.ids.contains(&snapshot.id))
            .filter_map(|snapshot| {
                let data = snapshot.data.as_ref()?;
                Some((snapshot.id.clone(), normalize_reviewed(data.get("reviewed"))))
            })
            .collect();

        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!("reviewed map rebuilt from {} label documents", snapshots.len());
        }
    }
}
