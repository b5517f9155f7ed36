//! Annotator labeling session
//!
//! Holds the label of the focused image, applies edits locally at once and
//! persists them through a per-image debounced write. A document listener
//! on `labels/<id>` is the source of truth: every emission for the focused
//! image replaces the local label.
//!
//! Save state moves `Idle -> Saving -> Saved | Error`:
//! - focusing an image resets it to `Idle`
//! - an edit sets `Saving`
//! - a completed write sets `Saved` (or `Error`) unless a newer edit of the
//!   same image is still waiting
//! - a listener emission of an existing document sets `Saved`; a listener
//!   error sets `Error`
//!
//! While a write of the focused image is waiting or in flight, emissions are
//! held back, and an emission older than the last write this session landed
//! is never applied. Local state therefore never falls behind the session's
//! own writes.
//!
//! Failed writes are not retried; the next edit schedules a new write.

use crate::debounce::Debouncer;
use crate::reviewed_map::ReviewedMap;
use chrono::{DateTime, Utc};
use dgl_common::normalize::normalize_label;
use dgl_common::repo::save_label;
use dgl_common::store::{DocumentSnapshot, DocumentStore, LABELS};
use dgl_common::{Error, Identity, Label, ManifestImage, Result, ViewType};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default quiet interval before an edit burst is written
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

const FLUSH_POLL: Duration = Duration::from_millis(10);

/// Persistence status shown to the annotator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    Saved,
    Error(String),
}

impl SaveState {
    pub fn is_error(&self) -> bool {
        matches!(self, SaveState::Error(_))
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveState::Idle => f.write_str("idle"),
            SaveState::Saving => f.write_str("saving"),
            SaveState::Saved => f.write_str("saved"),
            SaveState::Error(message) => write!(f, "error: {}", message),
        }
    }
}

#[derive(Debug, Clone)]
struct Focus {
    generation: u64,
    image: ManifestImage,
    label: Label,
    /// Newest emission held back while a local write was outstanding
    deferred: Option<DocumentSnapshot>,
}

/// Write bookkeeping for one image
///
/// Local state must never fall behind a write this session already landed,
/// so an emission only replaces it once every edit has concluded and the
/// emission is at least as new as the last landed write.
#[derive(Debug, Default)]
struct WriteProgress {
    /// Sequence number of the newest local edit
    edited: u64,
    /// Newest edit whose write has completed (landed or failed)
    concluded: u64,
    /// Store timestamp of the newest write this session landed
    landed: Option<DateTime<Utc>>,
}

impl WriteProgress {
    fn settled(&self) -> bool {
        self.concluded >= self.edited
    }

    fn accepts(&self, update_time: Option<DateTime<Utc>>) -> bool {
        self.settled()
            && match self.landed {
                Some(landed) => update_time.is_some_and(|time| time >= landed),
                None => true,
            }
    }
}

struct Shared {
    focus: RwLock<Option<Focus>>,
    generation: AtomicU64,
    progress: Mutex<HashMap<String, WriteProgress>>,
    state: watch::Sender<SaveState>,
    debouncer: Debouncer,
}

impl Shared {
    fn set_state(&self, state: SaveState) {
        self.state.send_replace(state);
    }

    fn progress(&self) -> MutexGuard<'_, HashMap<String, WriteProgress>> {
        self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a local edit of `id`; returns its sequence number
    fn record_edit(&self, id: &str) -> u64 {
        let mut progress = self.progress();
        let entry = progress.entry(id.to_string()).or_default();
        entry.edited += 1;
        entry.edited
    }

    fn accepts(&self, id: &str, update_time: Option<DateTime<Utc>>) -> bool {
        self.progress()
            .get(id)
            .map_or(true, |progress| progress.accepts(update_time))
    }

    async fn is_focused(&self, id: &str) -> bool {
        self.focus
            .read()
            .await
            .as_ref()
            .is_some_and(|focus| focus.image.id == id)
    }

    /// Apply a listener emission belonging to focus `generation`
    async fn apply_remote(&self, generation: u64, snapshot: DocumentSnapshot) {
        let mut focus = self.focus.write().await;
        let Some(focus) = focus.as_mut().filter(|focus| focus.generation == generation) else {
            debug!("ignoring emission for {} from a previous focus", snapshot.id);
            return;
        };

        if !self.accepts(&focus.image.id, snapshot.update_time) {
            debug!("holding back labels/{} emission behind local edits", focus.image.id);
            focus.deferred = Some(snapshot);
            return;
        }
        focus.deferred = None;
        self.replace_label(focus, &snapshot);
    }

    fn replace_label(&self, focus: &mut Focus, snapshot: &DocumentSnapshot) {
        if snapshot.exists() {
            focus.label = normalize_label(&focus.image.id, focus.image.age, &snapshot.to_value());
            self.set_state(SaveState::Saved);
        } else {
            focus.label = Label::default_for(focus.image.id.clone(), focus.image.age);
        }
        debug!("labels/{} replaced from store", focus.image.id);
    }

    fn listener_failed(&self, generation: u64, error: &Error) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.set_state(SaveState::Error(error.to_string()));
        }
    }

    /// Record the outcome of the write carrying edit `seq` of image `id`
    async fn finish_write(&self, id: &str, seq: u64, result: Result<DateTime<Utc>>) {
        let settled = {
            let mut progress = self.progress();
            let entry = progress.entry(id.to_string()).or_default();
            entry.concluded = entry.concluded.max(seq);
            if let Ok(stamp) = &result {
                entry.landed = entry.landed.max(Some(*stamp));
            }
            entry.settled()
        };

        match result {
            Ok(stamp) => {
                debug!("labels/{} written at {}", id, stamp);
                if !settled {
                    return;
                }
                let mut focus = self.focus.write().await;
                let Some(focus) = focus.as_mut().filter(|focus| focus.image.id == id) else {
                    return;
                };
                self.set_state(SaveState::Saved);
                if let Some(snapshot) = focus.deferred.take() {
                    if self.accepts(id, snapshot.update_time) {
                        self.replace_label(focus, &snapshot);
                    }
                }
            }
            Err(e) => {
                warn!("Failed to save labels/{}: {}", id, e);
                if self.is_focused(id).await {
                    self.set_state(SaveState::Error(e.to_string()));
                }
            }
        }
    }
}

/// One annotator's labeling session over a document store
pub struct LabelSession<S: DocumentStore> {
    store: S,
    identity: Identity,
    shared: Arc<Shared>,
    listener: Mutex<Option<CancellationToken>>,
    reviewed_map: Option<ReviewedMap>,
}

impl<S: DocumentStore> LabelSession<S> {
    pub fn new(store: S, identity: Identity, debounce: Duration) -> Self {
        let (state, _) = watch::channel(SaveState::Idle);
        Self {
            store,
            identity,
            shared: Arc::new(Shared {
                focus: RwLock::new(None),
                generation: AtomicU64::new(0),
                progress: Mutex::new(HashMap::new()),
                state,
                debouncer: Debouncer::new(debounce),
            }),
            listener: Mutex::new(None),
            reviewed_map: None,
        }
    }

    /// Push local reviewed toggles into `map`
    pub fn with_reviewed_map(mut self, map: ReviewedMap) -> Self {
        self.reviewed_map = Some(map);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Make `image` the focused image and start listening to its label
    pub async fn focus(&self, image: &ManifestImage) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut focus = self.shared.focus.write().await;
            *focus = Some(Focus {
                generation,
                image: image.clone(),
                label: Label::default_for(image.id.clone(), image.age),
                deferred: None,
            });
        }
        self.shared.set_state(SaveState::Idle);

        let cancel = CancellationToken::new();
        if let Some(previous) = self.swap_listener(Some(cancel.clone())) {
            previous.cancel();
        }

        let mut subscription = self.store.watch_document(LABELS, &image.id);
        let shared = Arc::clone(&self.shared);
        let id = image.id.clone();
        info!("Focused image {} (age {})", id, image.age);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    emission = subscription.next() => match emission {
                        Some(Ok(snapshot)) => shared.apply_remote(generation, snapshot).await,
                        Some(Err(e)) => {
                            warn!("Listener on labels/{} failed: {}", id, e);
                            shared.listener_failed(generation, &e);
                        }
                        None => break,
                    },
                }
            }
            debug!("listener for labels/{} stopped", id);
        });
    }

    /// Id of the focused image
    pub async fn focused_id(&self) -> Option<String> {
        self.shared
            .focus
            .read()
            .await
            .as_ref()
            .map(|focus| focus.image.id.clone())
    }

    /// Local label of the focused image
    pub async fn label(&self) -> Option<Label> {
        self.shared
            .focus
            .read()
            .await
            .as_ref()
            .map(|focus| focus.label.clone())
    }

    /// Number of checklist items set on the focused image
    pub async fn pass_count(&self) -> usize {
        self.label().await.map(|label| label.pass_count()).unwrap_or(0)
    }

    pub fn save_state(&self) -> SaveState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SaveState> {
        self.shared.state.subscribe()
    }

    /// Flip one checklist item; returns its new value
    pub async fn toggle_item(&self, key: &str) -> Result<bool> {
        let mut checked = false;
        self.edit(|label| {
            let current = label
                .items
                .get(key)
                .ok_or_else(|| Error::InvalidInput(format!("unknown checklist item: {}", key)))?;
            checked = !current;
            label.items.set(key, checked)
        })
        .await?;
        Ok(checked)
    }

    pub async fn set_item(&self, key: &str, checked: bool) -> Result<()> {
        self.edit(|label| label.items.set(key, checked)).await
    }

    pub async fn set_view(&self, view: ViewType) -> Result<()> {
        self.edit(|label| {
            label.view = view;
            Ok(())
        })
        .await
    }

    pub async fn set_reviewed(&self, reviewed: bool) -> Result<()> {
        let id = self.edit_returning_id(|label| {
            label.reviewed = reviewed;
            Ok(())
        })
        .await?;
        if let Some(map) = &self.reviewed_map {
            map.apply_local(&id, reviewed);
        }
        Ok(())
    }

    async fn edit(&self, change: impl FnOnce(&mut Label) -> Result<()>) -> Result<()> {
        self.edit_returning_id(change).await.map(|_| ())
    }

    /// Apply `change` to the local label and schedule its write
    ///
    /// A rejected change leaves the label and save state untouched.
    async fn edit_returning_id(&self, change: impl FnOnce(&mut Label) -> Result<()>) -> Result<String> {
        let (label, seq) = {
            let mut focus = self.shared.focus.write().await;
            let focus = focus
                .as_mut()
                .ok_or_else(|| Error::InvalidInput("no image is focused".to_string()))?;
            let mut edited = focus.label.clone();
            change(&mut edited)?;
            focus.label = edited.clone();
            let seq = self.shared.record_edit(&focus.image.id);
            (edited, seq)
        };

        self.shared.set_state(SaveState::Saving);
        let id = label.id.clone();
        self.schedule_write(label, seq);
        Ok(id)
    }

    fn schedule_write(&self, label: Label, seq: u64) {
        let store = self.store.clone();
        let shared = Arc::clone(&self.shared);
        let updated_by = self.identity.updated_by();
        let id = label.id.clone();

        self.shared.debouncer.schedule(&id, move || async move {
            let result = save_label(&store, &label, &updated_by).await;
            shared.finish_write(&label.id, seq, result).await;
        });
    }

    /// Whether an edit of `id` is still inside its quiet interval
    pub fn has_pending_write(&self, id: &str) -> bool {
        self.shared.debouncer.is_pending(id)
    }

    /// Whether any edit, of any image, has not yet reached the store
    ///
    /// Covers writes still waiting out their quiet interval and writes in
    /// flight. A failed write counts as concluded.
    pub fn has_outstanding_writes(&self) -> bool {
        self.shared.progress().values().any(|progress| !progress.settled())
    }

    /// Wait for every outstanding write to conclude, up to `limit`
    ///
    /// Returns false if writes were still outstanding when the limit ran out.
    pub async fn flush(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while self.has_outstanding_writes() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(FLUSH_POLL).await;
        }
        true
    }

    /// Detach the listener and cancel waiting writes
    ///
    /// Writes already dispatched still complete.
    pub fn shutdown(&self) {
        if let Some(listener) = self.swap_listener(None) {
            listener.cancel();
        }
        let pending = self.shared.debouncer.pending_count();
        if pending > 0 {
            warn!("Session closed with {} unsaved edit(s)", pending);
        }
        self.shared.debouncer.shutdown();
    }

    fn swap_listener(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut listener = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *listener, next)
    }
}

impl<S: DocumentStore> Drop for LabelSession<S> {
    fn drop(&mut self) {
        if let Some(listener) = self.swap_listener(None) {
            listener.cancel();
        }
        self.shared.debouncer.shutdown();
    }
}
