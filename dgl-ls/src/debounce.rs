//! Per-key debounced task scheduling
//!
//! Each key has at most one waiting timer. Scheduling again for the same key
//! cancels the waiting timer and starts a new quiet interval, so only the
//! last action of a burst runs. Once a timer fires its action is dispatched
//! and can no longer be cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct PendingTimer {
    seq: u64,
    cancel: CancellationToken,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingTimer>>>;

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: PendingMap,
    next_seq: AtomicU64,
    shutdown: CancellationToken,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Run `action` for `key` after the quiet interval, superseding any
    /// timer still waiting for the same key
    pub fn schedule<F, Fut>(&self, key: &str, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            debug!("debouncer shut down, dropping action for {}", key);
            return;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let superseded = lock(&self.pending).insert(
            key.to_string(),
            PendingTimer {
                seq,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = superseded {
            previous.cancel.cancel();
        }

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        let key = key.to_string();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            {
                let mut pending = lock(&pending);
                let current = pending.get(&key).is_some_and(|timer| timer.seq == seq);
                if !current || cancel.is_cancelled() {
                    return;
                }
                pending.remove(&key);
            }

            debug!("debounce elapsed for {}, dispatching", key);
            action().await;
        });
    }

    /// Whether a timer is still waiting for `key`
    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Cancel every waiting timer and refuse new ones
    ///
    /// Actions already dispatched keep running.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        lock(&self.pending).clear();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock(pending: &Mutex<HashMap<String, PendingTimer>>) -> MutexGuard<'_, HashMap<String, PendingTimer>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
