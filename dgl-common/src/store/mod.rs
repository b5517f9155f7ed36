//! Document store abstraction
//!
//! A small document-collection interface: point reads and writes keyed by
//! `(collection, id)`, store-assigned write timestamps, and change listeners
//! for single documents and whole collections. Callers receive the store as
//! an explicit handle (`S: DocumentStore`), so tests substitute
//! [`MemoryStore`] for the durable [`SqliteStore`].

mod memory;
#[cfg(feature = "sqlx")]
mod sqlite;
mod watch;

pub use memory::MemoryStore;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteStore;

use crate::events::DocumentChanged;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Collection holding the single published manifest
pub const MANIFESTS: &str = "manifests";
/// Id of the active manifest document
pub const DEFAULT_MANIFEST_ID: &str = "default";
/// Collection holding one label document per image id
pub const LABELS: &str = "labels";
/// Collection holding per-user profile records (role)
pub const USERS: &str = "users";

/// Top-level fields of a stored document
pub type DocumentData = Map<String, Value>;

/// Current state of one document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    /// None when the document does not exist
    pub data: Option<DocumentData>,
    /// Store-assigned timestamp of the last write
    pub update_time: Option<DateTime<Utc>>,
}

impl DocumentSnapshot {
    pub fn missing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
            update_time: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    /// Document body as a JSON value (`null` when missing)
    pub fn to_value(&self) -> Value {
        self.data.clone().map(Value::Object).unwrap_or(Value::Null)
    }

    fn fingerprint(&self) -> (bool, Option<DateTime<Utc>>) {
        (self.exists(), self.update_time)
    }
}

/// How `set` treats an existing document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document
    Overwrite,
    /// Create if missing, otherwise deep-merge the given fields
    Merge,
}

/// Field values for a write, plus fields the store fills with its own clock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentWrite {
    fields: DocumentData,
    server_timestamp_fields: Vec<String>,
}

impl DocumentWrite {
    pub fn new(fields: DocumentData) -> Self {
        Self {
            fields,
            server_timestamp_fields: Vec::new(),
        }
    }

    /// Build from a value that must serialize to a JSON object
    pub fn from_serialize<T: serde::Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(crate::Error::InvalidInput(format!(
                "document body must be an object, got {}",
                other
            ))),
        }
    }

    /// Fill `field` with the store-assigned write timestamp
    pub fn with_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamp_fields.push(field.into());
        self
    }

    pub fn fields(&self) -> &DocumentData {
        &self.fields
    }

    /// Final field values once the store has chosen the write timestamp
    pub fn resolve(self, timestamp: &DateTime<Utc>) -> DocumentData {
        let mut fields = self.fields;
        let stamp = crate::time::to_rfc3339(timestamp);
        for field in self.server_timestamp_fields {
            fields.insert(field, Value::String(stamp.clone()));
        }
        fields
    }
}

/// Recursively merge `patch` into `target`; objects merge, everything else replaces
pub fn merge_into(target: &mut DocumentData, patch: DocumentData) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Cancellable stream of listener emissions
///
/// Dropping the subscription detaches the listener.
#[derive(Debug)]
pub struct Subscription<T> {
    id: Uuid,
    rx: mpsc::Receiver<Result<T>>,
    cancel: CancellationToken,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<Result<T>>, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            rx,
            cancel,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next emission; None once the listener has stopped
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Durable key-value document collections with change notification
#[async_trait]
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Point read
    async fn get(&self, collection: &str, id: &str) -> Result<DocumentSnapshot>;

    /// All existing documents of a collection, ordered by id
    async fn list(&self, collection: &str) -> Result<Vec<DocumentSnapshot>>;

    /// Replace the given top-level fields of an existing document
    ///
    /// Fails with [`crate::Error::NotFound`] when the document does not exist.
    async fn update(&self, collection: &str, id: &str, write: DocumentWrite) -> Result<DateTime<Utc>>;

    /// Create or replace (or merge into) a document
    async fn set(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
        mode: SetMode,
    ) -> Result<DateTime<Utc>>;

    /// Receiver of in-process write notices
    fn changes(&self) -> broadcast::Receiver<DocumentChanged>;

    /// Re-read interval for listeners, for backends written to by other processes
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    /// Listen to one document; emits its current state first, then every change
    fn watch_document(&self, collection: &str, id: &str) -> Subscription<DocumentSnapshot> {
        watch::watch_document(self.clone(), collection.to_string(), id.to_string())
    }

    /// Listen to a whole collection; every emission is the full current state
    fn watch_collection(&self, collection: &str) -> Subscription<Vec<DocumentSnapshot>> {
        watch::watch_collection(self.clone(), collection.to_string())
    }
}
