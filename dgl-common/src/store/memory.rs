//! In-memory document store
//!
//! Used by tests and demos in place of the SQLite backend. Supports fault
//! injection (failing reads or writes) and keeps a write log so callers can
//! assert exactly which writes reached the store.

use super::{merge_into, DocumentData, DocumentSnapshot, DocumentStore, DocumentWrite, SetMode};
use crate::events::{ChangeFeed, DocumentChanged};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
struct StoredDocument {
    data: DocumentData,
    update_time: DateTime<Utc>,
}

/// One write that reached the store
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub collection: String,
    pub id: String,
    /// Fields as written, server timestamps resolved
    pub fields: DocumentData,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, StoredDocument>>,
    write_log: Vec<WriteRecord>,
    failing_reads: HashSet<(String, String)>,
}

/// Document store held entirely in process memory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    feed: ChangeFeed,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            feed: ChangeFeed::default(),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a document half
        // written, so a poisoned lock is still safe to use.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every subsequent write fail until turned off again
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make point reads of one document fail
    pub fn fail_reads_of(&self, collection: &str, id: &str) {
        self.lock()
            .failing_reads
            .insert((collection.to_string(), id.to_string()));
    }

    /// Writes that reached the store, oldest first
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.lock().write_log.clone()
    }

    /// Writes to one document, oldest first
    pub fn writes_to(&self, collection: &str, id: &str) -> Vec<WriteRecord> {
        self.lock()
            .write_log
            .iter()
            .filter(|record| record.collection == collection && record.id == id)
            .cloned()
            .collect()
    }

    /// Store a raw document directly, bypassing the write log
    ///
    /// Lets tests seed malformed data that no writer would produce.
    pub fn insert_raw(&self, collection: &str, id: &str, value: Value) {
        let data = match value {
            Value::Object(map) => map,
            other => {
                let mut map = DocumentData::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let update_time = {
            let mut inner = self.lock();
            let docs = inner.collections.entry(collection.to_string()).or_default();
            let previous = docs.get(id).map(|doc| doc.update_time);
            let update_time = crate::time::next_server_timestamp(previous);
            docs.insert(id.to_string(), StoredDocument { data, update_time });
            update_time
        };
        self.announce(collection, id, update_time);
    }

    /// Remove a document; this system never deletes, other writers might
    pub fn delete(&self, collection: &str, id: &str) -> bool {
        let removed = self
            .lock()
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.announce(collection, id, crate::time::now());
        }
        removed
    }

    fn announce(&self, collection: &str, id: &str, update_time: DateTime<Utc>) {
        self.feed.emit_lossy(DocumentChanged {
            collection: collection.to_string(),
            id: id.to_string(),
            update_time,
        });
    }

    fn check_writable(&self, collection: &str, id: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!(
                "write to {}/{} rejected (injected failure)",
                collection, id
            )));
        }
        Ok(())
    }

    fn commit(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
        apply: impl FnOnce(Option<&StoredDocument>, DocumentData) -> Result<DocumentData>,
    ) -> Result<DateTime<Utc>> {
        let update_time = {
            let mut inner = self.lock();
            let docs = inner.collections.entry(collection.to_string()).or_default();
            let existing = docs.get(id);
            let update_time = crate::time::next_server_timestamp(existing.map(|doc| doc.update_time));
            let fields = write.resolve(&update_time);
            let data = apply(existing, fields.clone())?;
            docs.insert(id.to_string(), StoredDocument { data, update_time });
            inner.write_log.push(WriteRecord {
                collection: collection.to_string(),
                id: id.to_string(),
                fields,
                update_time,
            });
            update_time
        };
        self.announce(collection, id, update_time);
        Ok(update_time)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<DocumentSnapshot> {
        let inner = self.lock();
        if inner
            .failing_reads
            .contains(&(collection.to_string(), id.to_string()))
        {
            return Err(Error::Internal(format!(
                "read of {}/{} rejected (injected failure)",
                collection, id
            )));
        }
        let snapshot = inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|doc| DocumentSnapshot {
                id: id.to_string(),
                data: Some(doc.data.clone()),
                update_time: Some(doc.update_time),
            })
            .unwrap_or_else(|| DocumentSnapshot::missing(id));
        Ok(snapshot)
    }

    async fn list(&self, collection: &str) -> Result<Vec<DocumentSnapshot>> {
        let inner = self.lock();
        let snapshots = inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| DocumentSnapshot {
                        id: id.clone(),
                        data: Some(doc.data.clone()),
                        update_time: Some(doc.update_time),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(snapshots)
    }

    async fn update(&self, collection: &str, id: &str, write: DocumentWrite) -> Result<DateTime<Utc>> {
        self.check_writable(collection, id)?;
        self.commit(collection, id, write, |existing, fields| {
            let mut data = existing
                .map(|doc| doc.data.clone())
                .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;
            for (key, value) in fields {
                data.insert(key, value);
            }
            Ok(data)
        })
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
        mode: SetMode,
    ) -> Result<DateTime<Utc>> {
        self.check_writable(collection, id)?;
        self.commit(collection, id, write, |existing, fields| {
            Ok(match (mode, existing) {
                (SetMode::Merge, Some(doc)) => {
                    let mut data = doc.data.clone();
                    merge_into(&mut data, fields);
                    data
                }
                _ => fields,
            })
        })
    }

    fn changes(&self) -> broadcast::Receiver<DocumentChanged> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LABELS;
    use serde_json::json;
    use std::time::Duration;

    fn write(value: Value) -> DocumentWrite {
        DocumentWrite::from_serialize(&value).unwrap()
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(LABELS, "0001", write(json!({"view": "front"})))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.write_log().is_empty());
    }

    #[tokio::test]
    async fn test_set_then_update_replaces_fields() {
        let store = MemoryStore::new();
        store
            .set(LABELS, "0001", write(json!({"view": "front", "reviewed": false})), SetMode::Overwrite)
            .await
            .unwrap();
        store
            .update(LABELS, "0001", write(json!({"reviewed": true})))
            .await
            .unwrap();

        let snapshot = store.get(LABELS, "0001").await.unwrap();
        assert_eq!(snapshot.to_value(), json!({"view": "front", "reviewed": true}));
        assert_eq!(store.writes_to(LABELS, "0001").len(), 2);
    }

    #[tokio::test]
    async fn test_update_times_are_strictly_increasing() {
        let store = MemoryStore::new();
        let mut previous = None;
        for n in 0..20 {
            let stamp = store
                .set(LABELS, "0001", write(json!({ "n": n })), SetMode::Merge)
                .await
                .unwrap();
            if let Some(prev) = previous {
                assert!(stamp > prev);
            }
            previous = Some(stamp);
        }
    }

    #[tokio::test]
    async fn test_server_timestamp_field_matches_update_time() {
        let store = MemoryStore::new();
        let stamp = store
            .set(
                LABELS,
                "0001",
                write(json!({"id": "0001"})).with_server_timestamp("updatedAt"),
                SetMode::Overwrite,
            )
            .await
            .unwrap();
        let snapshot = store.get(LABELS, "0001").await.unwrap();
        assert_eq!(snapshot.update_time, Some(stamp));
        assert_eq!(
            snapshot.data.unwrap()["updatedAt"],
            json!(crate::time::to_rfc3339(&stamp))
        );
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store
            .set(LABELS, "0001", write(json!({})), SetMode::Merge)
            .await
            .is_err());
        store.set_fail_writes(false);
        assert!(store
            .set(LABELS, "0001", write(json!({})), SetMode::Merge)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_watch_document_emits_current_then_changes() {
        let store = MemoryStore::new();
        let mut sub = store.watch_document(LABELS, "0001");

        let first = sub.next().await.unwrap().unwrap();
        assert!(!first.exists());

        store
            .set(LABELS, "0001", write(json!({"view": "mixed"})), SetMode::Merge)
            .await
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.to_value(), json!({"view": "mixed"}));

        assert!(store.delete(LABELS, "0001"));
        let third = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!third.exists());
    }

    #[tokio::test]
    async fn test_watch_document_ignores_other_documents() {
        let store = MemoryStore::new();
        let mut sub = store.watch_document(LABELS, "0001");
        sub.next().await.unwrap().unwrap();

        store
            .set(LABELS, "0002", write(json!({"view": "mixed"})), SetMode::Merge)
            .await
            .unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(100), sub.next()).await;
        assert!(quiet.is_err(), "no emission expected for another document");
    }

    #[tokio::test]
    async fn test_watch_collection_emits_full_state() {
        let store = MemoryStore::new();
        store.insert_raw(LABELS, "0001", json!({"reviewed": true}));
        let mut sub = store.watch_collection(LABELS);

        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store.insert_raw(LABELS, "0002", json!({"reviewed": false}));
        let second = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let ids: Vec<&str> = second.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["0001", "0002"]);
    }

    #[tokio::test]
    async fn test_cancelled_watch_stops_emitting() {
        let store = MemoryStore::new();
        let mut sub = store.watch_document(LABELS, "0001");
        sub.next().await.unwrap().unwrap();
        sub.cancel();

        store.insert_raw(LABELS, "0001", json!({}));
        let next = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap();
        assert!(next.is_none());
    }
}
