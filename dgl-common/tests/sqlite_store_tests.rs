//! SQLite document store on a temporary database file

use dgl_common::models::SCHEMA_VERSION;
use dgl_common::repo::{fetch_label, fetch_manifest, publish_manifest, save_label};
use dgl_common::store::{DocumentStore, DocumentWrite, SetMode, SqliteStore, LABELS};
use dgl_common::{Error, Label, Manifest, ManifestImage, Split, UpdatedBy, ViewType};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(50);

async fn open() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::connect(&dir.path().join("data").join("dgl.db"), POLL)
        .await
        .unwrap();
    (dir, store)
}

fn image(id: &str) -> ManifestImage {
    ManifestImage {
        id: id.to_string(),
        age: 9,
        path: format!("/images/9/{}.jpg", id),
        split: Some(Split::Test),
    }
}

fn writer() -> UpdatedBy {
    UpdatedBy {
        uid: "u1".to_string(),
        email: None,
        display_name: Some("Kim".to_string()),
    }
}

fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_update_requires_existing_document() {
    let (_dir, store) = open().await;
    let write = DocumentWrite::new(object(json!({"view": "front"})));
    let err = store.update(LABELS, "0001", write).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_merge_and_overwrite() {
    let (_dir, store) = open().await;
    store
        .set(LABELS, "0001", DocumentWrite::new(object(json!({"a": 1, "items": {"x": 1}}))), SetMode::Overwrite)
        .await
        .unwrap();
    store
        .set(LABELS, "0001", DocumentWrite::new(object(json!({"items": {"y": 1}}))), SetMode::Merge)
        .await
        .unwrap();
    let merged = store.get(LABELS, "0001").await.unwrap().to_value();
    assert_eq!(merged, json!({"a": 1, "items": {"x": 1, "y": 1}}));

    store
        .set(LABELS, "0001", DocumentWrite::new(object(json!({"b": 2}))), SetMode::Overwrite)
        .await
        .unwrap();
    assert_eq!(store.get(LABELS, "0001").await.unwrap().to_value(), json!({"b": 2}));
}

#[tokio::test]
async fn test_timestamps_increase_per_document() {
    let (_dir, store) = open().await;
    let mut previous = None;
    for n in 0..5 {
        let write = DocumentWrite::new(object(json!({"n": n})));
        let stamp = store.set(LABELS, "0002", write, SetMode::Overwrite).await.unwrap();
        if let Some(previous) = previous {
            assert!(stamp > previous);
        }
        previous = Some(stamp);
    }
}

#[tokio::test]
async fn test_label_and_manifest_round_trip() {
    let (_dir, store) = open().await;
    let manifest = Manifest {
        schema_version: SCHEMA_VERSION.to_string(),
        seed: None,
        images: vec![image("0001"), image("0002")],
    };
    publish_manifest(&store, &manifest).await.unwrap();
    assert_eq!(fetch_manifest(&store).await.unwrap(), manifest);

    let mut label = Label::default_for("0002", 9);
    label.view = ViewType::Mixed;
    label.items.set("m09_nose", true).unwrap();
    save_label(&store, &label, &writer()).await.unwrap();

    let stored = fetch_label(&store, &image("0002")).await.unwrap().unwrap();
    assert_eq!(stored.view, ViewType::Mixed);
    assert_eq!(stored.items, label.items);
    assert_eq!(stored.updated_by, Some(writer()));
    assert!(stored.updated_at.is_some());
}

#[tokio::test]
async fn test_listener_sees_writes_from_another_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dgl.db");
    let watcher = SqliteStore::connect(&path, POLL).await.unwrap();
    let writer_handle = SqliteStore::connect(&path, POLL).await.unwrap();

    let mut subscription = watcher.watch_document(LABELS, "0003");
    let first = subscription.next().await.unwrap().unwrap();
    assert!(!first.exists());

    writer_handle
        .set(LABELS, "0003", DocumentWrite::new(object(json!({"reviewed": true}))), SetMode::Merge)
        .await
        .unwrap();

    let next = tokio::time::timeout(Duration::from_secs(3), subscription.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(next.exists());
    assert_eq!(next.to_value()["reviewed"], json!(true));
}

#[tokio::test]
async fn test_concurrent_writers_on_one_file_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dgl.db");
    let first = SqliteStore::connect(&path, POLL).await.unwrap();
    let second = SqliteStore::connect(&path, POLL).await.unwrap();
    first
        .set(LABELS, "0005", DocumentWrite::new(object(json!({"items": {}}))), SetMode::Overwrite)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for n in 0..20 {
        let store = if n % 2 == 0 { first.clone() } else { second.clone() };
        tasks.push(tokio::spawn(async move {
            let mut items = serde_json::Map::new();
            items.insert(format!("k{:02}", n), json!(1));
            let write = DocumentWrite::new(object(json!({ "items": items })));
            store.set(LABELS, "0005", write, SetMode::Merge).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = first.get(LABELS, "0005").await.unwrap().to_value();
    assert_eq!(stored["items"].as_object().unwrap().len(), 20);
}

#[tokio::test]
async fn test_service_credential_registration() {
    let (_dir, store) = open().await;
    store.authenticate("first-secret").await.unwrap();
    store.authenticate("first-secret").await.unwrap();

    let err = store.authenticate("other-secret").await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dgl.db");
    {
        let store = SqliteStore::connect(&path, POLL).await.unwrap();
        save_label(&store, &Label::default_for("0004", 9), &writer()).await.unwrap();
    }
    let store = SqliteStore::connect(&path, POLL).await.unwrap();
    assert!(store.get(LABELS, "0004").await.unwrap().exists());
    assert_eq!(store.list(LABELS).await.unwrap().len(), 1);
}
