//! Typed reads and writes on top of [`DocumentStore`]
//!
//! Every read goes through [`crate::normalize`], so callers only ever see
//! canonical manifests, labels and roles.

use crate::models::{Label, Manifest, ManifestImage, Role, UpdatedBy};
use crate::normalize::{normalize_label, normalize_manifest, normalize_role};
use crate::store::{
    DocumentStore, DocumentWrite, SetMode, DEFAULT_MANIFEST_ID, LABELS, MANIFESTS, USERS,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Load the active manifest (`manifests/default`)
pub async fn fetch_manifest<S: DocumentStore>(store: &S) -> Result<Manifest> {
    let snapshot = store.get(MANIFESTS, DEFAULT_MANIFEST_ID).await?;
    if !snapshot.exists() {
        return Err(Error::NotFound(format!(
            "{}/{} does not exist; publish a manifest first",
            MANIFESTS, DEFAULT_MANIFEST_ID
        )));
    }
    normalize_manifest(&snapshot.to_value())
}

/// Publish `manifest` as the single active manifest record
pub async fn publish_manifest<S: DocumentStore>(store: &S, manifest: &Manifest) -> Result<DateTime<Utc>> {
    let write = DocumentWrite::from_serialize(manifest)?.with_server_timestamp("updatedAt");
    store
        .set(MANIFESTS, DEFAULT_MANIFEST_ID, write, SetMode::Overwrite)
        .await
}

/// Stored label for `image`, or None when nothing was saved yet
pub async fn fetch_label<S: DocumentStore>(store: &S, image: &ManifestImage) -> Result<Option<Label>> {
    let snapshot = store.get(LABELS, &image.id).await?;
    Ok(snapshot
        .exists()
        .then(|| normalize_label(&image.id, image.age, &snapshot.to_value())))
}

/// Persisted body of a label write
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelPayload<'a> {
    id: &'a str,
    age: u8,
    view: crate::models::ViewType,
    reviewed: bool,
    items: crate::models::ItemValues,
    updated_by: &'a UpdatedBy,
}

/// Persist `label` on behalf of `updated_by`
///
/// Tries an in-place update first and falls back to a create-or-merge write
/// when the document does not exist yet. `updatedAt` is always assigned by
/// the store.
pub async fn save_label<S: DocumentStore>(
    store: &S,
    label: &Label,
    updated_by: &UpdatedBy,
) -> Result<DateTime<Utc>> {
    let payload = LabelPayload {
        id: &label.id,
        age: label.age,
        view: label.view,
        reviewed: label.reviewed,
        items: label.items,
        updated_by,
    };
    let write = DocumentWrite::from_serialize(&payload)?.with_server_timestamp("updatedAt");

    match store.update(LABELS, &label.id, write.clone()).await {
        Err(e) if e.is_not_found() => {
            debug!("labels/{} does not exist yet, creating it", label.id);
            store.set(LABELS, &label.id, write, SetMode::Merge).await
        }
        other => other,
    }
}

/// Role recorded for `uid`, if any
pub async fn fetch_user_role<S: DocumentStore>(store: &S, uid: &str) -> Result<Option<Role>> {
    let snapshot = store.get(USERS, uid).await?;
    Ok(snapshot
        .data
        .as_ref()
        .and_then(|_| normalize_role(&snapshot.to_value())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Split, ViewType};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn image(id: &str, age: u8) -> ManifestImage {
        ManifestImage {
            id: id.to_string(),
            age,
            path: format!("/images/{}/{}.jpg", age, id),
            split: Some(Split::Train),
        }
    }

    fn annotator() -> UpdatedBy {
        UpdatedBy {
            uid: "u1".to_string(),
            email: Some("ana@example.org".to_string()),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_manifest_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = fetch_manifest(&store).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_publish_then_fetch_manifest() {
        let store = MemoryStore::new();
        let manifest = Manifest {
            schema_version: "dap_male_v1".to_string(),
            seed: Some(7),
            images: vec![image("0001", 4), image("0002", 5)],
        };
        publish_manifest(&store, &manifest).await.unwrap();

        let stored = store.get(MANIFESTS, DEFAULT_MANIFEST_ID).await.unwrap();
        assert!(stored.data.as_ref().unwrap().contains_key("updatedAt"));
        assert_eq!(fetch_manifest(&store).await.unwrap(), manifest);
    }

    #[tokio::test]
    async fn test_save_label_creates_then_updates() {
        let store = MemoryStore::new();
        let mut label = Label::default_for("0001", 4);
        label.view = ViewType::Front;
        save_label(&store, &label, &annotator()).await.unwrap();

        label.reviewed = true;
        save_label(&store, &label, &annotator()).await.unwrap();

        let writes = store.writes_to(LABELS, "0001");
        assert_eq!(writes.len(), 2);

        let stored = fetch_label(&store, &image("0001", 4)).await.unwrap().unwrap();
        assert_eq!(stored.view, ViewType::Front);
        assert!(stored.reviewed);
        assert_eq!(stored.updated_by, Some(annotator()));
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_save_label_replaces_whole_items_map() {
        let store = MemoryStore::new();
        store.insert_raw(LABELS, "0001", json!({"items": {"m01_head": 1, "legacy": 1}}));

        let label = Label::default_for("0001", 4);
        save_label(&store, &label, &annotator()).await.unwrap();

        let stored = store.get(LABELS, "0001").await.unwrap().to_value();
        assert_eq!(stored["items"]["m01_head"], json!(0));
        assert!(stored["items"].get("legacy").is_none());
    }

    #[tokio::test]
    async fn test_save_label_propagates_write_failure() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let result = save_label(&store, &Label::default_for("0001", 4), &annotator()).await;
        assert!(result.is_err());
        assert!(store.write_log().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_label_absent() {
        let store = MemoryStore::new();
        assert_eq!(fetch_label(&store, &image("0003", 6)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_user_role() {
        let store = MemoryStore::new();
        store.insert_raw(USERS, "boss", json!({"role": "admin"}));
        store.insert_raw(USERS, "odd", json!({"role": 1}));

        assert_eq!(fetch_user_role(&store, "boss").await.unwrap(), Some(Role::Admin));
        assert_eq!(fetch_user_role(&store, "odd").await.unwrap(), None);
        assert_eq!(fetch_user_role(&store, "nobody").await.unwrap(), None);
    }
}
