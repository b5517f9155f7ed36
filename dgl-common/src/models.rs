//! Manifest, label and export models

use crate::catalog::{self, ITEM_COUNT};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Schema tag written into generated manifests
pub const SCHEMA_VERSION: &str = "dap_male_v1";

/// Dataset partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "train" => Some(Split::Train),
            "val" => Some(Split::Val),
            "test" => Some(Split::Test),
            _ => None,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewpoint of the drawn figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Front,
    Profile,
    Mixed,
    #[default]
    Unknown,
}

impl ViewType {
    pub const ALL: [ViewType; 4] = [
        ViewType::Front,
        ViewType::Profile,
        ViewType::Mixed,
        ViewType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Front => "front",
            ViewType::Profile => "profile",
            ViewType::Mixed => "mixed",
            ViewType::Unknown => "unknown",
        }
    }

    /// Exact match against the four literals
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|view| view.as_str() == value)
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image of the published manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestImage {
    /// Four-digit zero-padded identifier, also the label document id
    pub id: String,
    /// Age bucket (4..=11)
    pub age: u8,
    /// Asset locator, e.g. `/images/4/0123.jpg`
    pub path: String,
    /// Assigned split; absent until the sampler assigns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<Split>,
}

impl ManifestImage {
    /// Numeric value of the identifier, used for ordering
    pub fn numeric_id(&self) -> u32 {
        self.id.parse().unwrap_or(u32::MAX)
    }
}

/// Published list of corpus images and their split assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: String,
    #[serde(default)]
    pub seed: Option<u32>,
    pub images: Vec<ManifestImage>,
}

impl Manifest {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|image| image.id.as_str())
    }

    pub fn find(&self, id: &str) -> Option<&ManifestImage> {
        self.images.iter().find(|image| image.id == id)
    }
}

/// Checklist values, one per catalog item, always complete
///
/// Serialized as a JSON object in catalog order with values 0 or 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemValues([bool; ITEM_COUNT]);

impl ItemValues {
    /// All items unchecked
    pub fn empty() -> Self {
        Self([false; ITEM_COUNT])
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        catalog::index_of(key).map(|index| self.0[index])
    }

    /// Set one item; unknown keys are rejected
    pub fn set(&mut self, key: &str, checked: bool) -> Result<()> {
        let index = catalog::index_of(key)
            .ok_or_else(|| Error::InvalidInput(format!("unknown checklist item: {}", key)))?;
        self.0[index] = checked;
        Ok(())
    }

    pub(crate) fn set_index(&mut self, index: usize, checked: bool) {
        self.0[index] = checked;
    }

    /// Number of checked items
    pub fn pass_count(&self) -> usize {
        self.0.iter().filter(|checked| **checked).count()
    }

    /// `(key, 0|1)` pairs in catalog order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u8)> + '_ {
        catalog::keys().zip(self.0.iter().map(|checked| u8::from(*checked)))
    }
}

impl Default for ItemValues {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ItemValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Serialize for ItemValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ITEM_COUNT))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ItemValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(crate::normalize::normalize_items(Some(&raw)))
    }
}

/// Who last wrote a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedBy {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Signed-in user as supplied by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Attribution stamped on every label write
    pub fn updated_by(&self) -> UpdatedBy {
        UpdatedBy {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }

    /// Display name, falling back to email, then uid
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

/// Role stored in the `users` collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Annotator,
    Admin,
}

/// One annotator's checklist result for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub age: u8,
    pub view: ViewType,
    pub items: ItemValues,
    pub reviewed: bool,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_timestamp"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UpdatedBy>,
}

impl Label {
    /// Label shown before anything has been saved for an image
    pub fn default_for(id: impl Into<String>, age: u8) -> Self {
        Self {
            id: id.into(),
            age,
            view: ViewType::Unknown,
            items: ItemValues::empty(),
            reviewed: false,
            updated_at: None,
            updated_by: None,
        }
    }

    pub fn pass_count(&self) -> usize {
        self.items.pass_count()
    }
}

fn serialize_timestamp<S: Serializer>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(timestamp) => serializer.serialize_str(&crate::time::to_rfc3339(timestamp)),
        None => serializer.serialize_none(),
    }
}

/// One row of the bulk export
///
/// Field order is the serialized key order of both export renderings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub id: String,
    pub age: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<Split>,
    pub view: ViewType,
    pub reviewed: bool,
    pub items: ItemValues,
    pub missing: bool,
}

impl ExportRow {
    /// Placeholder row for an image with no stored label
    pub fn missing(image: &ManifestImage) -> Self {
        Self {
            id: image.id.clone(),
            age: image.age,
            split: image.split,
            view: ViewType::Unknown,
            reviewed: false,
            items: ItemValues::empty(),
            missing: true,
        }
    }

    /// Row built from a normalized label
    pub fn from_label(image: &ManifestImage, label: Label) -> Self {
        Self {
            id: label.id,
            age: image.age,
            split: image.split,
            view: label.view,
            reviewed: label.reviewed,
            items: label.items,
            missing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_values_serialize_in_catalog_order() {
        let mut items = ItemValues::empty();
        items.set("m02_neck", true).unwrap();

        let text = serde_json::to_string(&items).unwrap();
        assert!(text.starts_with(r#"{"m01_head":0,"m02_neck":1,"m03_neck_plane":0"#));
        assert!(text.ends_with(r#""m60_limb_motion":0}"#));
    }

    #[test]
    fn test_item_values_rejects_unknown_key() {
        let mut items = ItemValues::empty();
        let err = items.set("m99_wings", true).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(items, ItemValues::empty());
    }

    #[test]
    fn test_item_values_deserialize_is_defensive() {
        let items: ItemValues =
            serde_json::from_value(json!({"m01_head": 1, "m02_neck": true, "extra": 1})).unwrap();
        assert_eq!(items.get("m01_head"), Some(true));
        assert_eq!(items.get("m02_neck"), Some(false));
        assert_eq!(items.pass_count(), 1);
    }

    #[test]
    fn test_view_type_parse_is_exact() {
        assert_eq!(ViewType::parse("front"), Some(ViewType::Front));
        assert_eq!(ViewType::parse("Front"), None);
        assert_eq!(ViewType::parse("frontal"), None);
    }

    #[test]
    fn test_manifest_image_omits_missing_split() {
        let image = ManifestImage {
            id: "0007".to_string(),
            age: 5,
            path: "/images/5/0007.jpg".to_string(),
            split: None,
        };
        let value = serde_json::to_value(&image).unwrap();
        assert_eq!(value, json!({"id": "0007", "age": 5, "path": "/images/5/0007.jpg"}));
    }

    #[test]
    fn test_export_row_key_order() {
        let image = ManifestImage {
            id: "0001".to_string(),
            age: 4,
            path: "/images/4/0001.jpg".to_string(),
            split: Some(Split::Val),
        };
        let text = serde_json::to_string(&ExportRow::missing(&image)).unwrap();
        assert!(text.starts_with(
            r#"{"id":"0001","age":4,"split":"val","view":"unknown","reviewed":false,"items":{"#
        ));
        assert!(text.ends_with(r#""missing":true}"#));
    }

    #[test]
    fn test_identity_label_fallbacks() {
        assert_eq!(Identity::new("u1").label(), "u1");
        assert_eq!(Identity::new("u1").with_email("a@b.c").label(), "a@b.c");
        assert_eq!(
            Identity::new("u1")
                .with_email("a@b.c")
                .with_display_name("Ana")
                .label(),
            "Ana"
        );
    }
}
