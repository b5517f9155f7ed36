//! Normalization of stored documents
//!
//! Everything read back from the document store passes through here. The
//! functions are total: malformed, partial or foreign data degrades to
//! defaults instead of producing an error, so one bad record cannot block
//! the rest of the corpus.

use crate::catalog::ITEMS;
use crate::models::{
    ItemValues, Label, Manifest, ManifestImage, Role, Split, UpdatedBy, ViewType, SCHEMA_VERSION,
};
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Canonical label for image `id` from an arbitrary stored document
pub fn normalize_label(id: &str, age: u8, raw: &Value) -> Label {
    let Some(fields) = raw.as_object() else {
        return Label::default_for(id, age);
    };

    Label {
        id: id.to_string(),
        age,
        view: normalize_view(fields.get("view")),
        items: normalize_items(fields.get("items")),
        reviewed: normalize_reviewed(fields.get("reviewed")),
        updated_at: fields
            .get("updatedAt")
            .and_then(Value::as_str)
            .and_then(crate::time::parse_rfc3339),
        updated_by: normalize_updated_by(fields.get("updatedBy")),
    }
}

/// One of the four view literals, otherwise `unknown`
pub fn normalize_view(raw: Option<&Value>) -> ViewType {
    raw.and_then(Value::as_str)
        .and_then(ViewType::parse)
        .unwrap_or(ViewType::Unknown)
}

/// Only a JSON `true` counts as reviewed
pub fn normalize_reviewed(raw: Option<&Value>) -> bool {
    matches!(raw, Some(Value::Bool(true)))
}

/// Rebuild the item map from the catalog; only the number 1 counts as checked
pub fn normalize_items(raw: Option<&Value>) -> ItemValues {
    let mut items = ItemValues::empty();
    let Some(source) = raw.and_then(Value::as_object) else {
        return items;
    };

    for (index, item) in ITEMS.iter().enumerate() {
        let checked = source
            .get(item.key)
            .and_then(Value::as_f64)
            .is_some_and(|value| value == 1.0);
        items.set_index(index, checked);
    }
    items
}

/// Attribution block; absent unless the raw value is an object
pub fn normalize_updated_by(raw: Option<&Value>) -> Option<UpdatedBy> {
    let fields = raw?.as_object()?;
    Some(UpdatedBy {
        uid: string_field(fields, "uid").unwrap_or_default(),
        email: string_field(fields, "email"),
        display_name: string_field(fields, "displayName"),
    })
}

/// Role from a `users` document; anything unrecognized is no role
pub fn normalize_role(raw: &Value) -> Option<Role> {
    match raw.get("role").and_then(Value::as_str) {
        Some("annotator") => Some(Role::Annotator),
        Some("admin") => Some(Role::Admin),
        _ => None,
    }
}

/// Canonical manifest from the published `manifests/default` document
///
/// Only a missing `images` array is an error; individual entries are
/// coerced field by field.
pub fn normalize_manifest(raw: &Value) -> Result<Manifest> {
    let images = raw
        .get("images")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidInput("manifest images is not an array".to_string()))?;

    let images = images
        .iter()
        .filter_map(Value::as_object)
        .map(normalize_manifest_image)
        .collect();

    Ok(Manifest {
        schema_version: raw
            .get("schema_version")
            .and_then(Value::as_str)
            .unwrap_or(SCHEMA_VERSION)
            .to_string(),
        seed: raw
            .get("seed")
            .and_then(Value::as_u64)
            .and_then(|seed| u32::try_from(seed).ok()),
        images,
    })
}

fn normalize_manifest_image(row: &Map<String, Value>) -> ManifestImage {
    let id = row.get("id").map(scalar_to_string).unwrap_or_default();

    ManifestImage {
        id: format!("{:0>4}", id),
        age: row
            .get("age")
            .map_or(Some(0.0), scalar_to_number)
            .filter(|age| age.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(age))
            .map_or(0, |age| age as u8),
        path: row.get("path").map(scalar_to_string).unwrap_or_default(),
        split: row.get("split").and_then(Value::as_str).and_then(Split::parse),
    }
}

/// Text form of a scalar, the way manifest rows were written by hand
///
/// Integral floats lose their fraction (`7.0` is `"7"`); `null`, arrays and
/// objects give an empty string.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) if number.is_i64() || number.is_u64() => number.to_string(),
        Value::Number(number) => match number.as_f64() {
            Some(float) if float.fract() == 0.0 && float.abs() < 1e21 => format!("{}", float as i128),
            Some(float) => float.to_string(),
            None => number.to_string(),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Numeric value of a scalar; None when it has no numeric reading
///
/// Strings are trimmed (blank reads as 0, `0x` prefixes as hex), booleans
/// read as 1 and 0, `null` as 0.
fn scalar_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Some(0.0);
            }
            if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                return u64::from_str_radix(hex, 16).ok().map(|n| n as f64);
            }
            text.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}
