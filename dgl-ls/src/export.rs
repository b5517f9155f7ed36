//! Bulk export of gold labels
//!
//! Reads every manifest image's label concurrently and renders the rows as
//! a pretty JSON array and as JSON Lines. Both renderings hold the same rows
//! in manifest order with the same key order.

use dgl_common::auth::AdminPolicy;
use dgl_common::repo::{fetch_label, fetch_manifest};
use dgl_common::store::DocumentStore;
use dgl_common::{ExportRow, Identity, ManifestImage, Result};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const JSON_FILE_NAME: &str = "gold_labels.json";
pub const JSONL_FILE_NAME: &str = "gold_labels.jsonl";

/// Rows of one export run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// One row per manifest image, in manifest order
    pub rows: Vec<ExportRow>,
    /// Ids whose read failed; exported as missing
    pub failed: Vec<String>,
}

impl ExportReport {
    pub fn missing_count(&self) -> usize {
        self.rows.iter().filter(|row| row.missing).count()
    }

    pub fn reviewed_count(&self) -> usize {
        self.rows.iter().filter(|row| row.reviewed).count()
    }
}

/// Read and normalize the label of every image
pub async fn build_export<S: DocumentStore>(store: &S, images: &[ManifestImage]) -> ExportReport {
    let reads = images
        .iter()
        .map(|image| async move { (image, fetch_label(store, image).await) });

    let mut report = ExportReport::default();
    for (image, result) in join_all(reads).await {
        let row = match result {
            Ok(Some(label)) => ExportRow::from_label(image, label),
            Ok(None) => ExportRow::missing(image),
            Err(e) => {
                warn!("Failed to read labels/{}, exporting it as missing: {}", image.id, e);
                report.failed.push(image.id.clone());
                ExportRow::missing(image)
            }
        };
        report.rows.push(row);
    }
    report
}

/// Pretty JSON array with a trailing newline
pub fn render_json(rows: &[ExportRow]) -> Result<String> {
    let mut text = serde_json::to_string_pretty(rows)?;
    text.push('\n');
    Ok(text)
}

/// One compact JSON object per line, newline terminated
pub fn render_jsonl(rows: &[ExportRow]) -> Result<String> {
    let lines = rows
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

/// Files written by [`write_export`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFiles {
    pub json: PathBuf,
    pub jsonl: PathBuf,
}

/// Write both renderings into `dir`, creating it if needed
pub fn write_export(dir: &Path, rows: &[ExportRow]) -> Result<ExportFiles> {
    std::fs::create_dir_all(dir)?;
    let files = ExportFiles {
        json: dir.join(JSON_FILE_NAME),
        jsonl: dir.join(JSONL_FILE_NAME),
    };
    std::fs::write(&files.json, render_json(rows)?)?;
    std::fs::write(&files.jsonl, render_jsonl(rows)?)?;
    Ok(files)
}

/// Authorize `identity`, then export the published manifest into `dir`
pub async fn export_gold_labels<S: DocumentStore>(
    store: &S,
    policy: &AdminPolicy,
    identity: &Identity,
    dir: &Path,
) -> Result<(ExportReport, ExportFiles)> {
    policy.authorize(store, identity).await?;

    let manifest = fetch_manifest(store).await?;
    info!("Exporting labels for {} images", manifest.images.len());

    let report = build_export(store, &manifest.images).await;
    let files = write_export(dir, &report.rows)?;
    info!(
        "Wrote {} rows ({} missing) to {} and {}",
        report.rows.len(),
        report.missing_count(),
        files.json.display(),
        files.jsonl.display()
    );
    Ok((report, files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgl_common::{Split, ViewType};

    fn row(id: &str, missing: bool) -> ExportRow {
        let image = ManifestImage {
            id: id.to_string(),
            age: 9,
            path: format!("/images/9/{}.jpg", id),
            split: Some(Split::Train),
        };
        let mut row = ExportRow::missing(&image);
        row.missing = missing;
        if !missing {
            row.view = ViewType::Profile;
        }
        row
    }

    #[test]
    fn test_jsonl_one_row_per_line() {
        let rows = vec![row("0001", false), row("0002", true)];
        let text = render_jsonl(&rows).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(text.ends_with("}\n"));
        assert!(lines[0].starts_with(r#"{"id":"0001","age":9,"split":"train","view":"profile""#));
    }

    #[test]
    fn test_renderings_hold_same_rows() {
        let rows = vec![row("0003", true), row("0001", false)];
        let from_json: serde_json::Value = serde_json::from_str(&render_json(&rows).unwrap()).unwrap();
        let from_jsonl: Vec<serde_json::Value> = render_jsonl(&rows)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(from_json, serde_json::Value::Array(from_jsonl));
        assert!(render_json(&rows).unwrap().ends_with("]\n"));
    }

    #[test]
    fn test_empty_export() {
        assert_eq!(render_json(&[]).unwrap(), "[]\n");
        assert_eq!(render_jsonl(&[]).unwrap(), "\n");
    }
}
