//! Manifest file I/O
//!
//! The manifest is written as two-space indented JSON followed by a newline.
//! Reading normalizes the document and insists on exactly 200 images, which
//! is what the seeding tool publishes.

use crate::strata::MANIFEST_SIZE;
use dgl_common::normalize::normalize_manifest;
use dgl_common::Manifest;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Manifest file errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest file not found: {0}; run dgl-build-manifest first")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Manifest {path} must hold {expected} images, found {actual}")]
    WrongImageCount {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

/// Pretty JSON with a trailing newline
pub fn render_manifest(manifest: &Manifest) -> Result<String, serde_json::Error> {
    let mut text = serde_json::to_string_pretty(manifest)?;
    text.push('\n');
    Ok(text)
}

/// Write `manifest` to `path`, creating parent directories
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    let io_error = |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
    }

    let text = render_manifest(manifest).map_err(|e| ManifestError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, text).map_err(io_error)?;
    debug!("Wrote {} images to {}", manifest.images.len(), path.display());
    Ok(())
}

/// Read, normalize and size-check a manifest file
pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    if !path.is_file() {
        return Err(ManifestError::NotFound(path.to_path_buf()));
    }

    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = |reason: String| ManifestError::Malformed {
        path: path.to_path_buf(),
        reason,
    };
    let raw: serde_json::Value = serde_json::from_str(&text).map_err(|e| malformed(e.to_string()))?;
    let manifest = normalize_manifest(&raw).map_err(|e| malformed(e.to_string()))?;

    if manifest.images.len() != MANIFEST_SIZE {
        return Err(ManifestError::WrongImageCount {
            path: path.to_path_buf(),
            expected: MANIFEST_SIZE,
            actual: manifest.images.len(),
        });
    }
    Ok(manifest)
}
