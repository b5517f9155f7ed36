//! # dgl-mg (Manifest Generator)
//!
//! Deterministic stratified sampling of the image corpus into a 200-image
//! manifest with fixed train/val/test totals, plus the manifest file format
//! shared by the build and seed tools.

pub mod manifest_file;
pub mod sampler;
pub mod strata;
pub mod summary;
pub mod validator;

pub use manifest_file::ManifestError;
pub use sampler::{DirectoryImageSource, ImageSource, InMemoryImageSource, SampleError};
pub use validator::{SplitTotals, ValidationError};

use dgl_common::models::SCHEMA_VERSION;
use dgl_common::Manifest;
use thiserror::Error;
use tracing::info;

/// Manifest generation errors
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Sample and validate a manifest for `seed`
pub fn build_manifest<S: ImageSource + ?Sized>(seed: u32, source: &S) -> Result<Manifest, BuildError> {
    let images = sampler::sample(seed, source)?;
    let totals = validator::validate(&images)?;
    info!("Sampled {} images with seed {} ({})", images.len(), seed, totals);

    Ok(Manifest {
        schema_version: SCHEMA_VERSION.to_string(),
        seed: Some(seed),
        images,
    })
}
