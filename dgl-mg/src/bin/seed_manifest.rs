//! dgl-seed-manifest - publish the manifest file as `manifests/default`
//!
//! Requires the service credential in `DGL_SERVICE_CREDENTIAL`.

use anyhow::{Context, Result};
use clap::Parser;
use dgl_common::config::{service_credential, DglConfig};
use dgl_common::repo::publish_manifest;
use dgl_common::store::SqliteStore;
use dgl_mg::manifest_file::read_manifest;
use dgl_mg::validator::validate;
use std::path::PathBuf;
use tracing::{info, warn};

/// Manifest publisher
#[derive(Parser, Debug)]
#[command(name = "dgl-seed-manifest")]
#[command(about = "Publish the generated manifest to the document store")]
struct Args {
    /// Manifest file to publish
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Document store database file
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = DglConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting dgl-seed-manifest v{}", env!("CARGO_PKG_VERSION"));

    let manifest_path = args.manifest.unwrap_or(config.manifest_path.clone());
    let manifest = read_manifest(&manifest_path)?;
    if let Err(e) = validate(&manifest.images) {
        warn!("Publishing a manifest that does not validate: {}", e);
    }

    let credential = service_credential()?;
    let store_path = args.store.unwrap_or(config.store_path.clone());
    let store = SqliteStore::connect(&store_path, config.poll_interval())
        .await
        .with_context(|| format!("Failed to open document store {}", store_path.display()))?;
    store
        .authenticate(&credential)
        .await
        .context("Service credential rejected")?;

    publish_manifest(&store, &manifest)
        .await
        .context("Failed to publish manifests/default")?;

    let seed = manifest
        .seed
        .map(|seed| seed.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!(
        "Published manifests/default (images={}, seed={})",
        manifest.images.len(),
        seed
    );
    Ok(())
}
