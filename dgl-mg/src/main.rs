//! dgl-build-manifest - generate the stratified 200-image manifest
//!
//! Samples `<assets>/<age>/NNNN.jpg` for ages 4 through 11, validates the
//! split totals, writes the manifest file and prints a per-age summary.

use anyhow::{Context, Result};
use clap::Parser;
use dgl_common::config::DglConfig;
use dgl_mg::manifest_file::write_manifest;
use dgl_mg::strata::DEFAULT_SEED;
use dgl_mg::summary::{render_summary, summarize};
use dgl_mg::{build_manifest, DirectoryImageSource};
use std::path::PathBuf;
use tracing::{error, info};

/// Manifest generator
#[derive(Parser, Debug)]
#[command(name = "dgl-build-manifest")]
#[command(about = "Generate the deterministic train/val/test manifest")]
struct Args {
    /// Sampling seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u32,

    /// Root folder holding one sub-folder per age
    #[arg(long, value_name = "DIR")]
    assets_dir: Option<PathBuf>,

    /// Manifest output file
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = DglConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting dgl-build-manifest v{}", env!("CARGO_PKG_VERSION"));

    let assets_dir = args.assets_dir.unwrap_or(config.assets_dir);
    let output = args.output.unwrap_or(config.manifest_path);
    info!("Assets: {}", assets_dir.display());

    let source = DirectoryImageSource::new(&assets_dir);
    let manifest = match build_manifest(args.seed, &source) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("Manifest generation failed: {}", e);
            return Err(e.into());
        }
    };

    write_manifest(&output, &manifest)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    print!("{}", render_summary(&summarize(&manifest.images)));
    println!("Wrote {}", output.display());
    Ok(())
}
