//! dgl-export - write `gold_labels.json` and `gold_labels.jsonl`
//!
//! Admin only: the caller's email must be on the allow-list or their user
//! record must carry the admin role.

use anyhow::{Context, Result};
use clap::Parser;
use dgl_common::auth::AdminPolicy;
use dgl_common::config::DglConfig;
use dgl_common::store::SqliteStore;
use dgl_common::Identity;
use dgl_ls::export::export_gold_labels;
use std::path::PathBuf;
use tracing::{info, warn};

/// Gold label exporter
#[derive(Parser, Debug)]
#[command(name = "dgl-export")]
#[command(about = "Export every manifest image's label as JSON and JSON Lines")]
struct Args {
    /// User id of the caller
    #[arg(long)]
    uid: String,

    /// Email of the caller
    #[arg(long)]
    email: Option<String>,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

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

    info!("Starting dgl-export v{}", env!("CARGO_PKG_VERSION"));

    let mut identity = Identity::new(args.uid);
    if let Some(email) = args.email {
        identity = identity.with_email(email);
    }

    let store_path = args.store.unwrap_or(config.store_path.clone());
    let store = SqliteStore::connect(&store_path, config.poll_interval())
        .await
        .with_context(|| format!("Failed to open document store {}", store_path.display()))?;

    let policy = AdminPolicy::new(&config.admin_emails);
    let out_dir = args.out_dir.unwrap_or(config.export_dir.clone());
    let (report, files) = export_gold_labels(&store, &policy, &identity, &out_dir)
        .await
        .context("Export failed")?;

    if !report.failed.is_empty() {
        warn!(
            "{} label(s) could not be read and were exported as missing: {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }

    println!(
        "Exported {} rows ({} missing, {} reviewed)",
        report.rows.len(),
        report.missing_count(),
        report.reviewed_count()
    );
    println!("  {}", files.json.display());
    println!("  {}", files.jsonl.display());
    Ok(())
}
