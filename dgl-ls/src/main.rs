//! dgl-label - annotator console
//!
//! Reads commands from stdin and drives a labeling session over the
//! published manifest. Edits are saved automatically after a short pause.

use anyhow::{Context, Result};
use clap::Parser;
use dgl_common::catalog::ITEMS;
use dgl_common::config::DglConfig;
use dgl_common::repo::fetch_manifest;
use dgl_common::store::{DocumentStore, SqliteStore};
use dgl_common::Identity;
use dgl_ls::console::{Command, Navigator, HELP};
use dgl_ls::{LabelSession, ReviewedMap, SaveState};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Time allowed for in-flight writes on exit, on top of the quiet interval
const FLUSH_LIMIT: Duration = Duration::from_secs(5);

/// Annotator console
#[derive(Parser, Debug)]
#[command(name = "dgl-label")]
#[command(about = "Label manifest images from the terminal")]
struct Args {
    /// User id of the annotator
    #[arg(long)]
    uid: String,

    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    display_name: Option<String>,

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
        .with_writer(std::io::stderr)
        .init();

    info!("Starting dgl-label v{}", env!("CARGO_PKG_VERSION"));

    let mut identity = Identity::new(args.uid);
    if let Some(email) = args.email {
        identity = identity.with_email(email);
    }
    if let Some(name) = args.display_name {
        identity = identity.with_display_name(name);
    }

    let store_path = args.store.unwrap_or(config.store_path.clone());
    let store = SqliteStore::connect(&store_path, config.poll_interval())
        .await
        .with_context(|| format!("Failed to open document store {}", store_path.display()))?;
    let manifest = fetch_manifest(&store).await.context("Failed to load the manifest")?;
    let mut nav = Navigator::new(&manifest).context("The published manifest has no images")?;

    let reviewed = ReviewedMap::attach(&store, &manifest);
    let session = LabelSession::new(store, identity, config.debounce()).with_reviewed_map(reviewed.clone());
    println!(
        "Signed in as {}. {} images. Type help for commands.",
        session.identity().label(),
        manifest.images.len()
    );

    spawn_state_printer(&session);
    session.focus(nav.current()).await;
    print_position(&nav);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            Command::Next | Command::Prev | Command::Goto(_) => {
                let moved = match &command {
                    Command::Next => nav.next(),
                    Command::Prev => nav.prev(),
                    Command::Goto(id) => nav.goto(id),
                    _ => false,
                };
                if moved {
                    session.focus(nav.current()).await;
                    print_position(&nav);
                } else {
                    println!("No such image in that direction");
                }
            }
            Command::Toggle(key) => match session.toggle_item(key).await {
                Ok(checked) => println!("{} = {}", key, u8::from(checked)),
                Err(e) => println!("{}", e),
            },
            Command::View(view) => {
                if let Err(e) = session.set_view(view).await {
                    println!("{}", e);
                }
            }
            Command::Reviewed(flag) => {
                if let Err(e) = session.set_reviewed(flag).await {
                    println!("{}", e);
                }
            }
            Command::Items => print_items(&session).await,
            Command::Status => print_status(&session, &nav).await,
            Command::Progress => println!(
                "Reviewed {} of {} images",
                reviewed.reviewed_count(),
                reviewed.manifest_len()
            ),
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }

    if session.has_outstanding_writes() {
        info!("Flushing unsaved edits before exit");
        if !session.flush(config.debounce() + FLUSH_LIMIT).await {
            warn!("Some edits were not saved before exit");
        }
    }
    session.shutdown();
    reviewed.detach();
    Ok(())
}

fn spawn_state_printer<S: DocumentStore>(session: &LabelSession<S>) {
    let mut rx = session.subscribe_state();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            match state {
                SaveState::Saved | SaveState::Error(_) => eprintln!("[{}]", state),
                SaveState::Idle | SaveState::Saving => {}
            }
        }
    });
}

fn print_position(nav: &Navigator) {
    let image = nav.current();
    let (position, total) = nav.position();
    let split = image.split.map(|split| split.to_string()).unwrap_or_else(|| "-".to_string());
    println!(
        "[{}/{}] {} age {} split {} {}",
        position, total, image.id, image.age, split, image.path
    );
}

async fn print_items<S: DocumentStore>(session: &LabelSession<S>) {
    let Some(label) = session.label().await else {
        return;
    };
    for (position, item) in ITEMS.iter().enumerate() {
        let mark = if label.items.get(item.key) == Some(true) { "x" } else { " " };
        println!("{:>2} [{}] {:<22} {}", position + 1, mark, item.key, item.label);
    }
}

async fn print_status<S: DocumentStore>(session: &LabelSession<S>, nav: &Navigator) {
    print_position(nav);
    if let Some(label) = session.label().await {
        println!(
            "view {} | reviewed {} | {} of {} items | {}",
            label.view,
            if label.reviewed { "yes" } else { "no" },
            label.pass_count(),
            ITEMS.len(),
            session.save_state()
        );
    }
}
