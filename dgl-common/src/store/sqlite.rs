//! SQLite-backed document store
//!
//! Documents live in one table as JSON text keyed by `(collection, id)`.
//! Write timestamps are assigned inside the write transaction, so they stay
//! monotonic per document across every process sharing the database file.
//! Listeners in this process wake on the change feed; writes made by other
//! processes are picked up by re-reading on the poll interval.

use super::{merge_into, DocumentData, DocumentSnapshot, DocumentStore, DocumentWrite, SetMode};
use crate::events::{ChangeFeed, DocumentChanged};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Settings key holding the SHA-256 of the registered service credential
const SERVICE_CREDENTIAL_KEY: &str = "service_credential_sha256";

/// Default re-read interval for listeners
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a connection waits on another process's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Document store persisted in a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    feed: ChangeFeed,
    poll_interval: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `db_path`
    pub async fn connect(db_path: &Path, poll_interval: Duration) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // WAL lets annotator sessions read while another process writes
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        if newly_created {
            info!("Initialized new document store: {}", db_path.display());
        } else {
            info!("Opened existing document store: {}", db_path.display());
        }

        create_documents_table(&pool).await?;
        create_settings_table(&pool).await?;

        Ok(Self {
            pool,
            feed: ChangeFeed::default(),
            poll_interval,
        })
    }

    /// Check a service credential against the one registered in the store
    ///
    /// The first credential presented to a fresh store is registered.
    pub async fn authenticate(&self, credential: &str) -> Result<()> {
        let digest = crate::auth::credential_digest(credential);
        let registered: Option<(String,)> =
            sqlx::query_as("SELECT value FROM settings WHERE key = ?")
                .bind(SERVICE_CREDENTIAL_KEY)
                .fetch_optional(&self.pool)
                .await?;

        match registered {
            Some((expected,)) if expected == digest => Ok(()),
            Some(_) => Err(Error::Unauthorized(
                "service credential does not match the registered credential".to_string(),
            )),
            None => {
                sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                    .bind(SERVICE_CREDENTIAL_KEY)
                    .bind(&digest)
                    .execute(&self.pool)
                    .await?;
                warn!("No service credential registered; registered the presented one");
                Ok(())
            }
        }
    }

    /// Read-modify-write of one document under the database write lock
    ///
    /// The lock is taken before the read (`BEGIN IMMEDIATE`); concurrent
    /// writers wait up to the busy timeout.
    async fn write(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
        apply: impl FnOnce(Option<DocumentData>, DocumentData) -> Result<DocumentData> + Send,
    ) -> Result<DateTime<Utc>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let update_time = match write_locked(&mut conn, collection, id, write, apply).await {
            Ok(update_time) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                update_time
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!("Rollback of {}/{} failed: {}", collection, id, rollback);
                }
                return Err(e);
            }
        };

        self.feed.emit_lossy(DocumentChanged {
            collection: collection.to_string(),
            id: id.to_string(),
            update_time,
        });
        Ok(update_time)
    }
}

async fn write_locked(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &str,
    write: DocumentWrite,
    apply: impl FnOnce(Option<DocumentData>, DocumentData) -> Result<DocumentData> + Send,
) -> Result<DateTime<Utc>> {
    let existing: Option<(String, i64)> = sqlx::query_as(
        "SELECT data, update_time_us FROM documents WHERE collection = ? AND id = ?",
    )
    .bind(collection)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let previous = existing.as_ref().map(|(_, micros)| crate::time::from_micros(*micros));
    let update_time = crate::time::next_server_timestamp(previous);
    let fields = write.resolve(&update_time);
    let data = apply(existing.map(|(text, _)| parse_document(collection, id, &text)), fields)?;
    let text = serde_json::to_string(&data)?;

    sqlx::query(
        "INSERT INTO documents (collection, id, data, update_time_us) VALUES (?, ?, ?, ?) \
         ON CONFLICT (collection, id) DO UPDATE SET data = excluded.data, \
         update_time_us = excluded.update_time_us",
    )
    .bind(collection)
    .bind(id)
    .bind(&text)
    .bind(update_time.timestamp_micros())
    .execute(&mut *conn)
    .await?;

    Ok(update_time)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<DocumentSnapshot> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT data, update_time_us FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((text, micros)) => DocumentSnapshot {
                id: id.to_string(),
                data: Some(parse_document(collection, id, &text)),
                update_time: Some(crate::time::from_micros(micros)),
            },
            None => DocumentSnapshot::missing(id),
        })
    }

    async fn list(&self, collection: &str) -> Result<Vec<DocumentSnapshot>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT id, data, update_time_us FROM documents WHERE collection = ? ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, text, micros)| DocumentSnapshot {
                data: Some(parse_document(collection, &id, &text)),
                update_time: Some(crate::time::from_micros(micros)),
                id,
            })
            .collect())
    }

    async fn update(&self, collection: &str, id: &str, write: DocumentWrite) -> Result<DateTime<Utc>> {
        self.write(collection, id, write, |existing, fields| {
            let mut data =
                existing.ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;
            for (key, value) in fields {
                data.insert(key, value);
            }
            Ok(data)
        })
        .await
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
        mode: SetMode,
    ) -> Result<DateTime<Utc>> {
        self.write(collection, id, write, move |existing, fields| {
            Ok(match (mode, existing) {
                (SetMode::Merge, Some(mut data)) => {
                    merge_into(&mut data, fields);
                    data
                }
                _ => fields,
            })
        })
        .await
    }

    fn changes(&self) -> broadcast::Receiver<DocumentChanged> {
        self.feed.subscribe()
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(self.poll_interval)
    }
}

/// Stored text that is not a JSON object reads back as an empty document
fn parse_document(collection: &str, id: &str, text: &str) -> DocumentData {
    match serde_json::from_str::<DocumentData>(text) {
        Ok(data) => data,
        Err(e) => {
            warn!("Unreadable document {}/{} treated as empty: {}", collection, id, e);
            DocumentData::new()
        }
    }
}

async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            update_time_us INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
