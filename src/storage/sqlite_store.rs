use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use futures::channel::mpsc;
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::common::{Document, DocumentChange};
use crate::error::BackendError;

use super::database::Database;
use super::models::{StoredBlob, StoredDocument};
use super::traits::{BlobStore, ChangeStream, DocumentStore};

type FeedSender = mpsc::UnboundedSender<Result<Vec<DocumentChange>, BackendError>>;

/// Local document and blob store backed by one SQLite database.
///
/// Subscriptions see every document already stored for the channel as a single
/// `added` batch, followed by documents added through this instance.
pub struct SqliteStore {
    db: Mutex<Database>,
    blob_base_url: String,
    subscribers: Mutex<HashMap<String, Vec<FeedSender>>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, blob_base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_database(Database::open(path)?, blob_base_url.into())
    }

    pub fn in_memory(blob_base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_database(Database::in_memory()?, blob_base_url.into())
    }

    fn with_database(db: Database, blob_base_url: String) -> Result<Self, BackendError> {
        init_schema(&db)?;
        Ok(Self {
            db: Mutex::new(db),
            blob_base_url: blob_base_url.trim_end_matches('/').to_string(),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, BackendError> {
        self.db
            .lock()
            .map_err(|_| BackendError::Unavailable("database lock poisoned".into()))
    }

    // ========== Documents ==========

    /// Documents of a channel ordered by their `created` field.
    pub fn channel_documents(&self, channel_id: &str) -> Result<Vec<StoredDocument>, BackendError> {
        let db = self.db()?;
        query_channel_documents(&db, channel_id)
    }

    pub fn document_count(&self, channel_id: &str) -> Result<usize, BackendError> {
        let db = self.db()?;
        let count: i64 = db.connection().query_row(
            "SELECT COUNT(*) FROM documents WHERE channel_id = ?1",
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Adds a live subscriber, dropping senders whose subscriptions are gone.
    fn register(&self, channel_id: &str, sender: FeedSender) -> Result<(), BackendError> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| BackendError::Unavailable("subscriber registry poisoned".into()))?;
        let senders = subscribers.entry(channel_id.to_string()).or_default();
        senders.retain(|existing| !existing.is_closed());
        senders.push(sender);
        Ok(())
    }

    fn broadcast(&self, channel_id: &str, change: DocumentChange) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            log::warn!("Subscriber registry poisoned; change for {channel_id} not broadcast");
            return;
        };

        if let Some(senders) = subscribers.get_mut(channel_id) {
            senders.retain(|sender| sender.unbounded_send(Ok(vec![change.clone()])).is_ok());
            log::debug!("Broadcast change to {} subscribers of {channel_id}", senders.len());
        }
    }

    // ========== Blobs ==========

    pub fn blob_info(&self, key: &str) -> Result<Option<StoredBlob>, BackendError> {
        let db = self.db()?;
        let blob = db
            .connection()
            .query_row(
                "SELECT key, content_type, length(bytes), created_at FROM blobs WHERE key = ?1",
                params![key],
                |row| {
                    Ok(StoredBlob {
                        key: row.get(0)?,
                        content_type: row.get(1)?,
                        size: row.get::<_, i64>(2)? as usize,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(blob)
    }
}

impl StoredDocument {
    fn into_document(self) -> Result<Document, BackendError> {
        Ok(Document {
            id: self.id,
            fields: serde_json::from_str(&self.payload)?,
        })
    }
}

fn query_channel_documents(db: &Database, channel_id: &str) -> Result<Vec<StoredDocument>, BackendError> {
    let mut stmt = db.connection().prepare(
        "SELECT id, channel_id, payload, created_at
         FROM documents
         WHERE channel_id = ?1
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map(params![channel_id], |row| {
            Ok(StoredDocument {
                id: row.get(0)?,
                channel_id: row.get(1)?,
                payload: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

fn init_schema(db: &Database) -> Result<(), BackendError> {
    let conn = db.connection();

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS blobs (
            key TEXT PRIMARY KEY,
            content_type TEXT NOT NULL,
            bytes BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_channel_created ON documents(channel_id, created_at)",
        [],
    )?;

    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn subscribe(&self, channel_id: &str) -> Result<ChangeStream, BackendError> {
        // Held until the sender is registered so no write lands between the
        // replay and the live feed.
        let db = self.db()?;
        let initial = query_channel_documents(&db, channel_id)?
            .into_iter()
            .map(|row| row.into_document().map(DocumentChange::added))
            .collect::<Result<Vec<_>, _>>()?;

        let (sender, receiver) = mpsc::unbounded();
        if !initial.is_empty() {
            log::debug!("Replaying {} documents for {channel_id}", initial.len());
            // The receiver is still in hand, so this cannot fail.
            let _ = sender.unbounded_send(Ok(initial));
        }
        self.register(channel_id, sender)?;
        drop(db);

        Ok(receiver.boxed())
    }

    async fn add_document(&self, channel_id: &str, fields: Value) -> Result<String, BackendError> {
        let id = Uuid::new_v4().simple().to_string();
        let created_at = fields
            .get("created")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let payload = serde_json::to_string(&fields)?;

        let db = self.db()?;
        db.connection().execute(
            "INSERT INTO documents (id, channel_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, channel_id, payload, created_at],
        )?;

        // Broadcast under the database lock; `subscribe` replays under the same lock.
        self.broadcast(
            channel_id,
            DocumentChange::added(Document {
                id: id.clone(),
                fields,
            }),
        );
        drop(db);
        Ok(id)
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BackendError> {
        let db = self.db()?;
        db.connection().execute(
            "INSERT OR REPLACE INTO blobs (key, content_type, bytes, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, content_type, bytes, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    async fn resolve_download_url(&self, key: &str) -> Result<Option<String>, BackendError> {
        let exists = self.blob_info(key)?.is_some();
        Ok(exists.then(|| format!("{}/{}", self.blob_base_url, key)))
    }
}
