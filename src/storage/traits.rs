use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::common::DocumentChange;
use crate::error::BackendError;

/// Live change feed of one channel. Each item is a batch of changes in the
/// order the store emitted them.
pub type ChangeStream = BoxStream<'static, Result<Vec<DocumentChange>, BackendError>>;

/// Remote collection holding the messages of every channel.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a long-lived subscription on the channel's message collection.
    /// The stream ends only when the store drops it or the caller stops polling.
    async fn subscribe(&self, channel_id: &str) -> Result<ChangeStream, BackendError>;

    /// Writes a new document and returns the id the store assigned.
    async fn add_document(&self, channel_id: &str, fields: Value) -> Result<String, BackendError>;
}

/// Binary object storage for media attached to messages.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BackendError>;

    /// Retrievable reference for a stored blob, `None` when the store has none.
    async fn resolve_download_url(&self, key: &str) -> Result<Option<String>, BackendError>;
}

pub type DocumentStoreRef = Arc<dyn DocumentStore>;
pub type BlobStoreRef = Arc<dyn BlobStore>;

/// Both collaborators a channel view needs.
#[derive(Clone)]
pub struct Backend {
    pub documents: DocumentStoreRef,
    pub blobs: BlobStoreRef,
}

impl Backend {
    pub fn new(documents: DocumentStoreRef, blobs: BlobStoreRef) -> Self {
        Self { documents, blobs }
    }
}
