use thiserror::Error;

/// Failure reported by a storage collaborator (document store or blob store).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the synchronization core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The channel has not been persisted yet; the caller should leave the view.
    #[error("channel has no identifier")]
    NoChannelIdentifier,
    #[error("document {id} could not be decoded: {reason}")]
    Decode { id: String, reason: String },
    #[error("change feed transport error: {0}")]
    Transport(#[source] BackendError),
    #[error("image cannot be prepared for upload: {0}")]
    ImageEncoding(String),
    #[error("upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: BackendError,
    },
    #[error("no download reference for {key}")]
    DownloadRef {
        key: String,
        #[source]
        source: Option<BackendError>,
    },
    #[error("document write failed: {0}")]
    Write(#[source] BackendError),
    #[error("a photo send is already in flight")]
    PhotoSendInFlight,
    #[error("message content is empty")]
    EmptyMessage,
}
