/// Row of the `documents` table.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub channel_id: String,
    /// JSON text of the document fields.
    pub payload: String,
    pub created_at: i64,
}

/// Row of the `blobs` table, without the bytes.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub key: String,
    pub content_type: String,
    pub size: usize,
    pub created_at: i64,
}
