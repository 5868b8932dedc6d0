use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BackendError, SyncError};

use super::types::{Message, MessageKind, Sender};

/// Raw document as handed out by the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One entry of a change feed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: Document,
}

impl DocumentChange {
    pub fn added(document: Document) -> Self {
        Self {
            kind: ChangeKind::Added,
            document,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Photo,
}

/// Field layout of a message document in the channel's collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDocument {
    /// Epoch milliseconds.
    pub created: i64,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DocumentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl MessageDocument {
    pub fn from_message(message: &Message) -> Self {
        let (kind, content, url) = match &message.kind {
            MessageKind::Text(content) => (DocumentKind::Text, Some(content.clone()), None),
            MessageKind::Photo(url) => (DocumentKind::Photo, None, url.clone()),
        };

        Self {
            created: message.sent_at.timestamp_millis(),
            sender_id: message.sender.id.clone(),
            sender_name: message.sender.display_name.clone(),
            kind: Some(kind),
            content,
            url,
        }
    }

    pub fn to_value(&self) -> Result<Value, BackendError> {
        Ok(serde_json::to_value(self)?)
    }

    fn resolve_kind(self) -> Result<MessageKind, String> {
        match (self.kind, self.content, self.url) {
            (Some(DocumentKind::Text), Some(content), _) => Ok(MessageKind::Text(content)),
            (Some(DocumentKind::Text), None, _) => Err("text message without content".into()),
            (Some(DocumentKind::Photo), _, url) => Ok(MessageKind::Photo(url)),
            // Older documents carry no discriminant.
            (None, Some(content), _) => Ok(MessageKind::Text(content)),
            (None, None, Some(url)) => Ok(MessageKind::Photo(Some(url))),
            (None, None, None) => Err("neither content nor url present".into()),
        }
    }
}

impl TryFrom<&Document> for Message {
    type Error = SyncError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let decode_error = |reason: String| SyncError::Decode {
            id: document.id.clone(),
            reason,
        };

        let fields = MessageDocument::deserialize(&document.fields)
            .map_err(|err| decode_error(err.to_string()))?;
        let sent_at = DateTime::from_timestamp_millis(fields.created)
            .ok_or_else(|| decode_error(format!("timestamp {} out of range", fields.created)))?;
        let sender = Sender::new(fields.sender_id.clone(), fields.sender_name.clone());
        let kind = fields.resolve_kind().map_err(decode_error)?;

        Ok(Message {
            id: Some(document.id.clone()),
            sender,
            kind,
            sent_at,
        })
    }
}
