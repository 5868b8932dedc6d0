use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub display_name: String,
}

impl Sender {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text(String),
    /// Download URL of the uploaded image, once known.
    Photo(Option<String>),
}

/// One chat entry. Immutable once built; `id` is only present after the store
/// has persisted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Option<String>,
    pub sender: Sender,
    pub kind: MessageKind,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn text(sender: Sender, content: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            sender,
            kind: MessageKind::Text(content.into()),
            sent_at,
        }
    }

    pub fn photo(sender: Sender, download_url: Option<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            sender,
            kind: MessageKind::Photo(download_url),
            sent_at,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Dedup identity: ids decide when both sides have one, otherwise the
    /// sender, kind and timestamp must all match.
    ///
    /// The structural fallback can merge two distinct unpersisted messages
    /// sent by the same author at the same instant with the same body.
    pub fn is_same_as(&self, other: &Message) -> bool {
        match (&self.id, &other.id) {
            (Some(left), Some(right)) => left == right,
            _ => {
                self.sender == other.sender
                    && self.kind == other.kind
                    && self.sent_at == other.sent_at
            }
        }
    }

    /// Order by `sent_at`, then by id. A missing id sorts first.
    pub fn order_key_cmp(&self, other: &Message) -> Ordering {
        self.sent_at
            .cmp(&other.sent_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Channel the view is bound to. `id` is absent until the channel is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: Option<String>,
    pub name: String,
}

impl ChannelRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
        }
    }

    pub fn unsaved(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}
