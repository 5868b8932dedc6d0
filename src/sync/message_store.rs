use std::cmp::Ordering;
use std::sync::Arc;

use crate::common::Message;

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    message: Message,
}

impl Entry {
    fn cmp_order(&self, other: &Entry) -> Ordering {
        self.message
            .order_key_cmp(&other.message)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Ordered, deduplicated messages of one channel.
///
/// Order is `(sent_at, id, insertion sequence)`, so repeated inserts always
/// produce the same list no matter how the feed delivered them.
#[derive(Debug, Default)]
pub struct MessageStore {
    entries: Arc<Vec<Entry>>,
    next_seq: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `message` unless an identical one is already stored.
    pub fn insert_if_new(&mut self, message: Message) -> bool {
        if self.contains(&message) {
            log::debug!("Ignoring duplicate message {:?}", message.id);
            return false;
        }

        let entry = Entry {
            seq: self.next_seq,
            message,
        };
        self.next_seq += 1;

        // Same position a full re-sort would give, since seq is the last key
        // and grows monotonically.
        let entries = Arc::make_mut(&mut self.entries);
        let position = entries.partition_point(|existing| existing.cmp_order(&entry) == Ordering::Less);
        entries.insert(position, entry);
        true
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.message.is_same_as(message))
    }

    pub fn is_last_in_order(&self, message: &Message) -> bool {
        self.entries
            .last()
            .is_some_and(|entry| entry.message.is_same_as(message))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable view of the current list; later inserts do not affect it.
    pub fn snapshot(&self) -> MessageSnapshot {
        MessageSnapshot {
            entries: Arc::clone(&self.entries),
        }
    }
}

/// Point-in-time copy of a [`MessageStore`] handed to renderers.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    entries: Arc<Vec<Entry>>,
}

impl MessageSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.entries.get(index).map(|entry| &entry.message)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|entry| &entry.message)
    }
}
