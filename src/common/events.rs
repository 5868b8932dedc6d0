use super::types::Message;

/// Event sent from the subscription task to the session that owns the store.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    MessageAdded(Message),
}

/// Notification for the rendering layer after the store accepted a message.
#[derive(Debug, Clone)]
pub enum ViewUpdate {
    Inserted {
        message: Message,
        /// The message sits at the end of the ordered list; a view already at
        /// the bottom should follow it.
        is_last: bool,
    },
}
