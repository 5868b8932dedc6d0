pub mod commands;
pub mod document;
pub mod events;
pub mod types;

pub use commands::ComposeCommand;
pub use document::{ChangeKind, Document, DocumentChange, MessageDocument};
pub use events::{FeedEvent, ViewUpdate};
pub use types::{ChannelRef, Message, MessageKind, Sender};
