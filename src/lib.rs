//! Real-time message synchronization for a single chat channel view.
//!
//! [`sync::ChannelSession`] ties together the change feed subscription, the
//! ordered message store and the outbound composer. Storage engines plug in
//! through the traits in [`storage`].

pub mod common;
pub mod config;
pub mod error;
pub mod storage;
pub mod sync;

pub use common::{ChannelRef, Message, MessageKind, Sender, ViewUpdate};
pub use error::{BackendError, SyncError};
