pub mod composer;
pub mod message_store;
pub mod photo;
pub mod session;
pub mod subscriber;

pub use composer::{OutboundComposer, SentMessage};
pub use message_store::{MessageSnapshot, MessageStore};
pub use photo::ImageCompressor;
pub use session::{ChannelSession, MessageFeed};
pub use subscriber::{ChangeFeedSubscriber, KeepOpen, ReconnectPolicy, RetryDecision, SubscriptionHandle};
