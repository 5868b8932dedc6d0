use tokio::sync::mpsc;

use crate::common::{ChannelRef, FeedEvent, Message, Sender, ViewUpdate};
use crate::config::AppConfig;
use crate::error::SyncError;
use crate::storage::Backend;

use super::composer::OutboundComposer;
use super::message_store::{MessageSnapshot, MessageStore};
use super::photo::ImageCompressor;
use super::subscriber::{ChangeFeedSubscriber, SubscriptionHandle};

/// Read side a rendering layer needs from a channel view.
pub trait MessageFeed {
    fn channel(&self) -> &ChannelRef;

    /// Ordered messages at this instant.
    fn messages(&self) -> MessageSnapshot;

    fn current_sender(&self) -> &Sender;

    fn is_from_current_sender(&self, message: &Message) -> bool {
        message.sender.id == self.current_sender().id
    }
}

/// Core of one open chat view: the live subscription, the ordered store it
/// feeds and the composer for outgoing messages.
pub struct ChannelSession {
    channel: ChannelRef,
    store: MessageStore,
    subscription: SubscriptionHandle,
    feed: mpsc::Receiver<FeedEvent>,
    composer: OutboundComposer,
}

impl ChannelSession {
    /// Opens the view. A channel without id fails with
    /// [`SyncError::NoChannelIdentifier`] and the caller should navigate back.
    pub async fn open(
        channel: ChannelRef,
        backend: Backend,
        config: &AppConfig,
    ) -> Result<Self, SyncError> {
        let subscriber = ChangeFeedSubscriber::new(backend.documents.clone());
        Self::open_with(channel, backend, config, subscriber).await
    }

    /// Like [`ChannelSession::open`] with a preconfigured subscriber.
    pub async fn open_with(
        channel: ChannelRef,
        backend: Backend,
        config: &AppConfig,
        subscriber: ChangeFeedSubscriber,
    ) -> Result<Self, SyncError> {
        let (sink, feed) = mpsc::channel(config.feed_buffer.max(1));
        let subscription = subscriber.start(&channel, sink).await?;

        let composer = OutboundComposer::new(
            channel.clone(),
            config.sender(),
            backend,
            ImageCompressor::new(&config.image),
        );

        log::info!("Opened channel view {}", channel.name);
        Ok(Self {
            channel,
            store: MessageStore::new(),
            subscription,
            feed,
            composer,
        })
    }

    pub fn composer(&self) -> &OutboundComposer {
        &self.composer
    }

    /// Waits for the next message the store accepts. Returns `None` once the
    /// feed is closed.
    pub async fn next_update(&mut self) -> Option<ViewUpdate> {
        while let Some(event) = self.feed.recv().await {
            if let Some(update) = self.apply(event) {
                return Some(update);
            }
        }
        None
    }

    /// Applies every feed event already delivered without waiting.
    pub fn drain_pending(&mut self) -> Vec<ViewUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.feed.try_recv() {
            updates.extend(self.apply(event));
        }
        updates
    }

    /// Stops the subscription and discards undelivered events. Idempotent.
    pub fn stop(&mut self) {
        self.subscription.stop();
        self.feed.close();
        while self.feed.try_recv().is_ok() {}
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_active()
    }

    fn apply(&mut self, event: FeedEvent) -> Option<ViewUpdate> {
        match event {
            FeedEvent::MessageAdded(message) => {
                if !self.store.insert_if_new(message.clone()) {
                    return None;
                }
                let is_last = self.store.is_last_in_order(&message);
                Some(ViewUpdate::Inserted { message, is_last })
            }
        }
    }
}

impl MessageFeed for ChannelSession {
    fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    fn messages(&self) -> MessageSnapshot {
        self.store.snapshot()
    }

    fn current_sender(&self) -> &Sender {
        self.composer.sender()
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.stop();
    }
}
