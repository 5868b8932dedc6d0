use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::common::{ChangeKind, ChannelRef, DocumentChange, FeedEvent, Message};
use crate::error::{BackendError, SyncError};
use crate::storage::{ChangeStream, DocumentStoreRef};

/// What to do with a subscription after its transport reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep polling the existing stream.
    KeepOpen,
    /// Give up and end the subscription.
    Close,
}

/// Hook for reconnect policies on change feed transport errors.
pub trait ReconnectPolicy: Send + Sync {
    fn on_transport_error(&self, error: &BackendError, consecutive_failures: u32) -> RetryDecision;
}

/// Leaves the subscription open and never reconnects.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepOpen;

impl ReconnectPolicy for KeepOpen {
    fn on_transport_error(&self, _error: &BackendError, _consecutive_failures: u32) -> RetryDecision {
        RetryDecision::KeepOpen
    }
}

/// Opens change feed subscriptions and forwards newly added messages.
pub struct ChangeFeedSubscriber {
    documents: DocumentStoreRef,
    reconnect: Arc<dyn ReconnectPolicy>,
}

impl ChangeFeedSubscriber {
    pub fn new(documents: DocumentStoreRef) -> Self {
        Self {
            documents,
            reconnect: Arc::new(KeepOpen),
        }
    }

    pub fn with_reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.reconnect = policy;
        self
    }

    /// Subscribes to the channel and spawns the task that feeds `sink`.
    ///
    /// Fails with [`SyncError::NoChannelIdentifier`] before touching the store
    /// when the channel has not been persisted.
    pub async fn start(
        &self,
        channel: &ChannelRef,
        sink: mpsc::Sender<FeedEvent>,
    ) -> Result<SubscriptionHandle, SyncError> {
        let channel_id = channel.id.clone().ok_or(SyncError::NoChannelIdentifier)?;

        let stream = self
            .documents
            .subscribe(&channel_id)
            .await
            .map_err(SyncError::Transport)?;
        log::info!("Subscribed to messages of channel {channel_id}");

        let live = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = FeedTask {
            channel_id,
            live: Arc::clone(&live),
            sink,
            reconnect: Arc::clone(&self.reconnect),
        };
        let join = tokio::spawn(task.run(stream, stop_rx));

        Ok(SubscriptionHandle {
            live,
            stop_tx: Some(stop_tx),
            task: Some(join),
        })
    }
}

/// Owner of a running subscription. Dropping it stops the subscription.
pub struct SubscriptionHandle {
    live: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Releases the subscription. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already be gone if the stream ended on its own.
            let _ = stop_tx.send(());
            log::info!("Subscription stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.live.load(Ordering::SeqCst) && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the subscription and waits for its task to exit.
    pub async fn shutdown(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log::warn!("Subscription task ended abnormally: {err}");
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct FeedTask {
    channel_id: String,
    live: Arc<AtomicBool>,
    sink: mpsc::Sender<FeedEvent>,
    reconnect: Arc<dyn ReconnectPolicy>,
}

impl FeedTask {
    async fn run(self, mut stream: ChangeStream, mut stop_rx: oneshot::Receiver<()>) {
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                batch = stream.next() => match batch {
                    Some(Ok(changes)) => {
                        consecutive_failures = 0;
                        if !self.forward_batch(changes).await {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        consecutive_failures += 1;
                        log::warn!(
                            "Change feed error on {} ({consecutive_failures} in a row): {err}",
                            self.channel_id
                        );
                        if self.reconnect.on_transport_error(&err, consecutive_failures)
                            == RetryDecision::Close
                        {
                            log::warn!("Reconnect policy closed the feed of {}", self.channel_id);
                            break;
                        }
                    }
                    None => {
                        log::info!("Change feed of {} ended", self.channel_id);
                        break;
                    }
                },
            }
        }

        self.live.store(false, Ordering::SeqCst);
        log::debug!("Feed task for {} exited", self.channel_id);
    }

    /// Returns false once nobody is listening any more.
    async fn forward_batch(&self, changes: Vec<DocumentChange>) -> bool {
        for change in changes {
            if !self.live.load(Ordering::SeqCst) {
                return false;
            }

            match change.kind {
                ChangeKind::Added => match Message::try_from(&change.document) {
                    Ok(message) => {
                        if self.sink.send(FeedEvent::MessageAdded(message)).await.is_err() {
                            log::debug!("Feed receiver for {} dropped", self.channel_id);
                            return false;
                        }
                    }
                    Err(err) => log::warn!("Skipping document: {err}"),
                },
                // The view has no edit or delete support.
                ChangeKind::Modified | ChangeKind::Removed => {
                    log::debug!(
                        "Ignoring {:?} change of document {}",
                        change.kind,
                        change.document.id
                    );
                }
            }
        }
        true
    }
}
