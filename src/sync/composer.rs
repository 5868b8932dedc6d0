use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::common::{ChannelRef, ComposeCommand, Message, MessageDocument, Sender};
use crate::error::SyncError;
use crate::storage::Backend;

use super::photo::{ImageCompressor, JPEG_CONTENT_TYPE};

/// A text message handed to the store; the write finishes in the background.
pub struct SentMessage {
    pub message: Message,
    /// Resolves to the id the store assigned.
    pub write: JoinHandle<Result<String, SyncError>>,
}

/// Busy gate for photo sends. At most one holder at a time.
struct BusyFlag {
    busy: AtomicBool,
    updates: watch::Sender<bool>,
}

impl BusyFlag {
    fn new() -> Self {
        let (updates, _) = watch::channel(false);
        Self {
            busy: AtomicBool::new(false),
            updates,
        }
    }

    fn try_acquire(self: &Arc<Self>) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.updates.send_replace(true);
        Some(BusyGuard {
            flag: Arc::clone(self),
        })
    }
}

/// Clears the busy flag when dropped, on success, failure or cancellation.
struct BusyGuard {
    flag: Arc<BusyFlag>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::SeqCst);
        self.flag.updates.send_replace(false);
    }
}

/// Builds outgoing messages for one channel and persists them.
pub struct OutboundComposer {
    channel: ChannelRef,
    sender: Sender,
    backend: Backend,
    compressor: ImageCompressor,
    busy: Arc<BusyFlag>,
}

impl OutboundComposer {
    pub fn new(
        channel: ChannelRef,
        sender: Sender,
        backend: Backend,
        compressor: ImageCompressor,
    ) -> Self {
        Self {
            channel,
            sender,
            backend,
            compressor,
            busy: Arc::new(BusyFlag::new()),
        }
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn is_busy(&self) -> bool {
        self.busy.busy.load(Ordering::SeqCst)
    }

    /// Busy toggles for the send affordances of the view.
    pub fn busy_updates(&self) -> watch::Receiver<bool> {
        self.busy.updates.subscribe()
    }

    /// Submits a text message without waiting for the store.
    ///
    /// Must be called from within a tokio runtime.
    pub fn send_text(&self, content: &str) -> Result<SentMessage, SyncError> {
        if content.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        let channel_id = self.channel_id()?;

        let message = Message::text(self.sender.clone(), content, stored_precision_now());
        let fields = MessageDocument::from_message(&message)
            .to_value()
            .map_err(SyncError::Write)?;

        let documents = Arc::clone(&self.backend.documents);
        let write = tokio::spawn(async move {
            match documents.add_document(&channel_id, fields).await {
                Ok(id) => {
                    log::debug!("Stored text message {id} in {channel_id}");
                    Ok(id)
                }
                Err(err) => {
                    log::error!("Error sending message to {channel_id}: {err}");
                    Err(SyncError::Write(err))
                }
            }
        });

        Ok(SentMessage { message, write })
    }

    /// Uploads the image, then writes a photo message pointing at it.
    ///
    /// Rejected with [`SyncError::PhotoSendInFlight`] while another photo send
    /// of this composer is running. Nothing is written unless the upload
    /// succeeded and produced a download URL.
    pub async fn send_photo(&self, image: Vec<u8>) -> Result<Message, SyncError> {
        let _busy = self.busy.try_acquire().ok_or(SyncError::PhotoSendInFlight)?;

        let result = self.upload_and_link(image).await;
        if let Err(err) = &result {
            log::warn!("Photo send to {} aborted: {err}", self.channel.name);
        }
        result
    }

    /// Routes a send intent from the view.
    pub async fn dispatch(&self, command: ComposeCommand) -> Result<Message, SyncError> {
        match command {
            ComposeCommand::SendText(content) => self.send_text(&content).map(|sent| sent.message),
            ComposeCommand::SendPhoto(image) => self.send_photo(image).await,
        }
    }

    async fn upload_and_link(&self, image: Vec<u8>) -> Result<Message, SyncError> {
        let channel_id = self.channel_id()?;

        let compressor = self.compressor.clone();
        let compressed = tokio::task::spawn_blocking(move || compressor.compress(&image))
            .await
            .map_err(|err| SyncError::ImageEncoding(format!("compression task failed: {err}")))??;

        let key = blob_key(&channel_id);
        self.backend
            .blobs
            .put(&key, compressed, JPEG_CONTENT_TYPE)
            .await
            .map_err(|source| SyncError::Upload {
                key: key.clone(),
                source,
            })?;

        let url = match self.backend.blobs.resolve_download_url(&key).await {
            Ok(Some(url)) => url,
            Ok(None) => return Err(SyncError::DownloadRef { key, source: None }),
            Err(source) => {
                return Err(SyncError::DownloadRef {
                    key,
                    source: Some(source),
                });
            }
        };

        let message = Message::photo(self.sender.clone(), Some(url), stored_precision_now());
        let fields = MessageDocument::from_message(&message)
            .to_value()
            .map_err(SyncError::Write)?;
        let id = self
            .backend
            .documents
            .add_document(&channel_id, fields)
            .await
            .map_err(SyncError::Write)?;

        log::info!("Stored photo message {id} in {channel_id}");
        Ok(message.with_id(id))
    }

    fn channel_id(&self) -> Result<String, SyncError> {
        self.channel.id.clone().ok_or(SyncError::NoChannelIdentifier)
    }
}

/// Documents keep millisecond timestamps; local copies must match them.
fn stored_precision_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// `{channel_id}/{uuid}{millis}`: unique across concurrent sends.
fn blob_key(channel_id: &str) -> String {
    format!(
        "{channel_id}/{}{}",
        Uuid::new_v4().simple(),
        Utc::now().timestamp_millis()
    )
}
