#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use channel_sync::common::{ChangeKind, Document, DocumentChange};
use channel_sync::config::AppConfig;
use channel_sync::storage::{Backend, BlobStore, ChangeStream, DocumentStore};
use channel_sync::BackendError;
use futures::StreamExt;
use futures::channel::mpsc;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

type Batch = Result<Vec<DocumentChange>, BackendError>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_config() -> AppConfig {
    AppConfig {
        user_id: "u1".to_string(),
        display_name: "Alice".to_string(),
        ..AppConfig::default()
    }
}

pub fn text_doc(id: &str, content: &str, created: i64) -> Document {
    Document {
        id: id.to_string(),
        fields: json!({
            "created": created,
            "senderId": "u2",
            "senderName": "Bob",
            "kind": "text",
            "content": content,
        }),
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 90]))
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

/// Pushes batches into a scripted subscription.
pub struct FeedController {
    sender: mpsc::UnboundedSender<Batch>,
}

impl FeedController {
    pub fn push(&self, changes: Vec<DocumentChange>) {
        // The subscription may already be gone; that is what some tests check.
        let _ = self.sender.unbounded_send(Ok(changes));
    }

    pub fn added(&self, document: Document) {
        self.push(vec![DocumentChange::added(document)]);
    }

    pub fn change(&self, kind: ChangeKind, document: Document) {
        self.push(vec![DocumentChange { kind, document }]);
    }

    pub fn fail(&self, reason: &str) {
        let _ = self
            .sender
            .unbounded_send(Err(BackendError::Unavailable(reason.to_string())));
    }

    pub fn close(self) {
        self.sender.close_channel();
    }
}

/// Document store with one scripted subscription and recorded writes.
pub struct ScriptedDocuments {
    feed: Mutex<Option<mpsc::UnboundedReceiver<Batch>>>,
    subscribe_calls: AtomicUsize,
    writes: Mutex<Vec<(String, Value)>>,
    fail_writes: AtomicBool,
}

impl ScriptedDocuments {
    pub fn new() -> (Arc<Self>, FeedController) {
        let (sender, receiver) = mpsc::unbounded();
        let store = Arc::new(Self {
            feed: Mutex::new(Some(receiver)),
            subscribe_calls: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        });
        (store, FeedController { sender })
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for ScriptedDocuments {
    async fn subscribe(&self, _channel_id: &str) -> Result<ChangeStream, BackendError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let receiver = self
            .feed
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BackendError::Unavailable("already subscribed".into()))?;
        Ok(receiver.boxed())
    }

    async fn add_document(&self, channel_id: &str, fields: Value) -> Result<String, BackendError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("write rejected".into()));
        }
        let mut writes = self.writes.lock().unwrap();
        writes.push((channel_id.to_string(), fields));
        Ok(format!("doc-{}", writes.len()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutCall {
    pub key: String,
    pub size: usize,
    pub content_type: String,
}

#[derive(Default)]
pub struct BlobBehavior {
    pub fail_put: bool,
    pub missing_url: bool,
    /// When set, every `put` waits for a permit.
    pub gate: Option<Arc<Semaphore>>,
}

/// Blob store recording every call.
pub struct RecordingBlobs {
    behavior: BlobBehavior,
    puts: Mutex<Vec<PutCall>>,
    resolves: AtomicUsize,
}

impl RecordingBlobs {
    pub fn new(behavior: BlobBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            puts: Mutex::new(Vec::new()),
            resolves: AtomicUsize::new(0),
        })
    }

    pub fn puts(&self) -> Vec<PutCall> {
        self.puts.lock().unwrap().clone()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for RecordingBlobs {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BackendError> {
        if let Some(gate) = &self.behavior.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| BackendError::Unavailable("gate closed".into()))?;
        }
        self.puts.lock().unwrap().push(PutCall {
            key: key.to_string(),
            size: bytes.len(),
            content_type: content_type.to_string(),
        });
        if self.behavior.fail_put {
            return Err(BackendError::Unavailable("bucket offline".into()));
        }
        Ok(())
    }

    async fn resolve_download_url(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.behavior.missing_url {
            return Ok(None);
        }
        Ok(Some(format!("https://cdn.example/{key}")))
    }
}

pub fn backend(documents: Arc<ScriptedDocuments>, blobs: Arc<RecordingBlobs>) -> Backend {
    Backend::new(documents, blobs)
}
