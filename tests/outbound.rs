mod common;

use std::sync::Arc;

use channel_sync::common::{ChannelRef, ComposeCommand, MessageKind};
use channel_sync::config::ImageConfig;
use channel_sync::storage::{Backend, BlobStore, SqliteStore};
use channel_sync::sync::{ImageCompressor, OutboundComposer};
use channel_sync::SyncError;
use tokio::sync::Semaphore;

use common::{BlobBehavior, RecordingBlobs, ScriptedDocuments, init_logging, png_bytes, test_config};

fn composer_with(
    channel: ChannelRef,
    documents: Arc<ScriptedDocuments>,
    blobs: Arc<RecordingBlobs>,
) -> OutboundComposer {
    init_logging();
    OutboundComposer::new(
        channel,
        test_config().sender(),
        common::backend(documents, blobs),
        ImageCompressor::new(&ImageConfig::default()),
    )
}

fn setup(behavior: BlobBehavior) -> (OutboundComposer, Arc<ScriptedDocuments>, Arc<RecordingBlobs>) {
    let (documents, _feed) = ScriptedDocuments::new();
    let blobs = RecordingBlobs::new(behavior);
    let composer = composer_with(ChannelRef::new("c1", "general"), documents.clone(), blobs.clone());
    (composer, documents, blobs)
}

#[tokio::test]
async fn text_is_written_in_the_background() {
    let (composer, documents, _) = setup(BlobBehavior::default());

    let sent = composer.send_text("  hi there ").unwrap();
    assert_eq!(sent.message.kind, MessageKind::Text("  hi there ".into()));
    assert!(sent.message.id.is_none());

    let id = sent.write.await.unwrap().unwrap();
    assert_eq!(id, "doc-1");

    let writes = documents.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "c1");
    assert_eq!(writes[0].1["content"], "  hi there ");
    assert_eq!(writes[0].1["senderName"], "Alice");
}

#[tokio::test]
async fn blank_text_is_rejected() {
    let (composer, documents, _) = setup(BlobBehavior::default());

    assert!(matches!(composer.send_text("   "), Err(SyncError::EmptyMessage)));
    assert!(documents.writes().is_empty());
}

#[tokio::test]
async fn failed_text_write_is_reported_through_the_handle() {
    let (composer, documents, _) = setup(BlobBehavior::default());
    documents.fail_writes();

    let sent = composer.send_text("lost").unwrap();
    assert!(matches!(sent.write.await.unwrap(), Err(SyncError::Write(_))));
}

#[tokio::test]
async fn undecodable_image_aborts_before_upload() {
    let (composer, documents, blobs) = setup(BlobBehavior::default());

    let result = composer.send_photo(b"not a picture".to_vec()).await;

    assert!(matches!(result, Err(SyncError::ImageEncoding(_))));
    assert!(blobs.puts().is_empty());
    assert_eq!(blobs.resolve_calls(), 0);
    assert!(documents.writes().is_empty());
    assert!(!composer.is_busy());
}

#[tokio::test]
async fn photo_is_uploaded_then_linked() {
    let (composer, documents, blobs) = setup(BlobBehavior::default());

    let message = composer.send_photo(png_bytes(800, 600)).await.unwrap();

    let puts = blobs.puts();
    assert_eq!(puts.len(), 1);
    assert!(puts[0].key.starts_with("c1/"));
    assert_eq!(puts[0].content_type, "image/jpeg");
    assert!(puts[0].size > 0);
    assert_eq!(blobs.resolve_calls(), 1);

    let expected_url = format!("https://cdn.example/{}", puts[0].key);
    let writes = documents.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1["kind"], "photo");
    assert_eq!(writes[0].1["url"], expected_url.as_str());

    assert_eq!(message.id.as_deref(), Some("doc-1"));
    assert_eq!(message.kind, MessageKind::Photo(Some(expected_url)));
    assert!(!composer.is_busy());
}

#[tokio::test]
async fn failed_upload_writes_nothing() {
    let (composer, documents, blobs) = setup(BlobBehavior {
        fail_put: true,
        ..BlobBehavior::default()
    });

    let result = composer.send_photo(png_bytes(16, 16)).await;

    assert!(matches!(result, Err(SyncError::Upload { .. })));
    assert_eq!(blobs.resolve_calls(), 0);
    assert_eq!(documents.writes().len(), 0);
    assert!(!composer.is_busy());
}

#[tokio::test]
async fn missing_download_url_writes_nothing() {
    let (composer, documents, blobs) = setup(BlobBehavior {
        missing_url: true,
        ..BlobBehavior::default()
    });

    let result = composer.send_photo(png_bytes(16, 16)).await;

    assert!(matches!(result, Err(SyncError::DownloadRef { source: None, .. })));
    assert_eq!(blobs.puts().len(), 1);
    assert!(documents.writes().is_empty());
    assert!(!composer.is_busy());
}

#[tokio::test]
async fn failed_photo_document_write_clears_busy() {
    let (composer, documents, blobs) = setup(BlobBehavior::default());
    documents.fail_writes();

    let result = composer.send_photo(png_bytes(16, 16)).await;

    assert!(matches!(result, Err(SyncError::Write(_))));
    assert_eq!(blobs.puts().len(), 1);
    assert_eq!(blobs.resolve_calls(), 1);
    assert!(documents.writes().is_empty());
    assert!(!composer.is_busy());
}

#[tokio::test]
async fn photo_to_unsaved_channel_is_refused() {
    let (documents, _feed) = ScriptedDocuments::new();
    let blobs = RecordingBlobs::new(BlobBehavior::default());
    let composer = composer_with(ChannelRef::unsaved("draft"), documents.clone(), blobs.clone());

    let result = composer.send_photo(png_bytes(16, 16)).await;

    assert!(matches!(result, Err(SyncError::NoChannelIdentifier)));
    assert!(blobs.puts().is_empty());
    assert!(documents.writes().is_empty());
}

#[tokio::test]
async fn second_photo_is_rejected_while_one_is_in_flight() {
    let gate = Arc::new(Semaphore::new(0));
    let (composer, documents, blobs) = setup(BlobBehavior {
        gate: Some(gate.clone()),
        ..BlobBehavior::default()
    });
    let composer = Arc::new(composer);
    let mut busy = composer.busy_updates();
    assert!(!*busy.borrow());

    let in_flight = {
        let composer = Arc::clone(&composer);
        tokio::spawn(async move { composer.send_photo(png_bytes(32, 32)).await })
    };

    busy.wait_for(|busy| *busy).await.unwrap();
    let rejected = composer.send_photo(png_bytes(32, 32)).await;
    assert!(matches!(rejected, Err(SyncError::PhotoSendInFlight)));
    assert!(composer.is_busy());

    gate.add_permits(1);
    let message = in_flight.await.unwrap().unwrap();

    assert!(matches!(message.kind, MessageKind::Photo(Some(_))));
    assert!(!composer.is_busy());
    assert!(!*busy.borrow_and_update());
    assert_eq!(blobs.puts().len(), 1);
    assert_eq!(documents.writes().len(), 1);
}

#[tokio::test]
async fn text_is_not_blocked_by_a_photo_in_flight() {
    let gate = Arc::new(Semaphore::new(0));
    let (composer, documents, _) = setup(BlobBehavior {
        gate: Some(gate.clone()),
        ..BlobBehavior::default()
    });
    let composer = Arc::new(composer);
    let mut busy = composer.busy_updates();

    let in_flight = {
        let composer = Arc::clone(&composer);
        tokio::spawn(async move { composer.send_photo(png_bytes(32, 32)).await })
    };
    busy.wait_for(|busy| *busy).await.unwrap();

    let sent = composer.send_text("meanwhile").unwrap();
    sent.write.await.unwrap().unwrap();
    assert_eq!(documents.writes().len(), 1);

    gate.add_permits(1);
    in_flight.await.unwrap().unwrap();
    assert!(!composer.is_busy());
    assert_eq!(documents.writes().len(), 2);
}

#[tokio::test]
async fn dispatch_routes_send_intents() {
    let (composer, documents, blobs) = setup(BlobBehavior::default());

    let text = composer
        .dispatch(ComposeCommand::SendText("routed".into()))
        .await
        .unwrap();
    assert_eq!(text.kind, MessageKind::Text("routed".into()));

    let photo = composer
        .dispatch(ComposeCommand::SendPhoto(png_bytes(8, 8)))
        .await
        .unwrap();
    assert!(matches!(photo.kind, MessageKind::Photo(Some(_))));
    assert_eq!(blobs.puts().len(), 1);

    let blank = composer.dispatch(ComposeCommand::SendText(" ".into())).await;
    assert!(matches!(blank, Err(SyncError::EmptyMessage)));

    tokio::task::yield_now().await;
    assert_eq!(documents.writes().len(), 2);
}

#[tokio::test]
async fn cancelled_photo_send_releases_the_busy_flag() {
    let gate = Arc::new(Semaphore::new(0));
    let (composer, documents, _) = setup(BlobBehavior {
        gate: Some(gate),
        ..BlobBehavior::default()
    });
    let composer = Arc::new(composer);
    let mut busy = composer.busy_updates();

    let in_flight = {
        let composer = Arc::clone(&composer);
        tokio::spawn(async move { composer.send_photo(png_bytes(32, 32)).await })
    };
    busy.wait_for(|busy| *busy).await.unwrap();

    in_flight.abort();
    assert!(in_flight.await.unwrap_err().is_cancelled());

    busy.wait_for(|busy| !*busy).await.unwrap();
    assert!(!composer.is_busy());
    assert!(documents.writes().is_empty());
}

#[tokio::test]
async fn photo_round_trip_through_sqlite() {
    init_logging();
    let store = Arc::new(SqliteStore::in_memory("blob://local").unwrap());
    let composer = OutboundComposer::new(
        ChannelRef::new("c1", "general"),
        test_config().sender(),
        Backend::new(store.clone(), store.clone()),
        ImageCompressor::new(&ImageConfig::default()),
    );

    let message = composer.send_photo(png_bytes(1024, 256)).await.unwrap();

    let MessageKind::Photo(Some(url)) = &message.kind else {
        panic!("expected a photo with url");
    };
    let key = url.strip_prefix("blob://local/").unwrap();
    let blob = store.blob_info(key).unwrap().unwrap();
    assert_eq!(blob.content_type, "image/jpeg");
    assert_eq!(store.resolve_download_url(key).await.unwrap().as_deref(), Some(url.as_str()));
    assert_eq!(store.document_count("c1").unwrap(), 1);
}
