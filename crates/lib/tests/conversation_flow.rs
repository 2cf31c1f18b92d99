//! End-to-end conversation flow against an in-process mock API: poll, send,
//! re-fetch without duplication, and the two-phase attachment upload
//! (including the phase-2 failure that orphans the stored resource).

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use lib::alerts::Alerts;
use lib::attachment::{AttachmentPipeline, UploadError};
use lib::config::Config;
use lib::credentials::{CredentialStore, Credentials};
use lib::endpoints;
use lib::message::{
    Attachment, ConversationItem, MediaKind, Message, SenderRole, UploadResponse,
};
use lib::sync::ConversationSync;
use lib::thumbnail::NoopFrameExtractor;
use lib::transport::Transport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

#[derive(Clone, Default)]
struct ServerState {
    messages: Arc<RwLock<Vec<Message>>>,
    next_id: Arc<AtomicUsize>,
    fail_send: Arc<AtomicBool>,
}

async fn list(State(state): State<ServerState>) -> Json<Vec<Message>> {
    Json(state.messages.read().await.clone())
}

/// Create a message record. A body carrying `url` is an attachment record;
/// anything else is plain text. The server is the id authority.
async fn send(
    State(state): State<ServerState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<Message>, StatusCode> {
    if state.fail_send.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let id = format!("srv-{}", state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    let text = body
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let attachment = body.get("url").and_then(|v| v.as_str()).map(|url| Attachment {
        url: url.to_string(),
        kind: body
            .get("type")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
        filename: body
            .get("filename")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        thumbnail_url: None,
    });
    let message = Message {
        id,
        sender: SenderRole::Client,
        text,
        timestamp: Utc::now(),
        attachment,
    };
    state.messages.write().await.push(message.clone());
    Ok(Json(message))
}

async fn upload() -> Json<UploadResponse> {
    Json(UploadResponse {
        url: "https://cdn.test/stored/notes.txt".to_string(),
        kind: MediaKind::Document,
        filename: "notes.txt".to_string(),
        size: 11,
    })
}

async fn start_server() -> (String, ServerState) {
    let state = ServerState::default();
    let app = Router::new()
        .route("/chat/coach/messages", get(list))
        .route("/chat/coach/send", post(send))
        .route("/chat/upload", post(upload))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{}", addr), state)
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("coachline-flow-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

async fn test_rig(
    base_url: String,
) -> (
    Arc<ConversationSync>,
    AttachmentPipeline,
    mpsc::Receiver<Vec<ConversationItem>>,
) {
    let config = Config {
        base_url,
        ..Config::default()
    };
    let credentials = CredentialStore::open(temp_dir().join("credentials.json"));
    credentials
        .store(Credentials {
            token: "tok-123".to_string(),
        })
        .await
        .expect("store credentials");
    let alerts = Alerts::new();
    let transport = Transport::new(&config, credentials, alerts.clone());
    let pipeline = AttachmentPipeline::new(
        transport.clone(),
        alerts,
        Arc::new(NoopFrameExtractor),
        config.upload_timeout_ms,
    );
    let (tx, rx) = mpsc::channel(16);
    let sync = Arc::new(ConversationSync::new(
        transport,
        endpoints::resolve(SenderRole::Client, SenderRole::Coach),
        chrono::FixedOffset::east_opt(0).expect("utc"),
        60,
        tx,
    ));
    (sync, pipeline, rx)
}

fn message_texts(items: &[ConversationItem]) -> Vec<String> {
    items
        .iter()
        .filter_map(|i| i.as_message())
        .map(|m| m.text.clone())
        .collect()
}

#[tokio::test]
async fn send_then_refetch_does_not_duplicate() {
    let (base, _state) = start_server().await;
    let (sync, _pipeline, mut rx) = test_rig(base).await;

    sync.poll_once().await.expect("initial fetch");
    assert!(rx.recv().await.expect("snapshot").is_empty());

    sync.send_text("hi").await.expect("send");
    let after_send = rx.recv().await.expect("snapshot");
    assert_eq!(after_send.len(), 2);
    assert_eq!(
        after_send[0],
        ConversationItem::DateMarker(Utc::now().date_naive())
    );
    let sent = after_send[1].as_message().expect("message");
    assert_eq!(sent.text, "hi");
    assert_eq!(sent.id, "srv-1");

    // The next poll returns the same record; ids reconcile, nothing doubles.
    sync.poll_once().await.expect("refetch");
    let after_poll = rx.recv().await.expect("snapshot");
    assert_eq!(after_poll.len(), 2);
    assert_eq!(message_texts(&after_poll), vec!["hi"]);
}

#[tokio::test]
async fn attachment_upload_lands_in_the_conversation() {
    let (base, _state) = start_server().await;
    let (sync, pipeline, mut rx) = test_rig(base).await;

    let source = temp_dir().join("notes.txt");
    std::fs::write(&source, "weekly plan").expect("write source");

    let pending = pipeline.prepare(&source).await.expect("prepare");
    assert_eq!(pending.kind, MediaKind::Document);

    sync.send_attachment(&pipeline, pending, "here you go")
        .await
        .expect("upload");

    let snapshot = rx.recv().await.expect("snapshot");
    assert_eq!(snapshot.len(), 2);
    let message = snapshot[1].as_message().expect("message");
    assert_eq!(message.text, "here you go");
    let attachment = message.attachment.as_ref().expect("attachment");
    assert_eq!(attachment.url, "https://cdn.test/stored/notes.txt");
    assert_eq!(attachment.kind, MediaKind::Document);
}

#[tokio::test]
async fn phase_two_failure_reports_the_orphaned_resource() {
    let (base, state) = start_server().await;
    let (sync, pipeline, _rx) = test_rig(base).await;

    let source = temp_dir().join("notes.txt");
    std::fs::write(&source, "weekly plan").expect("write source");
    let pending = pipeline.prepare(&source).await.expect("prepare");

    state.fail_send.store(true, Ordering::SeqCst);
    let err = sync
        .send_attachment(&pipeline, pending, "here you go")
        .await
        .expect_err("phase 2 must fail");

    match err {
        UploadError::MessagePost { url, .. } => {
            assert_eq!(url, "https://cdn.test/stored/notes.txt");
        }
        other => panic!("expected MessagePost, got {:?}", other),
    }
    // The attachment was discarded; the conversation is untouched.
    assert!(sync.snapshot().await.is_empty());
}
