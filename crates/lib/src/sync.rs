//! Conversation sync engine: a fixed-interval fetch loop plus direct sends,
//! all funneled through the same reconciliation step.
//!
//! The engine is the sole writer of the canonical item list. Display code
//! listens on the updates channel and renders whatever snapshot arrives; it
//! never mutates the list itself.

use crate::attachment::{AttachmentPipeline, PendingAttachment, UploadError};
use crate::endpoints::ConversationEndpoints;
use crate::message::{ConversationItem, Message, SendTextBody};
use crate::reconcile;
use crate::transport::{Transport, TransportError};
use chrono::FixedOffset;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{AbortHandle, JoinHandle};

/// One conversation screen's sync state and its background poll loop.
pub struct ConversationSync {
    transport: Transport,
    endpoints: ConversationEndpoints,
    tz: FixedOffset,
    poll_interval: Duration,
    items: RwLock<Vec<ConversationItem>>,
    updates_tx: mpsc::Sender<Vec<ConversationItem>>,
    running: AtomicBool,
    in_flight: AtomicBool,
    poll_task: Mutex<Option<AbortHandle>>,
}

impl ConversationSync {
    /// `updates_tx` receives a full snapshot after every merge; `tz` is the
    /// viewer's local offset used to place day boundaries.
    pub fn new(
        transport: Transport,
        endpoints: ConversationEndpoints,
        tz: FixedOffset,
        poll_interval_secs: u64,
        updates_tx: mpsc::Sender<Vec<ConversationItem>>,
    ) -> Self {
        Self {
            transport,
            endpoints,
            tz,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            items: RwLock::new(Vec::new()),
            updates_tx,
            running: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            poll_task: Mutex::new(None),
        }
    }

    /// Start the background fetch loop (first fetch fires immediately).
    /// Returns a handle to await on shutdown.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "conversation sync: polling {} every {}s",
            self.endpoints.fetch_path,
            self.poll_interval.as_secs()
        );
        let me = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(me.poll_interval);
            loop {
                ticker.tick().await;
                if !me.running.load(Ordering::SeqCst) {
                    break;
                }
                // A missed poll is retried on the next tick; no user-visible error.
                if let Err(e) = me.poll_once().await {
                    log::warn!("conversation fetch failed, retrying next tick: {}", e);
                }
            }
        });
        if let Ok(mut slot) = self.poll_task.lock() {
            *slot = Some(handle.abort_handle());
        }
        handle
    }

    /// Stop polling and cancel any fetch still in flight. The canonical list
    /// stays readable after teardown.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.poll_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        log::info!("conversation sync: stopped");
    }

    /// Fetch and merge once. Skips (successfully) when a previous fetch is
    /// still outstanding, so timer ticks and manual refreshes never pile up.
    pub async fn poll_once(&self) -> Result<(), TransportError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            log::debug!("fetch already in flight, skipping");
            return Ok(());
        }
        let result = self.fetch_and_merge().await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn fetch_and_merge(&self) -> Result<(), TransportError> {
        let incoming: Vec<Message> = self.transport.get_json(&self.endpoints.fetch_path).await?;
        self.apply(incoming).await;
        Ok(())
    }

    /// Send a text message; the confirmed record is merged in immediately
    /// rather than waiting for the next tick.
    pub async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        let body = SendTextBody {
            text: text.to_string(),
        };
        let message: Message = self
            .transport
            .post_json(&self.endpoints.send_path, &body)
            .await?;
        self.apply(vec![message]).await;
        Ok(())
    }

    /// Deliver a prepared attachment through the two-phase upload, then merge
    /// the resulting message like any fetched one.
    pub async fn send_attachment(
        &self,
        pipeline: &AttachmentPipeline,
        pending: PendingAttachment,
        caption: &str,
    ) -> Result<(), UploadError> {
        let message = pipeline
            .upload(pending, caption, &self.endpoints.send_path)
            .await?;
        self.apply(vec![message]).await;
        Ok(())
    }

    /// Current canonical item list.
    pub async fn snapshot(&self) -> Vec<ConversationItem> {
        self.items.read().await.clone()
    }

    /// The single merge point: everything that changes the list goes through
    /// here, then the new snapshot is published to the display listener.
    async fn apply(&self, incoming: Vec<Message>) {
        let merged = {
            let mut items = self.items.write().await;
            let merged = reconcile::merge(&items, incoming, self.tz);
            *items = merged.clone();
            merged
        };
        if self.updates_tx.send(merged).await.is_err() {
            log::debug!("no display listener for conversation update");
        }
    }
}
