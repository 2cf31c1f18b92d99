//! Attachment pipeline: classify a picked file, derive a thumbnail, then
//! deliver it with a two-phase upload (binary upload, then the message
//! record referencing the stored resource).
//!
//! A failure anywhere discards the pending attachment; the user re-picks and
//! retries from scratch. Phase 1 success followed by phase 2 failure leaves
//! an orphaned stored resource on the server; the error carries its url.

use crate::alerts::Alerts;
use crate::endpoints::UPLOAD_PATH;
use crate::message::{MediaKind, Message, SendAttachmentBody, UploadResponse};
use crate::thumbnail::{FrameExtractor, DOCUMENT_PLACEHOLDER};
use crate::transport::{RequestOptions, Transport, TransportError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Canonical MIME type and extension for a detected media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub kind: MediaKind,
    pub mime: &'static str,
    pub extension: &'static str,
}

/// Classify a file by its extension. Unknown or missing extensions are
/// accepted as generic documents.
pub fn classify(filename: &str) -> MediaType {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => media(MediaKind::Image, "image/jpeg", "jpg"),
        Some("png") => media(MediaKind::Image, "image/png", "png"),
        Some("gif") => media(MediaKind::Image, "image/gif", "gif"),
        Some("webp") => media(MediaKind::Image, "image/webp", "webp"),
        Some("heic") => media(MediaKind::Image, "image/heic", "heic"),
        Some("mp4") | Some("m4v") => media(MediaKind::Video, "video/mp4", "mp4"),
        Some("mov") => media(MediaKind::Video, "video/quicktime", "mov"),
        Some("webm") => media(MediaKind::Video, "video/webm", "webm"),
        Some("pdf") => media(MediaKind::Document, "application/pdf", "pdf"),
        Some("txt") => media(MediaKind::Document, "text/plain", "txt"),
        Some("csv") => media(MediaKind::Document, "text/csv", "csv"),
        Some("docx") => media(
            MediaKind::Document,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "docx",
        ),
        _ => media(MediaKind::Document, "application/octet-stream", "bin"),
    }
}

fn media(kind: MediaKind, mime: &'static str, extension: &'static str) -> MediaType {
    MediaType {
        kind,
        mime,
        extension,
    }
}

/// Rewrite the filename with the canonical extension for its detected type
/// ("IMG_1.JPEG" -> "IMG_1.jpg"; extensionless files get the fallback).
pub fn canonical_filename(filename: &str, media: MediaType) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("attachment");
    format!("{}.{}", stem, media.extension)
}

/// Observable pipeline states for one attachment. Idle and Picking happen in
/// the shell before a `PendingAttachment` exists; Done and Failed are
/// terminal (Failed discards the attachment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Classified,
    ThumbnailReady,
    Uploading,
    Done,
    Failed,
}

/// A picked file on its way to becoming a message. Transient: consumed by a
/// successful upload or discarded, never persisted.
#[derive(Debug, Clone)]
pub struct PendingAttachment {
    pub id: Uuid,
    pub source: PathBuf,
    pub kind: MediaKind,
    pub mime: &'static str,
    pub filename: String,
    pub thumbnail: Option<String>,
    pub state: AttachmentState,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("another attachment is still being prepared")]
    Busy,
    #[error("cannot read attachment source: {0}")]
    Source(#[from] std::io::Error),
    #[error("binary upload failed: {0}")]
    Upload(TransportError),
    #[error("upload response malformed: {0}")]
    BadResponse(String),
    #[error("message record creation failed, stored resource orphaned at {url}: {source}")]
    MessagePost { url: String, source: TransportError },
}

/// Classifies, thumbnails, and uploads attachments over the shared transport.
pub struct AttachmentPipeline {
    transport: Transport,
    alerts: Alerts,
    extractor: Arc<dyn FrameExtractor>,
    upload_timeout_ms: u64,
    preparing: AtomicBool,
}

impl AttachmentPipeline {
    pub fn new(
        transport: Transport,
        alerts: Alerts,
        extractor: Arc<dyn FrameExtractor>,
        upload_timeout_ms: u64,
    ) -> Self {
        Self {
            transport,
            alerts,
            extractor,
            upload_timeout_ms,
            preparing: AtomicBool::new(false),
        }
    }

    /// Classify the picked file and derive its thumbnail. Video frame
    /// extraction can take a while, so only one prepare may be in flight;
    /// a second concurrent pick is rejected with `Busy` until this one
    /// resolves or fails. Thumbnail failure is soft: the attachment goes on
    /// without one.
    pub async fn prepare(&self, path: &Path) -> Result<PendingAttachment, UploadError> {
        if self.preparing.swap(true, Ordering::SeqCst) {
            return Err(UploadError::Busy);
        }
        let result = self.prepare_inner(path).await;
        self.preparing.store(false, Ordering::SeqCst);
        result
    }

    async fn prepare_inner(&self, path: &Path) -> Result<PendingAttachment, UploadError> {
        let original = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        let media = classify(&original);
        let filename = canonical_filename(&original, media);
        log::debug!(
            "attachment {} classified as {:?} ({})",
            original,
            media.kind,
            media.mime
        );

        let source_str = path.to_string_lossy().to_string();
        let thumbnail = match media.kind {
            MediaKind::Image => Some(source_str),
            MediaKind::Document => Some(DOCUMENT_PLACEHOLDER.to_string()),
            MediaKind::Video => match self.extractor.extract(&source_str).await {
                Ok(frame) => Some(frame),
                Err(e) => {
                    log::debug!("no compose thumbnail for {}: {}", original, e);
                    None
                }
            },
        };

        Ok(PendingAttachment {
            id: Uuid::new_v4(),
            source: path.to_path_buf(),
            kind: media.kind,
            mime: media.mime,
            filename,
            thumbnail,
            state: AttachmentState::ThumbnailReady,
        })
    }

    /// Two-phase delivery: upload the binary to the dedicated upload address
    /// (long timeout), then create the message record on the conversation's
    /// send address (default timeout). Consumes the pending attachment either
    /// way; on failure the user re-picks.
    pub async fn upload(
        &self,
        mut pending: PendingAttachment,
        caption: &str,
        send_path: &str,
    ) -> Result<Message, UploadError> {
        pending.state = AttachmentState::Uploading;
        log::debug!("attachment {}: {:?}", pending.id, pending.state);

        let bytes = tokio::fs::read(&pending.source).await?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(pending.filename.clone())
            .mime_str(pending.mime)
            .map_err(|e| UploadError::BadResponse(format!("building multipart part: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let res = self
            .transport
            .request(
                UPLOAD_PATH,
                RequestOptions::post_multipart(form).timeout_ms(self.upload_timeout_ms),
            )
            .await
            .map_err(UploadError::Upload)?;
        let stored: UploadResponse = res
            .json()
            .await
            .map_err(|e| UploadError::BadResponse(e.to_string()))?;
        log::debug!("attachment {} stored at {}", pending.id, stored.url);

        let record = SendAttachmentBody {
            kind: stored.kind,
            text: caption.to_string(),
            url: stored.url.clone(),
            filename: if stored.filename.is_empty() {
                pending.filename.clone()
            } else {
                stored.filename.clone()
            },
            size: stored.size,
        };
        let message: Message = match self.transport.post_json(send_path, &record).await {
            Ok(m) => m,
            Err(source) => {
                pending.state = AttachmentState::Failed;
                log::warn!(
                    "attachment {}: {:?}, message record failed after upload; orphaned resource at {}",
                    pending.id,
                    pending.state,
                    stored.url
                );
                self.alerts.notify("error.upload.partial");
                return Err(UploadError::MessagePost {
                    url: stored.url,
                    source,
                });
            }
        };

        pending.state = AttachmentState::Done;
        log::debug!("attachment {}: {:?}", pending.id, pending.state);
        Ok(message)
    }
}
