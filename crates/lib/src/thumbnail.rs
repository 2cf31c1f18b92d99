//! Best-effort thumbnail derivation for message attachments.
//!
//! Frame extraction is platform work (AVFoundation, MediaMetadataRetriever,
//! ffmpeg...), so it sits behind a trait the shell implements. Thumbnail
//! absence is always a soft failure: the display falls back to a generic
//! placeholder, never to an error.

use crate::message::{MediaKind, Message};
use async_trait::async_trait;

/// Static preview used for document attachments; no content inspection.
pub const DOCUMENT_PLACEHOLDER: &str = "asset://thumbnails/document.png";

/// Extracts one displayable frame from a video. `source` is a local file
/// path when composing and a remote url when displaying a fetched message.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(&self, source: &str) -> anyhow::Result<String>;
}

/// Extractor for shells without video support (CLI, tests): always fails,
/// so video messages render the generic placeholder.
pub struct NoopFrameExtractor;

#[async_trait]
impl FrameExtractor for NoopFrameExtractor {
    async fn extract(&self, _source: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("frame extraction not available"))
    }
}

/// Return a copy of `message` with a thumbnail resolved where possible.
/// Idempotent and cheap when the thumbnail is already known; never mutates
/// the input and never fails.
pub async fn resolve(message: &Message, extractor: &dyn FrameExtractor) -> Message {
    let mut out = message.clone();
    let Some(att) = out.attachment.as_mut() else {
        return out;
    };
    if att.thumbnail_url.is_some() {
        return out;
    }
    match att.kind {
        MediaKind::Image => att.thumbnail_url = Some(att.url.clone()),
        MediaKind::Document => att.thumbnail_url = Some(DOCUMENT_PLACEHOLDER.to_string()),
        MediaKind::Video => match extractor.extract(&att.url).await {
            Ok(frame) => att.thumbnail_url = Some(frame),
            Err(e) => {
                log::debug!("no thumbnail for {}: {}", att.url, e);
            }
        },
    }
    out
}
