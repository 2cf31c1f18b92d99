//! Message data model and wire shapes.
//!
//! The server speaks a flat camelCase record: `{ id, sender, text, timestamp,
//! url?, type?, filename?, thumbnailUrl? }`. Attachment fields are flattened
//! into the record; a record without `url` is a plain text message.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message. Closed set; lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Client,
    Coach,
    Support,
}

/// Declared media kind of an attachment. Unknown uploads are accepted as documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    #[default]
    Document,
}

/// Attachment reference carried by a message (flattened into the wire record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    /// Declared kind; defaults to document when the server omits it.
    #[serde(default, rename = "type")]
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// A chat message as fetched from (or confirmed by) the server.
/// The server is the sole id authority; ids are opaque and unique per conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: SenderRole,
    /// May be empty when an attachment is present.
    #[serde(default)]
    pub text: String,
    /// Server clock, UTC.
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub attachment: Option<Attachment>,
}

/// One entry of the displayed sequence: a real message or a synthetic
/// day boundary. DateMarkers are derived, never persisted, and are fully
/// recomputed on every merge.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationItem {
    Message(Message),
    /// Calendar date in the viewer's local time zone.
    DateMarker(NaiveDate),
}

impl ConversationItem {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            ConversationItem::Message(m) => Some(m),
            ConversationItem::DateMarker(_) => None,
        }
    }
}

/// Body for sending a plain text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTextBody {
    pub text: String,
}

/// Body for creating the message record that references an uploaded resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAttachmentBody {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub text: String,
    pub url: String,
    pub filename: String,
    pub size: u64,
}

/// Stored-resource descriptor returned by the binary upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    #[serde(default, rename = "type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_record_decodes_without_attachment() {
        let m: Message = serde_json::from_str(
            r#"{"id":"m1","sender":"coach","text":"hello","timestamp":"2024-01-01T10:00:00Z"}"#,
        )
        .expect("decode");
        assert_eq!(m.id, "m1");
        assert_eq!(m.sender, SenderRole::Coach);
        assert!(m.attachment.is_none());
    }

    #[test]
    fn attachment_record_decodes_flattened_fields() {
        let m: Message = serde_json::from_str(
            r#"{"id":"m2","sender":"client","text":"","timestamp":"2024-01-01T10:00:00Z","url":"https://cdn/x.mp4","type":"video","filename":"x.mp4"}"#,
        )
        .expect("decode");
        let att = m.attachment.expect("attachment");
        assert_eq!(att.kind, MediaKind::Video);
        assert_eq!(att.url, "https://cdn/x.mp4");
        assert_eq!(att.thumbnail_url, None);
    }

    #[test]
    fn missing_type_defaults_to_document() {
        let m: Message = serde_json::from_str(
            r#"{"id":"m3","sender":"client","text":"","timestamp":"2024-01-01T10:00:00Z","url":"https://cdn/report"}"#,
        )
        .expect("decode");
        assert_eq!(m.attachment.expect("attachment").kind, MediaKind::Document);
    }
}
