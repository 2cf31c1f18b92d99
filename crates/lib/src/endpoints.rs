//! Conversation endpoint resolution: the viewer/counterpart role pair maps
//! to a (fetch, send) path pair via a static table. The pair is opaque to the
//! rest of the core and immutable for the life of a conversation screen.

use crate::message::SenderRole;

/// Binary attachment uploads always go to the dedicated upload address.
pub const UPLOAD_PATH: &str = "/chat/upload";

/// Auth endpoints that must never trigger session teardown on 401.
pub const AUTH_PATHS: &[&str] = &["/auth/login", "/auth/register"];

/// Fetch and send addresses for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEndpoints {
    pub fetch_path: String,
    pub send_path: String,
}

impl ConversationEndpoints {
    fn new(fetch_path: &str, send_path: &str) -> Self {
        Self {
            fetch_path: fetch_path.to_string(),
            send_path: send_path.to_string(),
        }
    }
}

/// Resolve the endpoint pair for a conversation. Support conversations share
/// one pair regardless of which side the viewer is on.
pub fn resolve(viewer: SenderRole, counterpart: SenderRole) -> ConversationEndpoints {
    match (viewer, counterpart) {
        (SenderRole::Client, SenderRole::Coach) => {
            ConversationEndpoints::new("/chat/coach/messages", "/chat/coach/send")
        }
        (SenderRole::Coach, SenderRole::Client) => {
            ConversationEndpoints::new("/chat/clients/messages", "/chat/clients/send")
        }
        _ => ConversationEndpoints::new("/chat/support/messages", "/chat/support/send"),
    }
}

/// True when `path` is one of the unauthenticated auth endpoints.
pub fn is_auth_path(path: &str) -> bool {
    AUTH_PATHS.contains(&path)
}
