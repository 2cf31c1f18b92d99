//! Process-wide alert channel for session expiry and unexpected failures.
//!
//! Not a global: the handle is cloneable and passed explicitly into the
//! transport and attachment pipeline constructors. The UI shell subscribes
//! once on mount and translates keys (literal key is the fallback text).
//! Publishing with no subscriber is a no-op.

use tokio::sync::broadcast;

/// Key published when the server rejects the session and the user must re-authenticate.
pub const SESSION_EXPIRED: &str = "session.expired";

/// Cloneable sink for user-facing error keys.
#[derive(Clone)]
pub struct Alerts {
    tx: broadcast::Sender<String>,
}

impl Default for Alerts {
    fn default() -> Self {
        Self::new()
    }
}

impl Alerts {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Publish an error key. Fire-and-forget; dropped when nobody listens.
    pub fn notify(&self, key: &str) {
        log::debug!("alert: {}", key);
        let _ = self.tx.send(key.to_string());
    }

    /// Subscribe to published keys. The UI binds one subscriber for the
    /// process lifetime; tests may bind more.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}
