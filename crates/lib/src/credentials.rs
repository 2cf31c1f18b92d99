//! Persisted session credentials: a single bearer token stored as JSON
//! (e.g. `~/.coachline/credentials.json`) and shared in memory between the
//! transport and session teardown.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persisted credentials. Survives process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub token: String,
}

impl Credentials {
    /// Load from JSON file. Returns None if file missing or invalid.
    pub fn load(path: &Path) -> Option<Self> {
        let s = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&s).ok()
    }

    /// Save to JSON file. Creates parent dirs if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let s = serde_json::to_string_pretty(self)?;
        std::fs::write(path, s)?;
        Ok(())
    }
}

/// Shared credential store: the transport reads the token from here on every
/// request; session teardown clears it (memory and disk).
#[derive(Clone)]
pub struct CredentialStore {
    path: PathBuf,
    inner: Arc<RwLock<Option<Credentials>>>,
}

impl CredentialStore {
    /// Open the store, loading any persisted credentials from `path`.
    pub fn open(path: PathBuf) -> Self {
        let loaded = Credentials::load(&path);
        Self {
            path,
            inner: Arc::new(RwLock::new(loaded)),
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|c| c.token.clone())
    }

    /// Store new credentials in memory and on disk (e.g. after login).
    pub async fn store(&self, credentials: Credentials) -> Result<()> {
        credentials.save(&self.path)?;
        *self.inner.write().await = Some(credentials);
        Ok(())
    }

    /// Drop credentials from memory and disk. Removal failure is logged,
    /// not surfaced; the in-memory copy is gone either way.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}
