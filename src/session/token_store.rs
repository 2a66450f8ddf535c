//! Durable storage for the single auth token a client keeps between runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait TokenStore: Send + Sync {
    /// Returns the persisted token, or Ok(None) if there is none.
    fn load(&self) -> Result<Option<String>>;

    /// Persists the token, replacing any previous one.
    fn save(&self, token: &str) -> Result<()>;

    /// Removes the persisted token. Succeeds if there was none.
    fn clear(&self) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct TokenFile {
    token: String,
    saved_at: i64,
}

/// Keeps the token in a small JSON file.
pub struct FileTokenStore {
    file_path: PathBuf,
}

impl FileTokenStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.file_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read token file {:?}", self.file_path))?;
        let file: TokenFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token file {:?}", self.file_path))?;
        if file.token.is_empty() {
            return Ok(None);
        }
        Ok(Some(file.token))
    }

    fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let file = TokenFile {
            token: token.to_string(),
            saved_at: chrono::Utc::now().timestamp(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.file_path, json)
            .with_context(|| format!("Failed to write token file {:?}", self.file_path))
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.file_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove token file {:?}", self.file_path)),
        }
    }
}

/// In-memory token storage, for tests and ephemeral clients.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.slot().clone())
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
