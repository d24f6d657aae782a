//! [`TokenStore`] implementations
//!
//! [`MemoryTokenStore`] keeps the pair for the lifetime of the process.
//! [`FileTokenStore`] persists it as a small JSON document so a session
//! survives restarts; a missing file means "signed out".

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use rentline_core::{StorageError, TokenStore};
use rentline_domain::TokenPair;
use tracing::debug;

/// Process-local token slot.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start signed in with `tokens`.
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self { tokens: RwLock::new(Some(tokens)) }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn access_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.tokens.read().as_ref().map(|t| t.access.clone()))
    }

    async fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.tokens.read().as_ref().and_then(|t| t.refresh.clone()))
    }

    async fn store(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        *self.tokens.write() = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.tokens.write() = None;
        Ok(())
    }
}

/// JSON file backed token slot.
///
/// Reads go through an in-memory copy loaded lazily on first access.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cache: RwLock<Option<Option<TokenPair>>>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: RwLock::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn current(&self) -> Result<Option<TokenPair>, StorageError> {
        if let Some(cached) = self.cache.read().as_ref() {
            return Ok(cached.clone());
        }

        let loaded = match tokio::fs::read(&self.path).await {
            Ok(bytes) => Some(
                serde_json::from_slice::<TokenPair>(&bytes)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?,
            ),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        // A store() that finished during the read wins over the file contents.
        let mut cache = self.cache.write();
        match cache.as_ref() {
            Some(current) => Ok(current.clone()),
            None => {
                *cache = Some(loaded.clone());
                Ok(loaded)
            }
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn access_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.current().await?.map(|t| t.access))
    }

    async fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.current().await?.and_then(|t| t.refresh))
    }

    async fn store(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec_pretty(tokens).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Staged write, then rename into place.
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        *self.cache.write() = Some(Some(tokens.clone()));
        debug!(path = %self.path.display(), "Stored token pair");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        *self.cache.write() = Some(None);
        debug!(path = %self.path.display(), "Cleared token pair");
        Ok(())
    }
}
