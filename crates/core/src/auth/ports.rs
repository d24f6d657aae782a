//! Port interfaces for authentication state

use async_trait::async_trait;
use rentline_domain::{ApiError, TokenPair};
use thiserror::Error;

/// Token persistence failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("token storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("token storage is corrupt: {0}")]
    Corrupt(String),
}

/// Durable slot for the current token pair
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current access token, if signed in
    async fn access_token(&self) -> Result<Option<String>, StorageError>;

    /// Current refresh token, if any
    async fn refresh_token(&self) -> Result<Option<String>, StorageError>;

    /// Replace the stored pair
    async fn store(&self, tokens: &TokenPair) -> Result<(), StorageError>;

    /// Remove both tokens
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;
}

/// Sends the user back to the sign-in screen after a hard auth failure
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}
