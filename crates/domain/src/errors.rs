//! Error types used throughout the client
//!
//! Every failure is classified exactly once, at the point where it is
//! observed (HTTP status, transport failure, decode failure), into an
//! [`ApiError`] variant. Callers that need the flat wire-friendly shape use
//! [`ApiError::normalize`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::impl_wire_names;
use crate::types::Notice;

/// Closed taxonomy of error codes surfaced to application code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BackendUnhealthy,
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    ServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    NetworkError,
    UnknownError,
}

impl_wire_names!(ErrorCode {
    BackendUnhealthy => "BACKEND_UNHEALTHY",
    ValidationError => "VALIDATION_ERROR",
    Unauthorized => "UNAUTHORIZED",
    Forbidden => "FORBIDDEN",
    NotFound => "NOT_FOUND",
    RateLimited => "RATE_LIMITED",
    ServerError => "SERVER_ERROR",
    BadGateway => "BAD_GATEWAY",
    ServiceUnavailable => "SERVICE_UNAVAILABLE",
    GatewayTimeout => "GATEWAY_TIMEOUT",
    NetworkError => "NETWORK_ERROR",
    UnknownError => "UNKNOWN_ERROR",
});

impl ErrorCode {
    /// Map a 5xx status onto its code.
    pub fn for_server_status(status: u16) -> Self {
        match status {
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            _ => Self::ServerError,
        }
    }

    /// Short human title used for user-facing notices.
    pub fn title(&self) -> &'static str {
        match self {
            Self::BackendUnhealthy => "Service unavailable",
            Self::ValidationError => "Invalid request",
            Self::Unauthorized => "Session expired",
            Self::Forbidden => "Access denied",
            Self::NotFound => "Not found",
            Self::RateLimited => "Too many requests",
            Self::ServerError => "Server error",
            Self::BadGateway => "Bad gateway",
            Self::ServiceUnavailable => "Service unavailable",
            Self::GatewayTimeout => "Gateway timeout",
            Self::NetworkError => "Connection problem",
            Self::UnknownError => "Something went wrong",
        }
    }
}

/// Canonical flat shape every failure converges to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub message: String,
    /// HTTP status, or `0` when no response was received.
    pub status: u16,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Main error type for API operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Backend is currently unavailable")]
    BackendUnhealthy,

    #[error("Validation failed: {message}")]
    Validation { message: String, errors: Option<Value> },

    #[error("Authentication required: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String, retry_after: Option<Duration> },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String, body: Option<Value> },

    #[error("Unexpected status ({status}): {message}")]
    Http { status: u16, message: String, body: Option<Value> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Error code in the closed taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BackendUnhealthy => ErrorCode::BackendUnhealthy,
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Server { status, .. } => ErrorCode::for_server_status(*status),
            Self::Network(_) | Self::Timeout(_) => ErrorCode::NetworkError,
            Self::Http { .. } | Self::Decode(_) | Self::Config(_) => ErrorCode::UnknownError,
        }
    }

    /// HTTP status associated with the error (`0` when none was received).
    pub fn status(&self) -> u16 {
        match self {
            Self::BackendUnhealthy => 503,
            Self::Validation { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::Server { status, .. } | Self::Http { status, .. } => *status,
            Self::Network(_) | Self::Timeout(_) | Self::Decode(_) | Self::Config(_) => 0,
        }
    }

    /// Payload that accompanied the failure, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Validation { errors, .. } => errors.as_ref(),
            Self::Server { body, .. } | Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Shorthand for an authentication failure.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Whether the failure is transient and the request may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. } | Self::RateLimited { .. }
        )
    }

    /// Server-provided delay before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Project onto the canonical flat shape.
    pub fn normalize(&self) -> NormalizedError {
        NormalizedError {
            message: self.to_string(),
            status: self.status(),
            code: self.code(),
            data: self.data().cloned(),
        }
    }

    /// User-facing notice for this failure.
    pub fn notice(&self) -> Notice {
        let code = self.code();
        let description = match self {
            Self::BackendUnhealthy => {
                "The server is not responding right now. Please try again shortly.".to_string()
            }
            Self::Unauthorized { .. } => "Please sign in again to continue.".to_string(),
            Self::Network(_) | Self::Timeout(_) => {
                "Check your internet connection and try again.".to_string()
            }
            Self::Validation { message, .. }
            | Self::Forbidden { message }
            | Self::NotFound { message }
            | Self::RateLimited { message, .. } => message.clone(),
            Self::Server { .. } => {
                "The server encountered an error. Please try again later.".to_string()
            }
            Self::Http { message, .. } | Self::Decode(message) | Self::Config(message) => {
                message.clone()
            }
        };
        Notice { title: code.title().to_string(), description, code }
    }
}

impl From<ApiError> for NormalizedError {
    fn from(err: ApiError) -> Self {
        err.normalize()
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;
