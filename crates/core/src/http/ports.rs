//! Port interface for the HTTP transport
//!
//! The request executor never talks to an HTTP library directly. It lowers a
//! [`RequestDescriptor`](rentline_domain::RequestDescriptor) into a
//! [`TransportRequest`] with an absolute URL and encoded body, and receives a
//! raw [`TransportResponse`] back. Status classification happens above this
//! port, so any status code is a successful send.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rentline_domain::{FormPart, Method};
use thiserror::Error;

/// Encoded request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TransportBody {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// Multipart form; the transport picks the boundary and content type.
    Multipart(Vec<FormPart>),
}

/// A fully resolved request ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: TransportBody,
    /// Upper bound for the whole exchange.
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: TransportBody::Empty,
            timeout: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Raw response as received from the network.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, headers: BTreeMap::new(), body }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures that happen before a response is received.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Sends HTTP requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange. Non-2xx statuses are returned as responses.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
