//! Port interfaces for realtime sockets

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by socket adapters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RealtimeError {
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("socket send failed: {0}")]
    Send(String),

    #[error("socket receive failed: {0}")]
    Receive(String),

    #[error("channel is not open")]
    NotConnected,
}

/// One frame read from a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Close frame with an optional reason.
    Close(Option<String>),
}

/// An open duplex socket.
#[async_trait]
pub trait SocketStream: Send {
    async fn send_text(&mut self, text: String) -> Result<(), RealtimeError>;

    /// Next inbound frame; `None` once the peer is gone.
    ///
    /// Must be cancel safe: the channel drives it inside `select!`.
    async fn next_frame(&mut self) -> Option<Result<SocketFrame, RealtimeError>>;

    async fn close(&mut self) -> Result<(), RealtimeError>;
}

/// Opens sockets.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn SocketStream>, RealtimeError>;
}
