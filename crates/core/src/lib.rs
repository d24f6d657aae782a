//! # Rentline Core
//!
//! Port interfaces between the client services and the outside world.
//!
//! This crate contains:
//! - The HTTP [`Transport`] the request executor sends through
//! - Token persistence and refresh ports
//! - The interceptor pipeline contracts
//! - Notification and login-redirect sinks
//! - The socket ports the realtime channel runs on
//!
//! ## Architecture Principles
//! - Only depends on `rentline-domain`
//! - No HTTP, socket or filesystem code
//! - All external dependencies via traits

pub mod auth;
pub mod http;
pub mod notify;
pub mod pipeline;
pub mod realtime;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth::ports::{LoginRedirect, StorageError, TokenRefresher, TokenStore};
pub use http::ports::{
    Transport, TransportBody, TransportError, TransportRequest, TransportResponse,
};
pub use notify::ports::NotificationSink;
pub use pipeline::ports::{
    ErrorInterceptor, ErrorOutcome, Replay, RequestInterceptor, ResponseInterceptor,
};
pub use realtime::ports::{RealtimeError, SocketConnector, SocketFrame, SocketStream};
