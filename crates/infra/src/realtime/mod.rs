//! Realtime websocket channels
//!
//! [`RealtimeChannel`] runs the connection lifecycle on top of the
//! [`SocketConnector`](rentline_core::SocketConnector) port;
//! [`TungsteniteConnector`] is the production adapter.

pub mod backoff;
pub mod channel;
pub mod dispatch;
pub mod websocket;

pub use backoff::ReconnectPolicy;
pub use channel::{RealtimeChannel, RealtimeEvent};
pub use dispatch::{MessageHandler, SubscriberRegistry, Subscription};
pub use websocket::TungsteniteConnector;
