//! # Rentline Infrastructure
//!
//! Client services and adapters for the core ports.
//!
//! This crate contains:
//! - The [`ApiClient`] request executor with its interceptor pipeline,
//!   health gate, retry policy and auth-refresh coordinator
//! - The reqwest HTTP transport
//! - Realtime websocket channels (tokio-tungstenite)
//! - Token stores, configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `rentline-core`
//! - Depends on `rentline-domain`, `rentline-core` and `rentline-common`
//! - Contains all "impure" code (network, filesystem)

pub mod api;
pub mod config;
pub mod http;
pub mod observability;
pub mod realtime;
pub mod storage;

// Re-export commonly used items
pub use api::{
    ApiClient, ApiClientBuilder, AuthRefreshCoordinator, HealthMonitor, HttpTokenRefresher,
};
pub use http::{HttpClient, HttpClientBuilder};
pub use observability::{init_tracing, ClientMetrics, MetricsSnapshot};
pub use realtime::{RealtimeChannel, RealtimeEvent, Subscription, TungsteniteConnector};
pub use storage::{FileTokenStore, MemoryTokenStore};
