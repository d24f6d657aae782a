//! Rentline backend API client
//!
//! The request executor and everything that runs around it.
//!
//! # Architecture
//!
//! - [`ApiClient`] owns the transport, the interceptor chains and the health
//!   gate
//! - [`HealthMonitor`] short-circuits requests while the backend is down
//! - [`AuthRefreshCoordinator`] recovers from 401s with one shared refresh
//! - [`ApiRetryPolicy`] retries transient failures of idempotent requests
//! - `errors` classifies raw responses into [`ApiError`](rentline_domain::ApiError)

pub mod auth;
pub mod client;
pub mod errors;
pub mod health;
pub mod interceptors;
pub mod retry;

pub use auth::{AuthRefreshCoordinator, HttpTokenRefresher};
pub use client::{ApiClient, ApiClientBuilder};
pub use health::HealthMonitor;
pub use interceptors::{
    AuthHeaderInterceptor, CommonHeadersInterceptor, LoggingInterceptor, NotifyInterceptor,
};
pub use retry::{retry_config_for, ApiRetryPolicy};
