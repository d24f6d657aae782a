//! Interceptor contracts
//!
//! The executor keeps three ordered lists of interceptors. Each list is
//! applied strictly in registration order, one interceptor awaited after the
//! other.

use async_trait::async_trait;
use rentline_domain::{ApiError, ApiResponse, RequestDescriptor};

/// Transforms an outgoing request descriptor.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor, ApiError>;
}

/// Transforms a successful response.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_response(
        &self,
        request: &RequestDescriptor,
        response: ApiResponse,
    ) -> Result<ApiResponse, ApiError>;
}

/// What an error interceptor decided.
#[derive(Debug)]
pub enum ErrorOutcome {
    /// The failure was handled; the chain stops and the caller gets this.
    Recovered(ApiResponse),
    /// Hand the (possibly replaced) error to the next interceptor.
    Propagate(ApiError),
}

/// Re-sends a request through the executor without running the error chain.
#[async_trait]
pub trait Replay: Send + Sync {
    async fn replay(&self, request: RequestDescriptor) -> Result<ApiResponse, ApiError>;
}

/// Observes or recovers from failures.
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    async fn on_error(
        &self,
        error: ApiError,
        request: &RequestDescriptor,
        replay: &dyn Replay,
    ) -> ErrorOutcome;
}
