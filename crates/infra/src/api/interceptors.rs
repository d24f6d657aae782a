//! Built-in interceptors
//!
//! The client installs these around the user-registered interceptors:
//! requests pass common headers, then the auth header, then logging; errors
//! reach logging and notification last so they see the final outcome.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rentline_core::{
    ErrorInterceptor, ErrorOutcome, NotificationSink, Replay, RequestInterceptor,
    ResponseInterceptor, TokenStore,
};
use rentline_domain::constants::{
    CONTENT_TYPE_JSON, HEADER_ACCEPT, HEADER_AUTHORIZATION, HEADER_REQUEST_ID,
};
use rentline_domain::{ApiError, ApiResponse, RequestDescriptor};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Adds `accept`, the configured default headers and a request id.
///
/// Headers already present on the descriptor are left alone.
#[derive(Debug, Clone, Default)]
pub struct CommonHeadersInterceptor {
    defaults: BTreeMap<String, String>,
}

impl CommonHeadersInterceptor {
    pub fn new(defaults: BTreeMap<String, String>) -> Self {
        Self { defaults }
    }
}

#[async_trait]
impl RequestInterceptor for CommonHeadersInterceptor {
    async fn on_request(
        &self,
        mut request: RequestDescriptor,
    ) -> Result<RequestDescriptor, ApiError> {
        if request.header_value(HEADER_ACCEPT).is_none() {
            request.set_header(HEADER_ACCEPT, CONTENT_TYPE_JSON);
        }
        for (name, value) in &self.defaults {
            if request.header_value(name).is_none() {
                request.set_header(name, value.clone());
            }
        }
        if request.header_value(HEADER_REQUEST_ID).is_none() {
            request.set_header(HEADER_REQUEST_ID, Uuid::new_v4().to_string());
        }
        Ok(request)
    }
}

/// Attaches `Authorization: Bearer <access>` from the token store.
pub struct AuthHeaderInterceptor {
    tokens: Arc<dyn TokenStore>,
}

impl AuthHeaderInterceptor {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl RequestInterceptor for AuthHeaderInterceptor {
    async fn on_request(
        &self,
        mut request: RequestDescriptor,
    ) -> Result<RequestDescriptor, ApiError> {
        if request.skip_auth {
            request.remove_header(HEADER_AUTHORIZATION);
            return Ok(request);
        }

        match self.tokens.access_token().await {
            Ok(Some(token)) => request.set_header(HEADER_AUTHORIZATION, format!("Bearer {token}")),
            Ok(None) => debug!(path = %request.path, "No access token, sending unauthenticated"),
            // Unreadable storage is treated as signed out.
            Err(err) => warn!(error = %err, "Failed to read access token"),
        }
        Ok(request)
    }
}

/// Emits one tracing event per request, response and failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor, ApiError> {
        debug!(
            method = %request.method,
            path = %request.path,
            request_id = request.header_value(HEADER_REQUEST_ID).unwrap_or("-"),
            retried = request.retried,
            "API request"
        );
        Ok(request)
    }
}

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    async fn on_response(
        &self,
        request: &RequestDescriptor,
        response: ApiResponse,
    ) -> Result<ApiResponse, ApiError> {
        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status,
            "API response"
        );
        Ok(response)
    }
}

#[async_trait]
impl ErrorInterceptor for LoggingInterceptor {
    async fn on_error(
        &self,
        error: ApiError,
        request: &RequestDescriptor,
        _replay: &dyn Replay,
    ) -> ErrorOutcome {
        let code = error.code();
        if error.status() >= 500 || error.status() == 0 {
            warn!(
                method = %request.method,
                path = %request.path,
                %code,
                error = %error,
                "API request failed"
            );
        } else {
            info!(
                method = %request.method,
                path = %request.path,
                %code,
                error = %error,
                "API request rejected"
            );
        }
        ErrorOutcome::Propagate(error)
    }
}

/// Shows one user notice per surfaced failure.
pub struct NotifyInterceptor {
    sink: Arc<dyn NotificationSink>,
}

impl NotifyInterceptor {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ErrorInterceptor for NotifyInterceptor {
    async fn on_error(
        &self,
        error: ApiError,
        _request: &RequestDescriptor,
        _replay: &dyn Replay,
    ) -> ErrorOutcome {
        self.sink.notify(error.notice());
        ErrorOutcome::Propagate(error)
    }
}
