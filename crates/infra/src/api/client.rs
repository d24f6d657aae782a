//! Request executor
//!
//! Every API call flows through [`ApiClient::send`]:
//!
//! 1. health gate (fails fast with `BackendUnhealthy`, no network call)
//! 2. request interceptors, in registration order
//! 3. lowering into a [`TransportRequest`] (URL, query, encoded body)
//! 4. transport call bounded by the request timeout, wrapped in the retry
//!    policy when the request allows it
//! 5. status classification and body parsing
//! 6. response interceptors, in registration order
//! 7. on any failure, error interceptors in registration order; one of them
//!    may recover the call (token refresh and replay)

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rentline_common::resilience::RetryExecutor;
use rentline_common::time::{Clock, SystemClock};
use rentline_core::{
    ErrorInterceptor, ErrorOutcome, LoginRedirect, NotificationSink, Replay, RequestInterceptor,
    ResponseInterceptor, TokenRefresher, TokenStore, Transport, TransportBody, TransportError,
    TransportRequest,
};
use rentline_domain::constants::{CONTENT_TYPE_JSON, HEADER_CONTENT_TYPE};
use rentline_domain::{
    ApiError, ApiResponse, Config, FormPart, RequestBody, RequestDescriptor, ResponseType, Result,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::auth::{AuthRefreshCoordinator, HttpTokenRefresher};
use super::errors::{classify_status, from_transport, parse_body};
use super::health::HealthMonitor;
use super::interceptors::{
    AuthHeaderInterceptor, CommonHeadersInterceptor, LoggingInterceptor, NotifyInterceptor,
};
use super::retry::{retry_config_for, ApiRetryPolicy};
use crate::http::HttpClient;
use crate::observability::{ClientMetrics, MetricsSnapshot};
use crate::storage::{FileTokenStore, MemoryTokenStore};

struct ClientInner {
    config: Config,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    health: Option<HealthMonitor>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    error_interceptors: Vec<Arc<dyn ErrorInterceptor>>,
    metrics: Arc<ClientMetrics>,
}

/// HTTP client for the Rentline backend.
///
/// Cheap to clone; clones share the interceptor chains, health gate and
/// metrics.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Create a builder for fluent configuration
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Execute a GET request
    ///
    /// Retried on transient failures unless the client's retry budget is 0.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] if the request fails or the body
    /// does not deserialize into `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(RequestDescriptor::get(path)).await
    }

    /// Execute a POST request with a JSON body
    ///
    /// # Arguments
    ///
    /// * `path` - Endpoint relative to the base URL (e.g. "/properties/")
    /// * `body` - Serialized as JSON
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be encoded, the request fails or the
    /// response cannot be deserialized
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(RequestDescriptor::post(path).json(encode(body)?)).await
    }

    /// Execute a PUT request with a JSON body
    ///
    /// Not retried unless the descriptor opts in; use [`ApiClient::request`]
    /// with [`RequestDescriptor::with_retry`] for that.
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be encoded, the request fails or the
    /// response cannot be deserialized
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(RequestDescriptor::put(path).json(encode(body)?)).await
    }

    /// Execute a PATCH request with a JSON body
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::put`].
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(RequestDescriptor::patch(path).json(encode(body)?)).await
    }

    /// Execute a DELETE request
    ///
    /// An empty 204 body deserializes into `()` or `Option<T>`.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] if the request fails or the body
    /// does not deserialize into `T`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(RequestDescriptor::delete(path)).await
    }

    /// POST a multipart form (e.g. property photos).
    ///
    /// Any `content-type` header is dropped so the transport can set the
    /// multipart boundary.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] if the upload fails or the body
    /// does not deserialize into `T`.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        parts: Vec<FormPart>,
    ) -> Result<T> {
        self.request(RequestDescriptor::post(path).multipart(parts)).await
    }

    /// Send a custom descriptor and deserialize the response body.
    ///
    /// # Errors
    ///
    /// Returns whatever error survives the error interceptor chain, or
    /// `ApiError::Decode` if the body does not deserialize into `T`.
    pub async fn request<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        self.send(request).await?.json()
    }

    /// Send a custom descriptor and return the parsed response.
    ///
    /// # Errors
    ///
    /// Returns whatever error survives the error interceptor chain.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let metrics = &self.inner.metrics;
        metrics.record_request();
        let started = Instant::now();

        let result = self.inner.execute(request).await;

        match &result {
            Ok(response) => {
                metrics.record_success(started.elapsed());
                debug!(status = response.status, "Request completed");
            }
            Err(err) => {
                metrics.record_failure(started.elapsed());
                debug!(code = %err.code(), "Request failed");
            }
        }
        result
    }

    /// Token slot shared with the auth interceptors.
    pub fn tokens(&self) -> Arc<dyn TokenStore> {
        Arc::clone(&self.inner.tokens)
    }

    /// The health gate, if enabled.
    pub fn health(&self) -> Option<&HealthMonitor> {
        self.inner.health.as_ref()
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Point-in-time copy of the request counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Start periodic health probing. No-op when the gate is disabled.
    pub fn start_health_monitoring(&self) {
        if let Some(health) = &self.inner.health {
            health.start_monitoring();
        }
    }

    /// Stop background work owned by the client.
    pub fn shutdown(&self) {
        if let Some(health) = &self.inner.health {
            health.stop_monitoring();
        }
        debug!("API client shut down");
    }
}

impl ClientInner {
    async fn execute(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let (request, result) = self.run(request).await;
        match result {
            Ok(response) => Ok(response),
            Err(error) => self.recover(error, &request).await,
        }
    }

    /// Everything up to the error chain. Returns the descriptor as the last
    /// interceptor left it, so error interceptors see the sent headers.
    async fn run(&self, request: RequestDescriptor) -> (RequestDescriptor, Result<ApiResponse>) {
        if let Err(err) = self.check_health().await {
            return (request, Err(err));
        }

        let mut current = request;
        for interceptor in &self.request_interceptors {
            let previous = current.clone();
            current = match interceptor.on_request(current).await {
                Ok(next) => next,
                Err(err) => return (previous, Err(err)),
            };
        }

        let result = self.dispatch(&current).await;
        (current, result)
    }

    async fn check_health(&self) -> Result<()> {
        let Some(health) = &self.health else {
            return Ok(());
        };
        if health.is_healthy().await {
            return Ok(());
        }
        self.metrics.record_health_rejection();
        warn!("Backend unhealthy, rejecting request");
        Err(ApiError::BackendUnhealthy)
    }

    /// Transport call (retried when allowed) followed by the response chain.
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<ApiResponse> {
        let lowered = self.lower(request)?;

        let response = match retry_config_for(request, &self.config.retry) {
            Some(retry) => {
                let attempts = AtomicU32::new(0);
                RetryExecutor::new(retry, ApiRetryPolicy)
                    .execute(|| {
                        if attempts.fetch_add(1, Ordering::Relaxed) > 0 {
                            self.metrics.record_retry();
                        }
                        self.attempt(lowered.clone(), request.response_type)
                    })
                    .await
                    .map_err(|err| {
                        let message = err.to_string();
                        err.into_last_error().unwrap_or(ApiError::Config(message))
                    })?
            }
            None => self.attempt(lowered, request.response_type).await?,
        };

        let mut response = response;
        for interceptor in &self.response_interceptors {
            response = interceptor.on_response(request, response).await?;
        }
        Ok(response)
    }

    async fn attempt(
        &self,
        request: TransportRequest,
        response_type: Option<ResponseType>,
    ) -> Result<ApiResponse> {
        let timeout = request.timeout.unwrap_or_else(|| self.config.api.timeout());

        let response = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                if matches!(err, TransportError::Timeout(_)) {
                    self.metrics.record_timeout();
                }
                return Err(from_transport(err));
            }
            Err(_) => {
                self.metrics.record_timeout();
                return Err(ApiError::Timeout(timeout));
            }
        };

        if !response.is_success() {
            return Err(classify_status(&response));
        }

        let body = parse_body(&response, response_type)?;
        Ok(ApiResponse { status: response.status, headers: response.headers, body })
    }

    async fn recover(&self, error: ApiError, request: &RequestDescriptor) -> Result<ApiResponse> {
        let mut error = error;
        for interceptor in &self.error_interceptors {
            match interceptor.on_error(error, request, self).await {
                ErrorOutcome::Recovered(response) => return Ok(response),
                ErrorOutcome::Propagate(next) => error = next,
            }
        }
        Err(error)
    }

    /// Resolve the URL and encode the body.
    fn lower(&self, request: &RequestDescriptor) -> Result<TransportRequest> {
        let url = self.resolve_url(request)?;
        let mut headers = request.headers.clone();

        let body = match &request.body {
            RequestBody::Empty => TransportBody::Empty,
            RequestBody::Json(value) => {
                headers.insert(HEADER_CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string());
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| ApiError::Decode(format!("Failed to encode request body: {e}")))?;
                TransportBody::Bytes(bytes)
            }
            RequestBody::Bytes { data, content_type } => {
                if let Some(content_type) = content_type {
                    headers.insert(HEADER_CONTENT_TYPE.to_string(), content_type.clone());
                }
                TransportBody::Bytes(data.clone())
            }
            RequestBody::Multipart(parts) => {
                // The transport supplies the boundary.
                headers.remove(HEADER_CONTENT_TYPE);
                TransportBody::Multipart(parts.clone())
            }
        };

        Ok(TransportRequest {
            method: request.method,
            url,
            headers,
            body,
            timeout: Some(request.timeout.unwrap_or_else(|| self.config.api.timeout())),
        })
    }

    fn resolve_url(&self, request: &RequestDescriptor) -> Result<String> {
        let raw = if request.path.starts_with("http://") || request.path.starts_with("https://") {
            request.path.clone()
        } else {
            let base = self.config.api.base_url.trim_end_matches('/');
            let path = request.path.trim_start_matches('/');
            format!("{base}/{path}")
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| ApiError::Config(format!("Invalid request URL {raw}: {e}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url.into())
    }
}

#[async_trait]
impl Replay for ClientInner {
    async fn replay(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        debug!(method = %request.method, path = %request.path, "Replaying request");
        self.dispatch(&request).await
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::Decode(format!("Failed to encode request body: {e}")))
}

/// Builder for [`ApiClient`]
///
/// Anything not supplied gets a production default: a reqwest transport,
/// a file or memory token store per configuration, and a refresher calling
/// the configured refresh endpoint.
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<Config>,
    transport: Option<Arc<dyn Transport>>,
    tokens: Option<Arc<dyn TokenStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    login_redirect: Option<Arc<dyn LoginRedirect>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<ClientMetrics>>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    error_interceptors: Vec<Arc<dyn ErrorInterceptor>>,
}

impl ApiClientBuilder {
    /// Client configuration; defaults apply when not set.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the reqwest transport (tests use a mock here).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Token slot; overrides `auth.token_file`.
    pub fn token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Exchanges refresh tokens; defaults to [`HttpTokenRefresher`].
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Called once, after the configured delay, on a hard auth failure.
    pub fn login_redirect(mut self, redirect: Arc<dyn LoginRedirect>) -> Self {
        self.login_redirect = Some(redirect);
        self
    }

    /// Sink for the one notice shown per surfaced failure.
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Clock driving the health cache TTL.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share counters with other clients.
    pub fn metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs after the built-in request interceptors.
    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    /// Runs on every successful response, in registration order.
    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    /// Runs after token refresh, before logging and notification.
    pub fn error_interceptor(mut self, interceptor: Arc<dyn ErrorInterceptor>) -> Self {
        self.error_interceptors.push(interceptor);
        self
    }

    /// Build the API client
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if the configuration fails
    /// [`Config::validate`], the base URL is invalid or the default HTTP
    /// transport cannot be created
    pub fn build(self) -> Result<ApiClient> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Url::parse(&config.api.base_url).map_err(|e| {
            ApiError::Config(format!("Invalid API base URL {}: {e}", config.api.base_url))
        })?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpClient::builder().timeout(config.api.timeout()).build()?),
        };

        let tokens: Arc<dyn TokenStore> = match (self.tokens, &config.auth.token_file) {
            (Some(tokens), _) => tokens,
            (None, Some(path)) => Arc::new(FileTokenStore::new(path.clone())),
            (None, None) => Arc::new(MemoryTokenStore::new()),
        };

        let refresher = self.refresher.unwrap_or_else(|| {
            Arc::new(HttpTokenRefresher::new(
                Arc::clone(&transport),
                &config.api.base_url,
                &config.auth.refresh_path,
                config.api.timeout(),
            ))
        });

        let metrics = self.metrics.unwrap_or_default();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let health = config.health.enabled.then(|| {
            HealthMonitor::with_clock(
                Arc::clone(&transport),
                &config.api.base_url,
                config.health.clone(),
                clock,
            )
        });

        let logging = Arc::new(LoggingInterceptor);

        let mut request_interceptors: Vec<Arc<dyn RequestInterceptor>> = vec![
            Arc::new(CommonHeadersInterceptor::new(config.api.default_headers.clone())),
            Arc::new(AuthHeaderInterceptor::new(Arc::clone(&tokens))),
            logging.clone(),
        ];
        request_interceptors.extend(self.request_interceptors);

        let mut response_interceptors: Vec<Arc<dyn ResponseInterceptor>> = vec![logging.clone()];
        response_interceptors.extend(self.response_interceptors);

        let coordinator = AuthRefreshCoordinator::new(
            Arc::clone(&tokens),
            refresher,
            self.login_redirect,
            config.auth.login_redirect_delay(),
        )
        .with_metrics(Arc::clone(&metrics));

        let mut error_interceptors: Vec<Arc<dyn ErrorInterceptor>> = vec![Arc::new(coordinator)];
        error_interceptors.extend(self.error_interceptors);
        error_interceptors.push(logging);
        if let Some(notifier) = self.notifier {
            error_interceptors.push(Arc::new(NotifyInterceptor::new(notifier)));
        }

        debug!(
            base_url = %config.api.base_url,
            health_gate = config.health.enabled,
            "API client configured"
        );

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                config,
                transport,
                tokens,
                health,
                request_interceptors,
                response_interceptors,
                error_interceptors,
                metrics,
            }),
        })
    }
}
