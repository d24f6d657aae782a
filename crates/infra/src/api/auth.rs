//! Token refresh and replay
//!
//! [`AuthRefreshCoordinator`] is the error interceptor that recovers from a
//! 401 by exchanging the refresh token for a new pair and replaying the
//! request. At most one refresh runs at a time: the first failing request
//! performs it, every other request that fails meanwhile parks a oneshot
//! waiter and is resolved (or rejected) with the same outcome.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rentline_core::{
    ErrorInterceptor, ErrorOutcome, LoginRedirect, Replay, StorageError, TokenRefresher,
    TokenStore, Transport, TransportBody, TransportRequest,
};
use rentline_domain::constants::{
    CONTENT_TYPE_JSON, HEADER_ACCEPT, HEADER_AUTHORIZATION, HEADER_CONTENT_TYPE,
};
use rentline_domain::{ApiError, Method, RequestDescriptor, TokenPair};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::errors::{classify_status, from_transport};
use crate::observability::ClientMetrics;

type Waiter = oneshot::Sender<Result<String, ApiError>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<Result<String, ApiError>>),
}

struct Shared {
    tokens: Arc<dyn TokenStore>,
    redirect: Option<Arc<dyn LoginRedirect>>,
    redirect_delay: Duration,
    redirect_pending: AtomicBool,
}

/// Single-flight refresh-and-replay on `Unauthorized`.
pub struct AuthRefreshCoordinator {
    shared: Arc<Shared>,
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<RefreshState>,
    metrics: Arc<ClientMetrics>,
}

impl AuthRefreshCoordinator {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        redirect: Option<Arc<dyn LoginRedirect>>,
        redirect_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                tokens,
                redirect,
                redirect_delay,
                redirect_pending: AtomicBool::new(false),
            }),
            refresher,
            state: Mutex::new(RefreshState::Idle),
            metrics: Arc::new(ClientMetrics::new()),
        }
    }

    /// Record refresh outcomes into shared client metrics.
    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Access token to replay with after `failed` was rejected, shared by
    /// every caller of one refresh.
    async fn refreshed_token(&self, failed: Option<&str>) -> Result<String, ApiError> {
        let role = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: Vec::new() };
                    Role::Leader
                }
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Role::Waiter(rx)
                }
            }
        };

        match role {
            Role::Waiter(rx) => {
                debug!("Waiting for in-flight token refresh");
                rx.await.unwrap_or_else(|_| {
                    Err(ApiError::unauthorized("Token refresh was abandoned"))
                })
            }
            Role::Leader => {
                let guard = RefreshGuard { state: &self.state, armed: true };

                // A refresh that completed after the request was sent already
                // stored a new token; it was written before the state went
                // back to `Idle`, so this read sees it.
                if let Some(current) = self.rotated_since(failed).await {
                    debug!("Token rotated meanwhile, reusing it");
                    let result = Ok(current);
                    guard.finish(&result);
                    return result;
                }

                let result = self.perform_refresh().await;
                self.metrics.record_refresh(result.is_ok());

                if let Err(err) = &result {
                    warn!(error = %err, "Token refresh failed");
                    self.shared.clear_tokens().await;
                }
                guard.finish(&result);
                if result.is_err() {
                    self.shared.schedule_redirect();
                }
                result
            }
        }
    }

    async fn rotated_since(&self, failed: Option<&str>) -> Option<String> {
        let failed = failed?;
        match self.shared.tokens.access_token().await {
            Ok(Some(current)) if current != failed => Some(current),
            _ => None,
        }
    }

    async fn perform_refresh(&self) -> Result<String, ApiError> {
        let refresh = self
            .shared
            .tokens
            .refresh_token()
            .await
            .map_err(storage_error)?
            .ok_or_else(|| ApiError::unauthorized("No refresh token available"))?;

        info!("Refreshing access token");
        let tokens = self.refresher.refresh(&refresh).await?;
        self.shared.tokens.store(&tokens).await.map_err(storage_error)?;
        info!("Access token refreshed");

        Ok(tokens.access)
    }

    async fn replay_with(
        &self,
        token: &str,
        request: &RequestDescriptor,
        replay: &dyn Replay,
    ) -> ErrorOutcome {
        let mut replayed = request.clone();
        replayed.retried = true;
        replayed.set_header(HEADER_AUTHORIZATION, format!("Bearer {token}"));

        match replay.replay(replayed).await {
            Ok(response) => ErrorOutcome::Recovered(response),
            Err(err) if err.is_unauthorized() => {
                warn!(path = %request.path, "Replay rejected after refresh");
                self.shared.hard_failure().await;
                ErrorOutcome::Propagate(err)
            }
            Err(err) => ErrorOutcome::Propagate(err),
        }
    }
}

#[async_trait]
impl ErrorInterceptor for AuthRefreshCoordinator {
    async fn on_error(
        &self,
        error: ApiError,
        request: &RequestDescriptor,
        replay: &dyn Replay,
    ) -> ErrorOutcome {
        if !error.is_unauthorized() || request.skip_auth {
            return ErrorOutcome::Propagate(error);
        }

        if request.retried {
            warn!(path = %request.path, "Unauthorized after replay");
            self.shared.hard_failure().await;
            return ErrorOutcome::Propagate(error);
        }

        match self.refreshed_token(request.bearer_token()).await {
            Ok(token) => self.replay_with(&token, request, replay).await,
            Err(err) => ErrorOutcome::Propagate(err),
        }
    }
}

/// Returns the coordinator to `Idle` and settles every waiter.
///
/// Dropped without [`RefreshGuard::finish`] (the leading future was
/// cancelled) it rejects the waiters instead of leaving them hanging.
struct RefreshGuard<'a> {
    state: &'a Mutex<RefreshState>,
    armed: bool,
}

impl RefreshGuard<'_> {
    fn take_waiters(&self) -> Vec<Waiter> {
        match mem::replace(&mut *self.state.lock(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }

    fn finish(mut self, result: &Result<String, ApiError>) {
        self.armed = false;
        let waiters = self.take_waiters();
        debug!(waiters = waiters.len(), ok = result.is_ok(), "Settling refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for waiter in self.take_waiters() {
            let _ = waiter.send(Err(ApiError::unauthorized("Token refresh was cancelled")));
        }
    }
}

impl Shared {
    async fn clear_tokens(&self) {
        if let Err(err) = self.tokens.clear().await {
            warn!(error = %err, "Failed to clear stored tokens");
        }
    }

    /// Clear tokens and send the user to sign in.
    async fn hard_failure(self: &Arc<Self>) {
        self.clear_tokens().await;
        self.schedule_redirect();
    }

    /// Redirect once after the configured delay, however many requests failed.
    fn schedule_redirect(self: &Arc<Self>) {
        let Some(redirect) = self.redirect.clone() else {
            return;
        };
        if self.redirect_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(shared.redirect_delay).await;
            info!("Redirecting to login");
            redirect.redirect_to_login();
            shared.redirect_pending.store(false, Ordering::SeqCst);
        });
    }
}

fn storage_error(err: StorageError) -> ApiError {
    ApiError::unauthorized(format!("Token storage unavailable: {err}"))
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// [`TokenRefresher`] that calls the backend's refresh endpoint.
///
/// Goes straight to the transport: no interceptors, no health gate, no
/// retries, so a 401 here can never recurse into another refresh.
pub struct HttpTokenRefresher {
    transport: Arc<dyn Transport>,
    url: String,
    timeout: Duration,
}

impl HttpTokenRefresher {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: &str,
        refresh_path: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            url: format!("{}{}", base_url.trim_end_matches('/'), refresh_path),
            timeout,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let mut request = TransportRequest::new(Method::Post, self.url.clone());
        request.headers.insert(HEADER_ACCEPT.to_string(), CONTENT_TYPE_JSON.to_string());
        request.headers.insert(HEADER_CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string());
        let payload = json!({ "refresh": refresh_token });
        request.body = TransportBody::Bytes(payload.to_string().into_bytes());
        request.timeout = Some(self.timeout);

        let response = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| ApiError::Timeout(self.timeout))?
            .map_err(from_transport)?;

        if !response.is_success() {
            return Err(classify_status(&response));
        }

        let body: RefreshResponse = serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::Decode(format!("Invalid refresh response: {e}")))?;

        Ok(TokenPair {
            access: body.access,
            refresh: body.refresh.or_else(|| Some(refresh_token.to_string())),
        })
    }
}
