//! Backend health gate
//!
//! [`HealthMonitor`] caches the result of the last check for one check
//! interval. Concurrent callers that find the cache stale share a single
//! request: the first one takes the check gate, the rest queue behind it and
//! reuse its result. A check never fails; every error downgrades the cached
//! health to `false`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rentline_common::time::{Clock, SystemClock};
use rentline_core::{Transport, TransportRequest};
use rentline_domain::constants::{CONTENT_TYPE_JSON, HEADER_ACCEPT, HEALTHY_STATUS};
use rentline_domain::{HealthConfig, HealthState, Method};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct MonitorTask {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

struct HealthInner {
    transport: Arc<dyn Transport>,
    url: String,
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<Option<HealthState>>,
    /// Serialises checks.
    check_gate: tokio::sync::Mutex<()>,
    /// Bumped after every completed check.
    checks_completed: AtomicU64,
    task: Mutex<Option<MonitorTask>>,
}

impl Drop for HealthInner {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

/// Cached, single-flight backend health check.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<HealthInner>,
}

impl HealthMonitor {
    /// Create a monitor probing `{base_url}{config.path}`.
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, config: HealthConfig) -> Self {
        Self::with_clock(transport, base_url, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: Arc<dyn Transport>,
        base_url: &str,
        config: HealthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let url = format!("{}{}", base_url.trim_end_matches('/'), config.path);
        Self {
            inner: Arc::new(HealthInner {
                transport,
                url,
                config,
                clock,
                state: Mutex::new(None),
                check_gate: tokio::sync::Mutex::new(()),
                checks_completed: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// Whether the backend is healthy, probing only when the cache is stale.
    pub async fn is_healthy(&self) -> bool {
        if let Some(healthy) = self.inner.fresh() {
            return healthy;
        }

        let observed = self.inner.checks_completed.load(Ordering::SeqCst);
        let _gate = self.inner.check_gate.lock().await;

        // A check completed while we were queued: share its result.
        if self.inner.checks_completed.load(Ordering::SeqCst) != observed {
            if let Some(state) = *self.inner.state.lock() {
                return state.is_healthy;
            }
        }

        if let Some(healthy) = self.inner.fresh() {
            return healthy;
        }

        self.inner.run_check().await
    }

    /// Drop the cached state and check right away.
    pub async fn force_check(&self) -> bool {
        self.invalidate();
        let _gate = self.inner.check_gate.lock().await;
        self.inner.run_check().await
    }

    /// Drop the cached state without probing.
    pub fn invalidate(&self) {
        *self.inner.state.lock() = None;
    }

    /// The cached check result, if any.
    pub fn last_state(&self) -> Option<HealthState> {
        *self.inner.state.lock()
    }

    /// Re-check in the background every check interval until stopped.
    pub fn start_monitoring(&self) {
        let mut task = self.inner.task.lock();
        if task.is_some() {
            debug!("Health monitoring already running");
            return;
        }

        let interval = self.inner.config.check_interval();
        if interval.is_zero() {
            warn!("Health check interval is zero, monitoring not started");
            return;
        }

        let cancel = CancellationToken::new();
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(monitor_loop(weak, interval, cancel.clone()));

        *task = Some(MonitorTask { cancel, _handle: handle });
        info!(interval_ms = interval.as_millis() as u64, "Health monitoring started");
    }

    pub fn stop_monitoring(&self) {
        if let Some(task) = self.inner.task.lock().take() {
            task.cancel.cancel();
            info!("Health monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.task.lock().is_some()
    }
}

async fn monitor_loop(
    inner: Weak<HealthInner>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Health monitor loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let _gate = inner.check_gate.lock().await;
                inner.run_check().await;
            }
        }
    }
}

impl HealthInner {
    fn fresh(&self) -> Option<bool> {
        let now = self.clock.now();
        self.state
            .lock()
            .filter(|state| state.is_fresh(now, self.config.check_interval()))
            .map(|state| state.is_healthy)
    }

    /// Ping the backend and store the result. Caller holds the check gate.
    async fn run_check(&self) -> bool {
        let healthy = self.ping().await;
        let previous = self.state.lock().replace(HealthState::new(self.clock.now(), healthy));
        self.checks_completed.fetch_add(1, Ordering::SeqCst);

        match previous {
            Some(prev) if prev.is_healthy != healthy => {
                if healthy {
                    info!(url = %self.url, "Backend recovered");
                } else {
                    warn!(url = %self.url, "Backend became unhealthy");
                }
            }
            _ => debug!(url = %self.url, healthy, "Health check completed"),
        }

        healthy
    }

    async fn ping(&self) -> bool {
        let timeout = self.config.check_timeout();
        let mut request = TransportRequest::new(Method::Get, self.url.clone());
        request.headers.insert(HEADER_ACCEPT.to_string(), CONTENT_TYPE_JSON.to_string());
        request.timeout = Some(timeout);

        let response = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(error = %err, "Health check failed");
                return false;
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Health check timed out");
                return false;
            }
        };

        if !response.is_success() {
            debug!(status = response.status, "Health check returned non-success status");
            return false;
        }

        let is_json = response
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(CONTENT_TYPE_JSON));
        if !is_json {
            debug!("Health check returned a non-JSON body");
            return false;
        }

        serde_json::from_slice::<Value>(&response.body)
            .ok()
            .and_then(|payload| payload.get("status").and_then(Value::as_str).map(str::to_string))
            .is_some_and(|status| status.eq_ignore_ascii_case(HEALTHY_STATUS))
    }
}
