//! Request-level metrics for the API client
//!
//! ## Design
//! - **No locking needed** - simple atomic counters
//! - **Relaxed ordering** - every counter is independent
//! - **Microsecond storage** for latency, reporting helpers convert to ms

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by one [`ApiClient`](crate::api::ApiClient).
#[derive(Debug, Default)]
pub struct ClientMetrics {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
    health_rejections: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    total_latency_micros: AtomicU64,
}

/// Point-in-time copy of [`ClientMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub health_rejections: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub total_latency_micros: u64,
}

impl MetricsSnapshot {
    /// Mean latency of completed requests in milliseconds.
    pub fn avg_latency_ms(&self) -> Option<f64> {
        let completed = self.successes + self.failures;
        if completed == 0 {
            return None;
        }
        Some(self.total_latency_micros as f64 / completed as f64 / 1000.0)
    }
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call to `ApiClient::send`.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros.fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros.fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_health_rejection(&self) {
        self.health_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self, succeeded: bool) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            health_rejections: self.health_rejections.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            total_latency_micros: self.total_latency_micros.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let metrics = ClientMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_success(Duration::from_millis(10));
        metrics.record_failure(Duration::from_millis(30));
        metrics.record_timeout();
        metrics.record_refresh(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.refreshes, 1);
        assert_eq!(snapshot.refresh_failures, 1);
        assert_eq!(snapshot.avg_latency_ms(), Some(20.0));
    }

    #[test]
    fn test_empty_average() {
        assert_eq!(ClientMetrics::new().snapshot().avg_latency_ms(), None);
    }
}
