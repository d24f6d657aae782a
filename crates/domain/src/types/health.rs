//! Backend health snapshot

use std::time::{Duration, Instant};

/// Result of the most recent health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    pub checked_at: Instant,
    pub is_healthy: bool,
}

impl HealthState {
    pub fn new(checked_at: Instant, is_healthy: bool) -> Self {
        Self { checked_at, is_healthy }
    }

    /// Whether the snapshot is still within its time-to-live at `now`.
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.checked_at) < ttl
    }
}
