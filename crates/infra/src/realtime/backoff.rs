//! Reconnect backoff

use std::time::Duration;

use rentline_common::resilience::BackoffStrategy;
use rentline_domain::RealtimeConfig;

/// When and how long to wait before reopening a dropped socket.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    backoff: BackoffStrategy,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, factor: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Exponential {
                initial_delay: base_delay,
                base: factor,
                max_delay,
            },
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(
            config.max_reconnect_attempts,
            config.reconnect_base_delay(),
            config.reconnect_factor,
            config.reconnect_max_delay(),
        )
    }

    /// Delay before reconnect attempt `attempt` (1-based):
    /// `base_delay * factor^(attempt - 1)`, capped at the max delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.calculate_delay(attempt.saturating_sub(1))
    }

    /// Whether `attempts` reconnects already used up the budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}
