//! Retry policy for API requests
//!
//! Adapts the generic executor in `rentline_common::resilience` to
//! [`ApiError`]: transient failures are retried with the configured backoff
//! curve, everything else stops on the first attempt.

use rentline_common::resilience::{RetryConfig, RetryDecision, RetryPolicy};
use rentline_domain::{ApiError, BackoffKind, RequestDescriptor, RetrySettings};
use tracing::debug;

/// Retries network failures, timeouts, 5xx and 429.
///
/// A `Retry-After` hint on a 429 replaces the computed backoff delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiRetryPolicy;

impl RetryPolicy<ApiError> for ApiRetryPolicy {
    fn should_retry(&self, error: &ApiError, attempt: u32) -> RetryDecision {
        if !error.is_transient() {
            return RetryDecision::Stop;
        }

        match error.retry_after() {
            Some(delay) => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Honouring Retry-After");
                RetryDecision::RetryAfter(delay)
            }
            None => RetryDecision::Retry,
        }
    }
}

/// Retry configuration for one request, or `None` when it must not be retried.
///
/// The descriptor's own budget and delay win over the configured defaults.
/// A retry budget of zero disables retries as well.
pub fn retry_config_for(
    request: &RequestDescriptor,
    settings: &RetrySettings,
) -> Option<RetryConfig> {
    if !request.retry_enabled() {
        return None;
    }

    let retries = request.retries.unwrap_or(settings.retries);
    if retries == 0 {
        return None;
    }

    let initial_delay = request.retry_delay.unwrap_or_else(|| settings.delay());
    let max_delay = settings.max_delay().max(initial_delay);

    let builder = RetryConfig::builder().retries(retries);
    let builder = match settings.strategy {
        BackoffKind::Fixed => builder.fixed_backoff(initial_delay),
        BackoffKind::Linear => builder.linear_backoff(initial_delay, initial_delay, max_delay),
        BackoffKind::Exponential => {
            let base = if settings.backoff_factor > 0.0 { settings.backoff_factor } else { 1.0 };
            builder.exponential_backoff(initial_delay, base, max_delay)
        }
    };
    builder.build().ok()
}
