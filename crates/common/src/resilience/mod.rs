//! Resilience patterns for fault tolerance
//!
//! Generic retry with pluggable backoff, jitter and retry policies. The
//! executor is generic over the error type so the HTTP client can plug in its
//! own classification of transient failures.

pub mod retry;

pub use retry::{
    policies, retry, retry_with_policy, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder,
    RetryDecision, RetryError, RetryExecutor, RetryPolicy, RetryResult,
};
