//! Generic retry executor
//!
//! [`RetryExecutor`] re-runs an async operation while its [`RetryPolicy`]
//! says the failure is worth another attempt. Delays come from a
//! [`BackoffStrategy`], optionally spread by [`Jitter`], unless the policy
//! supplies its own delay ([`RetryDecision::RetryAfter`]).
//!
//! Attempts are counted from zero: attempt 0 is the first call, so a
//! `RetryConfig` with `max_attempts = 3` allows two retries.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed.
    #[error("gave up after {attempts} attempts: {last_error:?}")]
    AttemptsExhausted { attempts: u32, last_error: E },

    /// The policy refused to retry this error.
    #[error("not retryable: {last_error:?}")]
    NonRetryable { last_error: E },

    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// Error of the final attempt; `None` when no attempt ran.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::AttemptsExhausted { last_error, .. } | Self::NonRetryable { last_error } => {
                Some(last_error)
            }
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retry after the backoff delay.
    Retry,
    /// Retry after this delay instead of the backoff (e.g. `Retry-After`).
    RetryAfter(Duration),
    Stop,
}

/// Classifies failures. `attempt` is the 0-based index of the failed call.
pub trait RetryPolicy<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

impl<E, F> RetryPolicy<E> for F
where
    F: Fn(&E, u32) -> RetryDecision,
{
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
        self(error, attempt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    Fixed(Duration),
    /// `initial_delay + increment * attempt`, never above `max_delay`.
    Linear { initial_delay: Duration, increment: Duration, max_delay: Duration },
    /// `initial_delay * base^attempt`, never above `max_delay`.
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay after failed attempt `attempt` (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Linear { initial_delay, increment, max_delay } => {
                let grown = increment.saturating_mul(attempt);
                initial_delay.saturating_add(grown).min(*max_delay)
            }
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let millis = initial_delay.as_millis() as f64 * base.powi(exponent);
                let capped = millis.min(max_delay.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }
}

/// Random spread applied to backoff delays.
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay / 2, delay]`.
    Equal,
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(random_up_to(millis)),
            Self::Equal => {
                let floor = millis / 2;
                Duration::from_millis(floor + random_up_to(millis - floor))
            }
        }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=max)
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Calls in total, the first one included.
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::None,
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// `retries` extra calls, `delay` apart.
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            backoff: BackoffStrategy::Fixed(delay),
            jitter: Jitter::None,
        }
    }

    pub fn validate(&self) -> Result<(), RetryError<()>> {
        let invalid = |message: &str| {
            Err(RetryError::InvalidConfiguration { message: message.to_string() })
        };

        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1");
        }
        match &self.backoff {
            BackoffStrategy::Exponential { base, .. } if *base <= 0.0 => {
                invalid("exponential base must be positive")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Extra calls after the first one.
    pub fn retries(self, retries: u32) -> Self {
        self.max_attempts(retries.saturating_add(1))
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn linear_backoff(
        mut self,
        initial_delay: Duration,
        increment: Duration,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment, max_delay };
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate().map(|()| self.config)
    }
}

pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, the policy stops, or the attempt
    /// budget is spent. Sleeps use tokio time, so paused-clock tests work.
    #[instrument(level = "debug", skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.config
            .validate()
            .map_err(|err| RetryError::InvalidConfiguration { message: err.to_string() })?;

        let mut attempt: u32 = 0;
        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation recovered");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let made = attempt + 1;
            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempt = made, error = ?error, "Failure is not retryable");
                    return Err(RetryError::NonRetryable { last_error: error });
                }
                _ if made >= self.config.max_attempts => {
                    warn!(attempts = made, error = ?error, "Retry budget exhausted");
                    return Err(RetryError::AttemptsExhausted { attempts: made, last_error: error });
                }
                RetryDecision::RetryAfter(delay) => delay,
                RetryDecision::Retry => {
                    self.config.jitter.apply(self.config.backoff.calculate_delay(attempt))
                }
            };

            warn!(
                attempt = made,
                delay_ms = delay.as_millis() as u64,
                error = ?error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt = made;
        }
    }
}

pub async fn retry_with_policy<F, Fut, T, E, P>(
    config: RetryConfig,
    policy: P,
    operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy<E>,
    E: fmt::Debug,
{
    RetryExecutor::new(config, policy).execute(operation).await
}

/// Retry any failure `retries` times, `delay` apart.
pub async fn retry<F, Fut, T, E>(retries: u32, delay: Duration, operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Debug,
{
    retry_with_policy(RetryConfig::fixed(retries, delay), policies::AlwaysRetry, operation).await
}

pub mod policies {
    use super::{RetryDecision, RetryPolicy};

    #[derive(Debug, Clone, Copy)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }
}
