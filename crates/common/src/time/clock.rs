//! Monotonic clock seam
//!
//! Age-based caches (the health gate) ask a [`Clock`] for "now" instead of
//! calling `Instant::now()` so tests can step time by hand.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        T::now(self)
    }
}

/// Hand-driven clock. Clones observe the same offset.
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), offset: Arc::default() }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Time advanced since creation.
    pub fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_offset() {
        let clock = MockClock::new();
        let handle = clock.clone();
        let before = handle.now();

        clock.advance(Duration::from_millis(1_500));

        assert_eq!(handle.now() - before, Duration::from_millis(1_500));
        assert_eq!(handle.offset(), Duration::from_millis(1_500));
    }

    #[test]
    fn test_mock_clock_stands_still() {
        let clock = MockClock::new();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_arc_delegates() {
        let clock = Arc::new(MockClock::new());
        let start = clock.now();
        clock.advance(Duration::from_secs(3));
        assert_eq!(Clock::now(&clock) - start, Duration::from_secs(3));
        assert!(SystemClock.now() <= SystemClock.now());
    }
}
