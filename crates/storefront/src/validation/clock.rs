//! Time source for debounce deadlines.
//!
//! The engine reads `now` and the driver waits with `sleep_until` from the
//! same clock, so a test clock controls both.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Source of the current instant.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Resolve once `now()` has reached `deadline`.
    async fn sleep_until(&self, deadline: Instant);
}

/// Tokio's clock. Follows `tokio::time::pause` in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    advanced: Notify,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            advanced: Notify::new(),
        }
    }

    /// Move the clock forward, waking every sleeper.
    pub fn advance(&self, by: Duration) {
        {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += by;
        }
        self.advanced.notify_waiters();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sleep_until(&self, deadline: Instant) {
        loop {
            // registered before the check so an advance in between is not lost
            let advanced = self.advanced.notified();
            if self.now() >= deadline {
                return;
            }
            advanced.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_manual_clock_only_moves_on_advance() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_sleep_ignores_tokio_time() {
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_millis(500);
        let sleeper = tokio::spawn({
            let clock = Arc::clone(&clock);
            async move { clock.sleep_until(deadline).await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!sleeper.is_finished());

        clock.advance(Duration::from_millis(500));
        let joined = tokio::time::timeout(Duration::from_secs(1), sleeper).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}
