//! Clock abstraction used by the circuit breaker and the token bucket.

use std::time::{Duration, Instant};

/// Source of "now" so time-based policies can be driven manually in tests.
///
/// Returns the time elapsed since an arbitrary process-local epoch; only
/// differences between readings are ever meaningful.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Duration;
}

/// Monotonic clock backed by `Instant::now()`.
///
/// Resets when the process restarts, which is fine here: breaker and limiter
/// state is process-local by design and never persisted.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock::default();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
