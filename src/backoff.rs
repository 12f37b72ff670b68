//! Backoff policies: how long to wait before the next attempt.
//!
//! A policy is a pure function of `(min_wait, max_wait, attempt_index,
//! last_status)`; the executor owns the wait bounds and passes them in per
//! call. `attempt_index` is 0-based and names the attempt that just completed,
//! so the first retry waits `min_wait * 2^0 = min_wait` under the exponential
//! policy.
//!
//! Randomized policies draw from `rand::rng()` by default; tests pin a seeded
//! RNG through [`Backoff::wait_with_rng`].
//!
//! Example
//! ```rust
//! use breakwater::Backoff;
//! use std::time::Duration;
//!
//! let min = Duration::from_millis(100);
//! let max = Duration::from_secs(2);
//! let backoff = Backoff::Exponential;
//! assert_eq!(backoff.wait(min, max, 0, None), Duration::from_millis(100));
//! assert_eq!(backoff.wait(min, max, 3, None), Duration::from_millis(800));
//! assert_eq!(backoff.wait(min, max, 10, None), Duration::from_secs(2)); // capped
//! ```

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied wait policy matching the built-in signature.
pub type BackoffFn = dyn Fn(Duration, Duration, usize, Option<u16>) -> Duration + Send + Sync;

/// Wait policy applied between attempts.
#[derive(Clone)]
pub enum Backoff {
    /// `min(min_wait * 2^attempt, max_wait)`. Overflow clamps to `max_wait`,
    /// never wraps.
    Exponential,
    /// Uniform draw in `[min_wait, max_wait]` multiplied by `attempt + 1`;
    /// degrades to strict `min_wait * (attempt + 1)` when `max_wait <=
    /// min_wait`. The jitter keeps synchronized clients from retrying in
    /// lockstep.
    LinearJitter,
    /// Custom policy.
    Custom(Arc<BackoffFn>),
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backoff::Exponential => f.write_str("Exponential"),
            Backoff::LinearJitter => f.write_str("LinearJitter"),
            Backoff::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Backoff {
    /// Compute the wait before the retry following `attempt` (0-based index of
    /// the attempt that just completed). `last_status` is the status code of
    /// the last response, if any; built-in policies ignore it but custom ones
    /// may honor server hints.
    pub fn wait(
        &self,
        min_wait: Duration,
        max_wait: Duration,
        attempt: usize,
        last_status: Option<u16>,
    ) -> Duration {
        self.wait_with_rng(min_wait, max_wait, attempt, last_status, &mut rand::rng())
    }

    /// Same as [`wait`](Self::wait) with an explicit RNG, for deterministic
    /// tests of the jittered policy.
    pub fn wait_with_rng<R: Rng + ?Sized>(
        &self,
        min_wait: Duration,
        max_wait: Duration,
        attempt: usize,
        last_status: Option<u16>,
        rng: &mut R,
    ) -> Duration {
        match self {
            Backoff::Exponential => exponential(min_wait, max_wait, attempt),
            Backoff::LinearJitter => linear_jitter(min_wait, max_wait, attempt, rng),
            Backoff::Custom(f) => f(min_wait, max_wait, attempt, last_status),
        }
    }
}

fn exponential(min_wait: Duration, max_wait: Duration, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
    let multiplier = 2u128.saturating_pow(exponent);
    let nanos = min_wait.as_nanos().saturating_mul(multiplier).min(max_wait.as_nanos());
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn linear_jitter<R: Rng + ?Sized>(
    min_wait: Duration,
    max_wait: Duration,
    attempt: usize,
    rng: &mut R,
) -> Duration {
    let slope = u64::try_from(attempt).unwrap_or(u64::MAX).saturating_add(1);

    if max_wait <= min_wait {
        // Degenerate bounds leave nothing to jitter over.
        let nanos = nanos_u64(min_wait).saturating_mul(slope);
        return Duration::from_nanos(nanos);
    }

    let span = nanos_u64(max_wait) - nanos_u64(min_wait);
    let drawn = nanos_u64(min_wait).saturating_add(rng.random_range(0..=span));
    Duration::from_nanos(drawn.saturating_mul(slope))
}

fn nanos_u64(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const MIN: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_secs(2);

    #[test]
    fn exponential_doubles_each_attempt() {
        let backoff = Backoff::Exponential;
        assert_eq!(backoff.wait(MIN, MAX, 0, None), Duration::from_millis(100));
        assert_eq!(backoff.wait(MIN, MAX, 1, None), Duration::from_millis(200));
        assert_eq!(backoff.wait(MIN, MAX, 2, None), Duration::from_millis(400));
        assert_eq!(backoff.wait(MIN, MAX, 3, None), Duration::from_millis(800));
    }

    #[test]
    fn exponential_caps_exactly_at_the_crossover() {
        // 100ms * 2^4 = 1.6s is the last uncapped value; 2^5 crosses 2s.
        let backoff = Backoff::Exponential;
        assert_eq!(backoff.wait(MIN, MAX, 4, None), Duration::from_millis(1600));
        assert_eq!(backoff.wait(MIN, MAX, 5, None), MAX);
        assert_eq!(backoff.wait(MIN, MAX, 6, None), MAX);
    }

    #[test]
    fn exponential_overflow_clamps_to_max() {
        let backoff = Backoff::Exponential;
        assert_eq!(backoff.wait(MIN, MAX, 1_000_000_000, None), MAX);
        assert_eq!(backoff.wait(MIN, MAX, usize::MAX, None), MAX);
    }

    #[test]
    fn exponential_with_zero_min_stays_zero() {
        let backoff = Backoff::Exponential;
        assert_eq!(backoff.wait(Duration::ZERO, MAX, 7, None), Duration::ZERO);
    }

    #[test]
    fn linear_jitter_degrades_to_strict_linear_when_unbounded() {
        let backoff = Backoff::LinearJitter;
        // max == min
        assert_eq!(backoff.wait(MIN, MIN, 0, None), Duration::from_millis(100));
        assert_eq!(backoff.wait(MIN, MIN, 2, None), Duration::from_millis(300));
        // max < min
        assert_eq!(
            backoff.wait(MIN, Duration::from_millis(50), 3, None),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn linear_jitter_stays_within_scaled_bounds() {
        let backoff = Backoff::LinearJitter;
        let mut rng = StdRng::seed_from_u64(42);

        for attempt in 0..6usize {
            let wait = backoff.wait_with_rng(MIN, MAX, attempt, None, &mut rng);
            let factor = (attempt + 1) as u32;
            assert!(wait >= MIN * factor, "attempt {attempt}: {wait:?} below floor");
            assert!(wait <= MAX * factor, "attempt {attempt}: {wait:?} above ceiling");
        }
    }

    #[test]
    fn linear_jitter_is_deterministic_under_a_fixed_seed() {
        let backoff = Backoff::LinearJitter;
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for attempt in 0..4usize {
            assert_eq!(
                backoff.wait_with_rng(MIN, MAX, attempt, None, &mut a),
                backoff.wait_with_rng(MIN, MAX, attempt, None, &mut b),
            );
        }
    }

    #[test]
    fn custom_policy_receives_the_last_status() {
        let backoff = Backoff::Custom(Arc::new(|min, _max, _attempt, status| {
            if status == Some(503) {
                min * 10
            } else {
                min
            }
        }));
        assert_eq!(backoff.wait(MIN, MAX, 0, Some(503)), Duration::from_secs(1));
        assert_eq!(backoff.wait(MIN, MAX, 0, Some(500)), MIN);
    }
}
