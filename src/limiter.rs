//! Client-side rate limiting.
//!
//! The executor consults a [`RateLimiter`] before every attempt, including
//! retries; a denial is terminal for the whole logical call rather than a
//! reason to queue. [`TokenBucket`] is the built-in strategy.

use crate::clock::{Clock, MonotonicClock};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of asking the limiter for permission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// The attempt may proceed.
    Granted {
        /// Whole tokens left in the bucket after this grant.
        remaining: u32,
    },
    /// The attempt must not proceed.
    Denied {
        /// Time until enough tokens will have accumulated.
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted { .. })
    }
}

/// Strategy deciding whether an attempt may be issued right now.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Request `permits` tokens. Never blocks waiting for refill; a shortfall
    /// is reported as [`Admission::Denied`] with a wait hint.
    async fn acquire(&self, permits: u32) -> Admission;
}

/// Errors produced when validating token bucket configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum LimiterError {
    /// Refill rate must be finite and > 0 tokens per second.
    InvalidRate(f64),
    /// Burst capacity must be > 0 tokens.
    InvalidBurst(u32),
}

impl fmt::Display for LimiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterError::InvalidRate(rate) => {
                write!(f, "refill rate must be finite and > 0 (got {})", rate)
            }
            LimiterError::InvalidBurst(burst) => {
                write!(f, "burst capacity must be > 0 (got {})", burst)
            }
        }
    }
}

impl std::error::Error for LimiterError {}

struct BucketState {
    tokens: f64,
    last_refill: Duration,
}

/// Token bucket: replenishes at `rate` tokens per second up to `burst`,
/// starting full.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .finish()
    }
}

impl TokenBucket {
    /// Bucket refilling at `rate` tokens per second with capacity `burst`.
    pub fn new(rate: f64, burst: u32) -> Result<Self, LimiterError> {
        Self::with_clock(rate, burst, MonotonicClock::default())
    }

    /// Same as [`new`](Self::new) with an explicit clock, for deterministic
    /// tests.
    pub fn with_clock<C: Clock + 'static>(
        rate: f64,
        burst: u32,
        clock: C,
    ) -> Result<Self, LimiterError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(LimiterError::InvalidRate(rate));
        }
        if burst == 0 {
            return Err(LimiterError::InvalidBurst(burst));
        }
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let now = clock.now();
        Ok(Self {
            rate,
            burst: f64::from(burst),
            clock,
            state: Mutex::new(BucketState { tokens: f64::from(burst), last_refill: now }),
        })
    }

    fn refill(&self, state: &mut BucketState, now: Duration) {
        let elapsed = now.saturating_sub(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn acquire(&self, permits: u32) -> Admission {
        let cost = f64::from(permits);
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state, now);

        if state.tokens >= cost {
            state.tokens -= cost;
            Admission::Granted { remaining: state.tokens as u32 }
        } else {
            let missing = cost - state.tokens;
            Admission::Denied { retry_after: Duration::from_secs_f64(missing / self.rate) }
        }
    }
}
