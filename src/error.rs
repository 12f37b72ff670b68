//! Error surface of the decorator.

use crate::body::BodyError;
use std::fmt;
use std::time::Duration;

/// Unified error type returned by the executor and the tower layer.
///
/// `E` is the wrapped transport's own error type; it is propagated verbatim
/// through [`Error::Inner`] and recorded in [`Error::RetriesExhausted`].
#[derive(Debug)]
pub enum Error<E> {
    /// The circuit breaker is open; the attempt was never issued.
    CircuitOpen {
        /// Consecutive failures recorded when the circuit tripped.
        consecutive_failures: u32,
        /// Time until the breaker next admits a trial request.
        retry_after: Duration,
    },
    /// The breaker is half-open and all trial slots are taken.
    TooManyTrials {
        /// Trial requests already admitted this window.
        trials: u32,
        /// Configured trial limit.
        limit: u32,
    },
    /// The token bucket denied the attempt.
    RateLimited {
        /// Time until enough tokens have accumulated.
        retry_after: Duration,
    },
    /// The retry budget ran out.
    RetriesExhausted {
        /// Total attempts performed (retries + the initial attempt).
        attempts: usize,
        /// Last transport error, when the final attempt failed outright.
        /// `None` when it produced a retryable response instead.
        last: Option<E>,
    },
    /// The caller cancelled the logical call.
    Cancelled,
    /// The request body could not be made replayable.
    Body(BodyError),
    /// The underlying transport failed in a non-retryable way.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { consecutive_failures, retry_after } => write!(
                f,
                "circuit breaker is open ({} consecutive failures, retry in {:?})",
                consecutive_failures, retry_after
            ),
            Self::TooManyTrials { trials, limit } => {
                write!(f, "too many trial requests ({} of {} admitted)", trials, limit)
            }
            Self::RateLimited { retry_after } => {
                write!(f, "exceeded rate limit (retry in {:?})", retry_after)
            }
            Self::RetriesExhausted { attempts, last } => {
                if let Some(last) = last {
                    write!(f, "giving up after {} attempts; last error: {}", attempts, last)
                } else {
                    write!(f, "giving up after {} attempts", attempts)
                }
            }
            Self::Cancelled => write!(f, "call cancelled"),
            Self::Body(err) => write!(f, "{}", err),
            Self::Inner(err) => write!(f, "{}", err),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Error<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetriesExhausted { last, .. } => {
                last.as_ref().map(|e| e as &dyn std::error::Error)
            }
            Self::Body(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<BodyError> for Error<E> {
    fn from(err: BodyError) -> Self {
        Self::Body(err)
    }
}

impl<E> Error<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_too_many_trials(&self) -> bool {
        matches!(self, Self::TooManyTrials { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for any rejection that was never sent to the transport
    /// (open circuit, exhausted trial slots, or rate limit).
    pub fn is_shed(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. } | Self::TooManyTrials { .. } | Self::RateLimited { .. }
        )
    }

    /// Extract the transport error if this is an `Inner` variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the transport error if present (`Inner` or the last recorded
    /// failure of an exhausted retry budget).
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetriesExhausted { last, .. } => last.as_ref(),
            _ => None,
        }
    }

    /// Attempt count for `RetriesExhausted`.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Wait hint carried by shed errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } | Self::RateLimited { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}
