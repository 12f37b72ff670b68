//! The decorator core: one logical call, many guarded attempts.
//!
//! [`Executor::execute`] wraps an opaque attempt function with the full
//! fault-tolerance pipeline. Per attempt, in order:
//!
//! 1. check cancellation
//! 2. ask the circuit breaker for admission (fail fast when open)
//! 3. ask the rate limiter for a token (a denial is terminal)
//! 4. run the attempt
//! 5. classify the outcome with the [`CheckRetry`] policy
//! 6. report success or failure to the breaker
//! 7. on a retryable outcome, drain the response body and wait out the
//!    backoff, racing the wait against cancellation
//!
//! The attempt budget is `max_retries + 1`: the initial attempt plus that many
//! retries. Cancellation wins every race; a call cancelled mid-backoff
//! performs no further attempts.

use crate::backoff::Backoff;
use crate::breaker::CircuitBreaker;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::limiter::{Admission, RateLimiter};
use crate::response::{drain_body, Response};
use crate::retry::{default_check_retry, CheckRetry, Verdict};
use crate::sleeper::{Sleeper, TokioSleeper};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: usize = 4;

/// What the circuit breaker counts as a successful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuccessCriteria {
    /// Any outcome the retry policy does not classify as transient. A `404`
    /// is conclusive service behavior, not service ill health, so it counts
    /// as a success; transport errors and retryable statuses count as
    /// failures.
    #[default]
    NonTransient,
    /// Any attempt that produced a response and was not overridden by a
    /// [`Verdict::Fail`](crate::retry::Verdict::Fail). Only transport errors
    /// and policy overrides count as failures.
    AnyCompleted,
}

/// Errors produced when validating executor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `max_wait` must be >= `min_wait`.
    InvalidWaitBounds { min: Duration, max: Duration },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidWaitBounds { min, max } => {
                write!(f, "max_wait ({:?}) must be >= min_wait ({:?})", max, min)
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// The fault-tolerance decorator. Cheap to clone; clones share the breaker,
/// limiter, and sleeper.
pub struct Executor<R, E> {
    min_wait: Duration,
    max_wait: Duration,
    max_retries: usize,
    backoff: Backoff,
    check: CheckRetry<R, E>,
    success: SuccessCriteria,
    sleeper: Arc<dyn Sleeper>,
    breaker: Arc<CircuitBreaker>,
    limiter: Option<Arc<dyn RateLimiter>>,
}

impl<R, E> Clone for Executor<R, E> {
    fn clone(&self) -> Self {
        Self {
            min_wait: self.min_wait,
            max_wait: self.max_wait,
            max_retries: self.max_retries,
            backoff: self.backoff.clone(),
            check: Arc::clone(&self.check),
            success: self.success,
            sleeper: Arc::clone(&self.sleeper),
            breaker: Arc::clone(&self.breaker),
            limiter: self.limiter.clone(),
        }
    }
}

impl<R, E> fmt::Debug for Executor<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("min_wait", &self.min_wait)
            .field("max_wait", &self.max_wait)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("success", &self.success)
            .field("breaker", &self.breaker.name())
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

/// Builder for [`Executor`].
pub struct ExecutorBuilder<R, E> {
    min_wait: Duration,
    max_wait: Duration,
    max_retries: usize,
    backoff: Backoff,
    check: CheckRetry<R, E>,
    success: SuccessCriteria,
    sleeper: Arc<dyn Sleeper>,
    breaker: Option<Arc<CircuitBreaker>>,
    limiter: Option<Arc<dyn RateLimiter>>,
}

impl<R: Response + 'static, E: 'static> Default for ExecutorBuilder<R, E> {
    fn default() -> Self {
        Self {
            min_wait: DEFAULT_MIN_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::Exponential,
            check: Arc::new(default_check_retry),
            success: SuccessCriteria::default(),
            sleeper: Arc::new(TokioSleeper),
            breaker: None,
            limiter: None,
        }
    }
}

impl<R: Response, E> ExecutorBuilder<R, E> {
    /// Lower bound for backoff waits.
    pub fn min_wait(mut self, wait: Duration) -> Self {
        self.min_wait = wait;
        self
    }

    /// Upper bound for backoff waits.
    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Retry budget; the call performs at most `retries + 1` attempts.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the retry classification policy (see
    /// [`default_check_retry`]).
    pub fn check_retry<F>(mut self, check: F) -> Self
    where
        F: Fn(&CancelToken, Result<&R, &E>) -> Verdict<E> + Send + Sync + 'static,
    {
        self.check = Arc::new(check);
        self
    }

    /// What the breaker counts as success.
    pub fn success_criteria(mut self, criteria: SuccessCriteria) -> Self {
        self.success = criteria;
        self
    }

    /// Override how backoff waits are slept (useful for deterministic tests).
    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Share a circuit breaker across executors. Without one, the executor
    /// builds a private breaker with default configuration.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn rate_limiter<L: RateLimiter + 'static>(mut self, limiter: L) -> Self {
        self.limiter = Some(Arc::new(limiter));
        self
    }

    pub fn build(self) -> Result<Executor<R, E>, BuildError> {
        if self.max_wait < self.min_wait {
            return Err(BuildError::InvalidWaitBounds { min: self.min_wait, max: self.max_wait });
        }
        Ok(Executor {
            min_wait: self.min_wait,
            max_wait: self.max_wait,
            max_retries: self.max_retries,
            backoff: self.backoff,
            check: self.check,
            success: self.success,
            sleeper: self.sleeper,
            breaker: self
                .breaker
                .unwrap_or_else(|| Arc::new(CircuitBreaker::new("breakwater"))),
            limiter: self.limiter,
        })
    }
}

impl<R, E> Executor<R, E>
where
    R: Response + 'static,
    E: fmt::Display + 'static,
{
    /// Executor with default configuration: exponential backoff between 1s
    /// and 30s, 4 retries, the default retry policy, a private default
    /// breaker, and no rate limiter.
    pub fn new() -> Self {
        match Self::builder().build() {
            Ok(executor) => executor,
            // Defaults always validate.
            Err(err) => unreachable!("default executor config rejected: {err}"),
        }
    }

    pub fn builder() -> ExecutorBuilder<R, E> {
        ExecutorBuilder::default()
    }

    /// The circuit breaker guarding this executor's attempts.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run one logical call, retrying `attempt` under the configured guards.
    ///
    /// `attempt` is invoked once per admitted attempt; it must produce a
    /// fresh future each time (replaying any request body itself, see
    /// [`ReplayableBody`](crate::body::ReplayableBody)).
    ///
    /// Every breaker admission is reported exactly once. Attempts that never
    /// produce a usable exchange — a rate-limiter denial after admission, or
    /// a cancellation observed by the retry policy — report as failures, so
    /// a half-open trial slot is always released.
    pub async fn execute<F, Fut>(
        &self,
        cancel: &CancelToken,
        mut attempt: F,
    ) -> Result<R, Error<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let mut attempts = 0usize;
        let mut last_err: Option<E> = None;
        let mut last_status: Option<u16>;

        for attempt_index in 0..=self.max_retries {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let generation = self.breaker.admit()?;

            if let Some(limiter) = &self.limiter {
                if let Admission::Denied { retry_after } = limiter.acquire(1).await {
                    tracing::debug!(?retry_after, "rate limiter denied the attempt");
                    // The admission must still be reported or a half-open
                    // trial slot would stay consumed forever.
                    self.breaker.report(generation, false);
                    return Err(Error::RateLimited { retry_after });
                }
            }

            attempts += 1;
            let outcome = attempt().await;
            let verdict = (self.check)(cancel, outcome.as_ref());

            // Every admission gets exactly one report. A cancelled attempt
            // counts as a failure, like any other attempt that produced no
            // usable exchange.
            let completed =
                outcome.is_ok() && !matches!(verdict, Verdict::Fail(_) | Verdict::Cancel);
            let succeeded = match self.success {
                SuccessCriteria::NonTransient => completed && !verdict.is_retry(),
                SuccessCriteria::AnyCompleted => completed,
            };
            self.breaker.report(generation, succeeded);

            match verdict {
                Verdict::Halt => {
                    return outcome.map_err(Error::Inner);
                }
                Verdict::Fail(err) => {
                    if let Ok(mut response) = outcome {
                        drain_body(&mut response).await;
                    }
                    return Err(Error::Inner(err));
                }
                Verdict::Cancel => {
                    return Err(Error::Cancelled);
                }
                Verdict::Retry => match outcome {
                    Ok(mut response) => {
                        last_status = Some(response.status());
                        tracing::debug!(
                            status = response.status(),
                            attempt = attempts,
                            "attempt produced a retryable response"
                        );
                        drain_body(&mut response).await;
                        last_err = None;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, attempt = attempts, "attempt failed");
                        last_err = Some(err);
                        // Backoff policies see the outcome of this attempt,
                        // not a status left over from an earlier one.
                        last_status = None;
                    }
                },
            }

            if attempt_index == self.max_retries {
                break;
            }

            let wait = self.backoff.wait(self.min_wait, self.max_wait, attempt_index, last_status);
            tracing::debug!(?wait, attempt = attempts, "backing off before retry");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = self.sleeper.sleep(wait) => {}
            }
        }

        tracing::error!(attempts, "giving up after exhausting the retry budget");
        Err(Error::RetriesExhausted { attempts, last: last_err })
    }
}

impl<R: Response + 'static, E: fmt::Display + 'static> Default for Executor<R, E> {
    fn default() -> Self {
        Self::new()
    }
}
