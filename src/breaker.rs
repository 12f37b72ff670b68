//! Circuit breaker: a state machine that gates whether an attempt may be
//! issued at all.
//!
//! States: `Closed` (normal operation), `Open` (fail fast), `HalfOpen`
//! (limited trial requests probing recovery). Transitions are *lazy*: there is
//! no background timer; every [`admit`](CircuitBreaker::admit) and
//! [`report`](CircuitBreaker::report) first resolves the effective state
//! against the clock.
//!
//! Counting happens in generations. Every state transition and every periodic
//! counts-clear starts a new generation; an in-flight attempt's outcome is
//! applied only if its generation is still current when it reports, so a slow
//! attempt from one window can never corrupt the next.
//!
//! All shared state sits behind a single mutex. The lock is held only inside
//! `admit`/`report`, never across the attempt itself, and the state-change
//! hook fires after the lock is released.

use crate::clock::{Clock, MonotonicClock};
use crate::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Fail-fast mode; attempts are rejected until the open timeout elapses.
    Open,
    /// Probe mode allowing a limited number of trial requests.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half-open"),
        }
    }
}

/// Request tallies for the current generation.
///
/// Cleared as a unit whenever the generation rolls over; the tallies never mix
/// results from different counting windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn clear(&mut self) {
        *self = Counts::default();
    }

    /// Fraction of requests this generation that failed; 0 when no requests
    /// have been recorded.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }
}

/// Decides, after a failure in the closed state, whether the circuit trips.
pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Observability hook invoked on every state transition, outside the lock.
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Default trip rule: a run of consecutive failures, or a high failure ratio
/// over a meaningful sample.
pub fn default_trip(counts: &Counts) -> bool {
    counts.consecutive_failures > 5 || (counts.requests >= 10 && counts.failure_ratio() >= 0.6)
}

/// Why an attempt was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The circuit is open.
    Open {
        /// Time until the breaker transitions to half-open.
        retry_after: Duration,
        /// Consecutive failures recorded when the circuit tripped.
        consecutive_failures: u32,
    },
    /// The circuit is half-open and every trial slot is taken.
    TooManyTrials { trials: u32, limit: u32 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Open { retry_after, .. } => {
                write!(f, "circuit breaker is open (retry in {:?})", retry_after)
            }
            Rejection::TooManyTrials { trials, limit } => {
                write!(f, "too many trial requests ({} of {})", trials, limit)
            }
        }
    }
}

impl std::error::Error for Rejection {}

impl<E> From<Rejection> for Error<E> {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Open { retry_after, consecutive_failures } => {
                Error::CircuitOpen { consecutive_failures, retry_after }
            }
            Rejection::TooManyTrials { trials, limit } => Error::TooManyTrials { trials, limit },
        }
    }
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerError {
    /// Trial limit must be > 0.
    InvalidTrialLimit {
        /// Value provided by caller.
        provided: u32,
    },
    /// Open-state timeout must be > 0.
    InvalidOpenTimeout(Duration),
    /// Closed-state counts-reset interval must be > 0 when configured.
    InvalidResetInterval(Duration),
}

impl fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerError::InvalidTrialLimit { provided } => {
                write!(f, "max_trial_requests must be > 0 (got {})", provided)
            }
            CircuitBreakerError::InvalidOpenTimeout(timeout) => {
                write!(f, "open_timeout must be > 0 (got {:?})", timeout)
            }
            CircuitBreakerError::InvalidResetInterval(interval) => {
                write!(f, "counts_reset_interval must be > 0 when set (got {:?})", interval)
            }
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_TRIAL_REQUESTS: u32 = 1;

struct Shared {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// Meaning depends on state: in `Closed`, when to next clear the counts
    /// (if an interval is configured); in `Open`, when to go half-open;
    /// unused in `HalfOpen`.
    expiry: Option<Duration>,
}

/// The breaker proper. Share via `Arc`; all handles observe the same circuit.
pub struct CircuitBreaker {
    name: String,
    max_trial_requests: u32,
    counts_reset_interval: Option<Duration>,
    open_timeout: Duration,
    trip: TripPredicate,
    on_state_change: Option<StateChangeHook>,
    clock: Arc<dyn Clock>,
    shared: Mutex<Shared>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("max_trial_requests", &self.max_trial_requests)
            .field("counts_reset_interval", &self.counts_reset_interval)
            .field("open_timeout", &self.open_timeout)
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for [`CircuitBreaker`], validating thresholds and timeouts.
pub struct CircuitBreakerBuilder {
    name: String,
    max_trial_requests: u32,
    counts_reset_interval: Option<Duration>,
    open_timeout: Duration,
    trip: TripPredicate,
    on_state_change: Option<StateChangeHook>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_trial_requests: DEFAULT_MAX_TRIAL_REQUESTS,
            counts_reset_interval: None,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            trip: Arc::new(default_trip),
            on_state_change: None,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Maximum trial requests admitted concurrently while half-open.
    pub fn max_trial_requests(mut self, limit: u32) -> Self {
        self.max_trial_requests = limit;
        self
    }

    /// Periodic counts-clear interval for the closed state. Without one, the
    /// tallies accumulate until the next state transition.
    pub fn counts_reset_interval(mut self, interval: Duration) -> Self {
        self.counts_reset_interval = Some(interval);
        self
    }

    /// How long the circuit stays open before probing recovery.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Replace the trip rule (see [`default_trip`]).
    pub fn trip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.trip = Arc::new(predicate);
        self
    }

    /// Observe state transitions; invoked after the breaker lock is released
    /// and never affects the state machine.
    pub fn on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Result<CircuitBreaker, CircuitBreakerError> {
        if self.max_trial_requests == 0 {
            return Err(CircuitBreakerError::InvalidTrialLimit { provided: 0 });
        }
        if self.open_timeout.is_zero() {
            return Err(CircuitBreakerError::InvalidOpenTimeout(self.open_timeout));
        }
        if let Some(interval) = self.counts_reset_interval {
            if interval.is_zero() {
                return Err(CircuitBreakerError::InvalidResetInterval(interval));
            }
        }

        let now = self.clock.now();
        let breaker = CircuitBreaker {
            name: self.name,
            max_trial_requests: self.max_trial_requests,
            counts_reset_interval: self.counts_reset_interval,
            open_timeout: self.open_timeout,
            trip: self.trip,
            on_state_change: self.on_state_change,
            clock: self.clock,
            shared: Mutex::new(Shared {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: None,
            }),
        };
        {
            let mut shared = breaker.shared.lock().unwrap();
            breaker.new_generation(&mut shared, now);
        }
        Ok(breaker)
    }
}

impl CircuitBreaker {
    /// Breaker with default configuration (single trial request, 60s open
    /// timeout, default trip rule, no periodic counts clear).
    pub fn new(name: impl Into<String>) -> Self {
        match Self::builder(name).build() {
            Ok(breaker) => breaker,
            // Defaults always validate.
            Err(err) => unreachable!("default breaker config rejected: {err}"),
        }
    }

    pub fn builder(name: impl Into<String>) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask permission to issue one attempt.
    ///
    /// Resolves the effective state against the clock first (lazy
    /// transition), then either rejects or records the request and returns the
    /// generation the caller must later [`report`](Self::report) against.
    pub fn admit(&self) -> Result<u64, Rejection> {
        let now = self.clock.now();
        let mut transitions = Vec::new();

        let result = {
            let mut shared = self.shared.lock().unwrap();
            let (state, generation) = self.current_state(&mut shared, now, &mut transitions);

            match state {
                CircuitState::Open => {
                    let retry_after =
                        shared.expiry.map(|e| e.saturating_sub(now)).unwrap_or_default();
                    Err(Rejection::Open {
                        retry_after,
                        consecutive_failures: shared.counts.consecutive_failures,
                    })
                }
                CircuitState::HalfOpen
                    if shared.counts.requests >= self.max_trial_requests =>
                {
                    Err(Rejection::TooManyTrials {
                        trials: shared.counts.requests,
                        limit: self.max_trial_requests,
                    })
                }
                _ => {
                    shared.counts.on_request();
                    Ok(generation)
                }
            }
        };

        self.fire_transitions(&transitions);
        result
    }

    /// Report the outcome of an admitted attempt.
    ///
    /// If `generation` is no longer current the outcome is discarded as
    /// stale: the window it belonged to has already been superseded.
    pub fn report(&self, generation: u64, success: bool) {
        let now = self.clock.now();
        let mut transitions = Vec::new();

        {
            let mut shared = self.shared.lock().unwrap();
            let (state, current) = self.current_state(&mut shared, now, &mut transitions);
            if current == generation {
                if success {
                    self.on_success(&mut shared, state, now, &mut transitions);
                } else {
                    self.on_failure(&mut shared, state, now, &mut transitions);
                }
            }
        }

        self.fire_transitions(&transitions);
    }

    /// Effective state right now, after resolving any pending lazy transition.
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let mut transitions = Vec::new();
        let state = {
            let mut shared = self.shared.lock().unwrap();
            self.current_state(&mut shared, now, &mut transitions).0
        };
        self.fire_transitions(&transitions);
        state
    }

    /// Snapshot of the current generation's tallies.
    pub fn counts(&self) -> Counts {
        let now = self.clock.now();
        let mut transitions = Vec::new();
        let counts = {
            let mut shared = self.shared.lock().unwrap();
            self.current_state(&mut shared, now, &mut transitions);
            shared.counts
        };
        self.fire_transitions(&transitions);
        counts
    }

    fn current_state(
        &self,
        shared: &mut Shared,
        now: Duration,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) -> (CircuitState, u64) {
        match shared.state {
            CircuitState::Closed => {
                // Periodic counts clear; a generation change but not a state
                // transition.
                if let Some(expiry) = shared.expiry {
                    if expiry <= now {
                        self.new_generation(shared, now);
                    }
                }
            }
            CircuitState::Open => {
                if let Some(expiry) = shared.expiry {
                    if expiry <= now {
                        self.set_state(shared, CircuitState::HalfOpen, now, transitions);
                    }
                }
            }
            CircuitState::HalfOpen => {}
        }
        (shared.state, shared.generation)
    }

    fn on_success(
        &self,
        shared: &mut Shared,
        state: CircuitState,
        now: Duration,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) {
        match state {
            CircuitState::Closed => shared.counts.on_success(),
            CircuitState::HalfOpen => {
                shared.counts.on_success();
                if shared.counts.consecutive_successes >= self.max_trial_requests {
                    self.set_state(shared, CircuitState::Closed, now, transitions);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(
        &self,
        shared: &mut Shared,
        state: CircuitState,
        now: Duration,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) {
        match state {
            CircuitState::Closed => {
                shared.counts.on_failure();
                if (self.trip)(&shared.counts) {
                    self.set_state(shared, CircuitState::Open, now, transitions);
                }
            }
            // A single failed trial reopens the circuit.
            CircuitState::HalfOpen => {
                self.set_state(shared, CircuitState::Open, now, transitions);
            }
            CircuitState::Open => {}
        }
    }

    fn set_state(
        &self,
        shared: &mut Shared,
        to: CircuitState,
        now: Duration,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) {
        if shared.state == to {
            return;
        }
        let from = shared.state;
        shared.state = to;
        self.new_generation(shared, now);
        transitions.push((from, to));
    }

    fn new_generation(&self, shared: &mut Shared, now: Duration) {
        shared.generation += 1;
        shared.counts.clear();
        shared.expiry = match shared.state {
            CircuitState::Closed => self.counts_reset_interval.map(|interval| now + interval),
            CircuitState::Open => Some(now + self.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn fire_transitions(&self, transitions: &[(CircuitState, CircuitState)]) {
        for &(from, to) in transitions {
            match to {
                CircuitState::Open => {
                    tracing::warn!(breaker = %self.name, %from, %to, "circuit breaker opened")
                }
                CircuitState::HalfOpen => {
                    tracing::info!(breaker = %self.name, %from, %to, "circuit breaker half-open")
                }
                CircuitState::Closed => {
                    tracing::info!(breaker = %self.name, %from, %to, "circuit breaker closed")
                }
            }
            if let Some(hook) = &self.on_state_change {
                hook(&self.name, from, to);
            }
        }
    }
}
