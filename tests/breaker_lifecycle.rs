//! Full circuit breaker lifecycle driven through the public API.

mod common;

use breakwater::{CircuitBreaker, CircuitState, Counts, Rejection};
use common::ManualClock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn lifecycle_breaker(clock: &ManualClock) -> (CircuitBreaker, Arc<Mutex<Vec<(CircuitState, CircuitState)>>>) {
    let transitions: Arc<Mutex<Vec<(CircuitState, CircuitState)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&transitions);
    let breaker = CircuitBreaker::builder("lifecycle")
        .open_timeout(Duration::from_secs(10))
        .max_trial_requests(2)
        .trip_when(|counts| counts.consecutive_failures >= 3)
        .with_clock(clock.clone())
        .on_state_change(move |_, from, to| sink.lock().unwrap().push((from, to)))
        .build()
        .expect("valid breaker");
    (breaker, transitions)
}

#[test]
fn closed_to_open_to_half_open_to_closed() {
    let clock = ManualClock::new();
    let (breaker, transitions) = lifecycle_breaker(&clock);

    // Healthy traffic keeps the circuit closed.
    for _ in 0..5 {
        let generation = breaker.admit().expect("closed admits");
        breaker.report(generation, true);
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    // Three consecutive failures trip it.
    for _ in 0..3 {
        let generation = breaker.admit().expect("closed admits");
        breaker.report(generation, false);
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(matches!(breaker.admit(), Err(Rejection::Open { .. })));

    // The open window elapses; trials are admitted up to the limit.
    clock.advance(10_000);
    let first = breaker.admit().expect("first trial");
    let second = breaker.admit().expect("second trial");
    assert!(matches!(
        breaker.admit(),
        Err(Rejection::TooManyTrials { trials: 2, limit: 2 })
    ));

    // Both trials succeed; the circuit closes with fresh counts.
    breaker.report(first, true);
    breaker.report(second, true);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.counts(), Counts::default());

    assert_eq!(
        *transitions.lock().unwrap(),
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}

#[test]
fn a_failed_trial_reopens_and_restarts_the_open_window() {
    let clock = ManualClock::new();
    let (breaker, _) = lifecycle_breaker(&clock);

    for _ in 0..3 {
        let generation = breaker.admit().expect("admit");
        breaker.report(generation, false);
    }
    clock.advance(10_000);

    let trial = breaker.admit().expect("trial");
    breaker.report(trial, false);
    assert_eq!(breaker.state(), CircuitState::Open);

    // The full timeout applies again from the trial failure.
    clock.advance(9_999);
    assert!(matches!(breaker.admit(), Err(Rejection::Open { .. })));
    clock.advance(1);
    breaker.admit().expect("half-open again");
}

#[test]
fn outcomes_from_a_superseded_window_are_ignored() {
    let clock = ManualClock::new();
    let (breaker, _) = lifecycle_breaker(&clock);

    // A slow request is admitted while closed.
    let slow = breaker.admit().expect("admit");

    // The circuit trips and recovers before the slow request completes.
    for _ in 0..3 {
        let generation = breaker.admit().expect("admit");
        breaker.report(generation, false);
    }
    clock.advance(10_000);
    for _ in 0..2 {
        let trial = breaker.admit().expect("trial");
        breaker.report(trial, true);
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    // The slow request finally fails; its window is long gone.
    breaker.report(slow, false);
    assert_eq!(breaker.counts(), Counts::default());
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn closed_counts_roll_over_on_the_reset_interval() {
    let clock = ManualClock::new();
    let breaker = CircuitBreaker::builder("windowed")
        .counts_reset_interval(Duration::from_secs(30))
        .trip_when(|counts| counts.total_failures >= 3)
        .with_clock(clock.clone())
        .build()
        .expect("valid breaker");

    // Two failures land in the first window.
    for _ in 0..2 {
        let generation = breaker.admit().expect("admit");
        breaker.report(generation, false);
    }

    // The window rolls over; the third failure starts a fresh tally and the
    // circuit stays closed.
    clock.advance(30_000);
    let generation = breaker.admit().expect("admit");
    breaker.report(generation, false);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.counts().total_failures, 1);
}
