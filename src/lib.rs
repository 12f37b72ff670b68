#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Breakwater
//!
//! A fault-tolerance decorator for opaque async request functions: bounded
//! retries with backoff, a circuit breaker, client-side rate limiting, and
//! replayable request bodies behind one unified error surface.
//!
//! ## Features
//!
//! - **Bounded retries** with exponential or linear-jitter backoff and a
//!   pluggable classification policy
//! - **Circuit breaker** with lazy open/half-open/closed transitions,
//!   generation-scoped counting, and limited trial requests
//! - **Token-bucket rate limiting** applied to every attempt, retries
//!   included
//! - **Replayable bodies** so a retried request resends byte-identical
//!   payloads, even from one-shot streams
//! - **Cooperative cancellation** that wins every race, backoff included
//! - **Tower integration** for decorating any compatible service
//!
//! ## Quick Start
//!
//! ```rust
//! use breakwater::{CancelToken, Executor, Response};
//! use std::time::Duration;
//! use tokio::io::AsyncRead;
//!
//! struct Reply(u16);
//!
//! impl Response for Reply {
//!     fn status(&self) -> u16 { self.0 }
//!     fn body(&mut self) -> Option<&mut (dyn AsyncRead + Unpin + Send)> { None }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let executor = Executor::builder()
//!         .max_retries(3)
//!         .min_wait(Duration::from_millis(50))
//!         .max_wait(Duration::from_secs(2))
//!         .build()
//!         .unwrap();
//!
//!     let result = executor
//!         .execute(&CancelToken::new(), || async {
//!             // Your async request here
//!             Ok::<_, std::io::Error>(Reply(200))
//!         })
//!         .await;
//!     assert_eq!(result.unwrap().status(), 200);
//! }
//! ```

pub mod backoff;
pub mod body;
pub mod breaker;
pub mod cancel;
pub mod clock;
pub mod error;
pub mod executor;
pub mod layer;
pub mod limiter;
pub mod prelude;
pub mod request;
pub mod response;
pub mod retry;
pub mod sleeper;

// Re-exports
pub use backoff::{Backoff, BackoffFn};
pub use body::{BodyError, BodyReader, BodySource, ReplayableBody, SeekSource};
pub use breaker::{
    CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerError, CircuitState, Counts, Rejection,
};
pub use cancel::CancelToken;
pub use clock::{Clock, MonotonicClock};
pub use error::Error;
pub use executor::{BuildError, Executor, ExecutorBuilder, SuccessCriteria};
pub use layer::{DecoratorLayer, DecoratorService};
pub use limiter::{Admission, LimiterError, RateLimiter, TokenBucket};
pub use request::RequestTemplate;
pub use response::{Response, RESPONSE_DRAIN_LIMIT};
pub use retry::{default_check_retry, CheckRetry, Verdict};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
