//! Convenient re-exports for common Breakwater types.
pub use crate::{
    backoff::Backoff,
    body::{BodySource, ReplayableBody},
    breaker::{CircuitBreaker, CircuitState, Counts},
    cancel::CancelToken,
    error::Error,
    executor::{Executor, SuccessCriteria},
    layer::DecoratorLayer,
    limiter::{Admission, RateLimiter, TokenBucket},
    request::RequestTemplate,
    response::Response,
    retry::Verdict,
};
