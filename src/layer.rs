//! Tower integration.
//!
//! [`DecoratorLayer`] wraps any `tower_service::Service` whose response
//! implements [`Response`] with the full [`Executor`] pipeline: breaker
//! admission, rate limiting, retries with backoff, and cancellation. The
//! request type must be `Clone` so each attempt can resend it.

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::executor::Executor;
use crate::response::Response;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer applying an [`Executor`]'s guards to an inner service.
#[derive(Debug)]
pub struct DecoratorLayer<R, E> {
    executor: Arc<Executor<R, E>>,
    cancel: CancelToken,
}

impl<R, E> Clone for DecoratorLayer<R, E> {
    fn clone(&self) -> Self {
        Self { executor: Arc::clone(&self.executor), cancel: self.cancel.clone() }
    }
}

impl<R, E> DecoratorLayer<R, E> {
    /// Layer every wrapped service on this executor. Each decorated service
    /// shares the executor's breaker and limiter.
    pub fn new(executor: Executor<R, E>) -> Self {
        Self { executor: Arc::new(executor), cancel: CancelToken::new() }
    }

    /// Tie all calls through this layer to `cancel`.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl<S, R, E> Layer<S> for DecoratorLayer<R, E> {
    type Service = DecoratorService<S, R, E>;

    fn layer(&self, service: S) -> Self::Service {
        DecoratorService {
            inner: service,
            executor: Arc::clone(&self.executor),
            cancel: self.cancel.clone(),
        }
    }
}

/// Middleware service produced by [`DecoratorLayer`].
#[derive(Debug)]
pub struct DecoratorService<S, R, E> {
    inner: S,
    executor: Arc<Executor<R, E>>,
    cancel: CancelToken,
}

impl<S: Clone, R, E> Clone for DecoratorService<S, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            executor: Arc::clone(&self.executor),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S, R, E, Req> Service<Req> for DecoratorService<S, R, E>
where
    S: Service<Req, Response = R> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<E>,
    R: Response + Send + 'static,
    E: fmt::Display + Send + 'static,
    Req: Clone + Send + 'static,
{
    type Response = R;
    type Error = Error<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(|err| Error::Inner(err.into()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let executor = Arc::clone(&self.executor);
        let cancel = self.cancel.clone();
        let inner = self.inner.clone();

        // The closure owns the service and request; each attempt works on
        // fresh clones.
        Box::pin(async move {
            executor
                .execute(&cancel, move || {
                    let mut service = inner.clone();
                    let req = req.clone();
                    async move { service.call(req).await.map_err(Into::into) }
                })
                .await
        })
    }
}
