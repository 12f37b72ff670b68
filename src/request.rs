//! Transport-agnostic request template.
//!
//! The decorator never issues requests itself; the attempt closure does. A
//! [`RequestTemplate`] is the retry-safe description of one logical request:
//! metadata plus a [`ReplayableBody`], cloneable so every attempt can
//! materialize a fresh, byte-identical request from it, and carrying the
//! call's [`CancelToken`].

use crate::body::{BodySource, ReplayableBody};
use crate::cancel::CancelToken;
use crate::error::Error;

/// A description of one logical request, safe to replay across attempts.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Option<ReplayableBody>,
    cancel: CancelToken,
}

impl RequestTemplate {
    /// Bodiless template for `method` against `target`.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            body: None,
            cancel: CancelToken::new(),
        }
    }

    /// Append a header. Repeated names are kept in insertion order.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a payload. The source is resolved into a replayable body here,
    /// once, so an unsupported source fails before any attempt is issued.
    pub async fn body<E>(mut self, source: BodySource) -> Result<Self, Error<E>> {
        self.body = Some(ReplayableBody::new(source).await?);
        Ok(self)
    }

    /// Tie this request to an existing cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn replayable_body(&self) -> Option<&ReplayableBody> {
        self.body.as_ref()
    }

    /// Body length in bytes; 0 for a bodiless request.
    pub fn content_length(&self) -> u64 {
        self.body.as_ref().map(ReplayableBody::content_length).unwrap_or(0)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyError;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn template_accumulates_headers_in_order() {
        let request = RequestTemplate::new("GET", "https://example.com/health")
            .header("accept", "application/json")
            .header("x-trace", "abc");

        assert_eq!(request.method(), "GET");
        assert_eq!(request.target(), "https://example.com/health");
        assert_eq!(
            request.headers(),
            &[
                ("accept".to_string(), "application/json".to_string()),
                ("x-trace".to_string(), "abc".to_string()),
            ]
        );
        assert_eq!(request.content_length(), 0);
    }

    #[tokio::test]
    async fn body_replays_identically_through_clones() {
        let payload = b"idempotent payload".to_vec();
        let request = RequestTemplate::new("PUT", "https://example.com/things/1")
            .body::<std::io::Error>(BodySource::Buffer(payload.clone()))
            .await
            .expect("buffer body");

        assert_eq!(request.content_length(), payload.len() as u64);
        for clone in [request.clone(), request.clone()] {
            let body = clone.replayable_body().expect("body present");
            let mut reader = body.reader().await.expect("reader");
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.expect("read");
            assert_eq!(out, payload);
        }
    }

    #[tokio::test]
    async fn unsupported_body_source_fails_template_construction() {
        let err = RequestTemplate::new("POST", "https://example.com/upload")
            .body::<std::io::Error>(BodySource::Unsupported("pipe"))
            .await
            .expect_err("unsupported source");

        match err {
            Error::Body(BodyError::Unsupported { kind }) => assert_eq!(kind, "pipe"),
            other => panic!("expected Body error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_token_is_shared_with_the_caller() {
        let token = CancelToken::new();
        let request =
            RequestTemplate::new("GET", "https://example.com").with_cancel(token.clone());

        token.cancel();
        assert!(request.cancel_token().is_cancelled());
    }
}
