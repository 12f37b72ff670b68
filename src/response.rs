//! Minimal view of a transport response.
//!
//! The executor only needs two things from a response: a status code to
//! classify, and a body to drain before retrying so the transport's
//! connection can be reused.

use tokio::io::{AsyncRead, AsyncReadExt};

/// How many body bytes are read while draining a response that is about to be
/// discarded. Reading a bounded prefix is enough to let most connections be
/// reused without risking unbounded reads of a huge error page.
pub const RESPONSE_DRAIN_LIMIT: u64 = 4096;

/// A completed transport response, as the retry machinery sees it.
pub trait Response: Send {
    /// Protocol status code. `0` means the transport produced no usable
    /// status and is treated as retryable.
    fn status(&self) -> u16;

    /// Remaining body bytes, if the response carries any.
    fn body(&mut self) -> Option<&mut (dyn AsyncRead + Unpin + Send)>;
}

/// Read and discard up to [`RESPONSE_DRAIN_LIMIT`] bytes of `response`'s body.
pub(crate) async fn drain_body<R: Response + ?Sized>(response: &mut R) {
    let Some(body) = response.body() else { return };
    let mut limited = body.take(RESPONSE_DRAIN_LIMIT);
    if let Err(err) = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await {
        tracing::debug!(error = %err, "error draining response body");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FakeResponse {
        status: u16,
        body: Cursor<Vec<u8>>,
    }

    impl Response for FakeResponse {
        fn status(&self) -> u16 {
            self.status
        }

        fn body(&mut self) -> Option<&mut (dyn AsyncRead + Unpin + Send)> {
            Some(&mut self.body)
        }
    }

    #[tokio::test]
    async fn drain_consumes_a_small_body_fully() {
        let mut response = FakeResponse { status: 500, body: Cursor::new(vec![7u8; 100]) };
        drain_body(&mut response).await;
        assert_eq!(response.body.position(), 100);
    }

    #[tokio::test]
    async fn drain_stops_at_the_limit_for_large_bodies() {
        let size = (RESPONSE_DRAIN_LIMIT + 1000) as usize;
        let mut response = FakeResponse { status: 503, body: Cursor::new(vec![0u8; size]) };
        drain_body(&mut response).await;
        assert_eq!(response.body.position(), RESPONSE_DRAIN_LIMIT);
    }

    struct BodylessResponse;

    impl Response for BodylessResponse {
        fn status(&self) -> u16 {
            204
        }

        fn body(&mut self) -> Option<&mut (dyn AsyncRead + Unpin + Send)> {
            None
        }
    }

    #[tokio::test]
    async fn drain_tolerates_a_missing_body() {
        drain_body(&mut BodylessResponse).await;
    }
}
