//! Retry classification: deciding what to do with a completed attempt.
//!
//! After every attempt the executor asks a [`CheckRetry`] policy for a
//! [`Verdict`]. The default policy retries transport errors and server-side
//! status codes and halts on everything else; callers can swap in their own
//! policy to, say, honor `Retry-After` semantics or treat specific transport
//! errors as permanent.

use crate::cancel::CancelToken;
use crate::response::Response;
use std::sync::Arc;

/// What to do with the outcome of one attempt.
#[derive(Debug)]
pub enum Verdict<E> {
    /// The outcome is transient; retry if budget remains.
    Retry,
    /// The outcome is conclusive; deliver it to the caller as-is.
    Halt,
    /// Stop immediately and surface this error instead of the raw outcome.
    Fail(E),
    /// The logical call was cancelled; stop without consuming the outcome.
    Cancel,
}

impl<E> Verdict<E> {
    pub fn is_retry(&self) -> bool {
        matches!(self, Verdict::Retry)
    }
}

/// Policy mapping an attempt outcome to a [`Verdict`].
///
/// Receives the call's cancellation token and a borrowed view of the outcome;
/// the executor keeps ownership so a halted response can still be delivered.
pub type CheckRetry<R, E> =
    Arc<dyn Fn(&CancelToken, Result<&R, &E>) -> Verdict<E> + Send + Sync>;

/// Default classification:
///
/// - cancelled call: [`Verdict::Cancel`], regardless of the outcome
/// - transport error: [`Verdict::Retry`]
/// - status `0` (no usable status) or `500..=599` except `501 Not
///   Implemented`: [`Verdict::Retry`]
/// - anything else, 4xx included: [`Verdict::Halt`]
pub fn default_check_retry<R: Response, E>(
    cancel: &CancelToken,
    outcome: Result<&R, &E>,
) -> Verdict<E> {
    if cancel.is_cancelled() {
        return Verdict::Cancel;
    }
    match outcome {
        Err(_) => Verdict::Retry,
        Ok(response) => {
            let status = response.status();
            if status == 0 || (500..=599).contains(&status) && status != 501 {
                Verdict::Retry
            } else {
                Verdict::Halt
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncRead;

    struct StatusOnly(u16);

    impl Response for StatusOnly {
        fn status(&self) -> u16 {
            self.0
        }

        fn body(&mut self) -> Option<&mut (dyn AsyncRead + Unpin + Send)> {
            None
        }
    }

    fn classify(status: u16) -> Verdict<std::io::Error> {
        default_check_retry(&CancelToken::new(), Ok(&StatusOnly(status)))
    }

    #[test]
    fn transport_errors_are_retryable() {
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let verdict: Verdict<std::io::Error> =
            default_check_retry::<StatusOnly, _>(&CancelToken::new(), Err(&err));
        assert!(verdict.is_retry());
    }

    #[test]
    fn server_errors_are_retryable_except_not_implemented() {
        assert!(classify(500).is_retry());
        assert!(classify(503).is_retry());
        assert!(classify(599).is_retry());
        assert!(!classify(501).is_retry());
    }

    #[test]
    fn missing_status_is_retryable() {
        assert!(classify(0).is_retry());
    }

    #[test]
    fn success_and_client_errors_halt() {
        assert!(matches!(classify(200), Verdict::Halt));
        assert!(matches!(classify(404), Verdict::Halt));
        assert!(matches!(classify(429), Verdict::Halt));
    }

    #[test]
    fn cancellation_wins_over_any_outcome() {
        let token = CancelToken::new();
        token.cancel();
        let verdict: Verdict<std::io::Error> =
            default_check_retry(&token, Ok(&StatusOnly(200)));
        assert!(matches!(verdict, Verdict::Cancel));
    }
}
