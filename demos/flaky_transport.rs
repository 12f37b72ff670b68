//! Decorating a flaky fake transport.
//!
//! Run with: `cargo run --example flaky_transport`

use breakwater::{
    Backoff, BodySource, CancelToken, Executor, ReplayableBody, Response,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Response from the fake transport.
struct Reply {
    status: u16,
    body: std::io::Cursor<Vec<u8>>,
}

impl Response for Reply {
    fn status(&self) -> u16 {
        self.status
    }

    fn body(&mut self) -> Option<&mut (dyn AsyncRead + Unpin + Send)> {
        Some(&mut self.body)
    }
}

/// A transport that drops the first two requests, then answers.
struct FlakyTransport {
    calls: AtomicUsize,
}

impl FlakyTransport {
    async fn send(&self, payload: Vec<u8>) -> Result<Reply, std::io::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match call {
            0 => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            1 => Ok(Reply { status: 503, body: std::io::Cursor::new(b"try later".to_vec()) }),
            _ => {
                let body = format!("echo: {}", String::from_utf8_lossy(&payload));
                Ok(Reply { status: 200, body: std::io::Cursor::new(body.into_bytes()) })
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let transport = Arc::new(FlakyTransport { calls: AtomicUsize::new(0) });
    let body = ReplayableBody::new(BodySource::Buffer(b"hello, breakwater".to_vec())).await?;

    let executor = Executor::builder()
        .max_retries(4)
        .min_wait(Duration::from_millis(100))
        .max_wait(Duration::from_secs(2))
        .backoff(Backoff::Exponential)
        .build()?;

    let mut response = executor
        .execute(&CancelToken::new(), || {
            let transport = Arc::clone(&transport);
            let body = body.clone();
            async move {
                let mut reader = body
                    .reader()
                    .await
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                let mut payload = Vec::new();
                reader.read_to_end(&mut payload).await?;
                transport.send(payload).await
            }
        })
        .await?;

    let mut answer = String::new();
    if let Some(stream) = response.body() {
        stream.read_to_string(&mut answer).await?;
    }
    println!("status {} after retries: {}", response.status(), answer);
    Ok(())
}
