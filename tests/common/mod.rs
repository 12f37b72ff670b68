//! Shared fixtures for integration tests.
#![allow(dead_code)] // not every test binary uses every fixture

use breakwater::{Clock, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Test clock advanced by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now.load(Ordering::SeqCst))
    }
}

/// Response carrying a status and an in-memory body.
#[derive(Debug)]
pub struct FakeResponse {
    status: u16,
    body: std::io::Cursor<Vec<u8>>,
}

impl FakeResponse {
    pub fn new(status: u16) -> Self {
        Self::with_body(status, Vec::new())
    }

    pub fn with_body(status: u16, body: Vec<u8>) -> Self {
        Self { status, body: std::io::Cursor::new(body) }
    }
}

impl Response for FakeResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn body(&mut self) -> Option<&mut (dyn AsyncRead + Unpin + Send)> {
        Some(&mut self.body)
    }
}

pub fn transport_err(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionReset, message.to_string())
}
