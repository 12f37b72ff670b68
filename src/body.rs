//! Replayable request bodies.
//!
//! Retrying a request means resending its payload, so every body must be
//! readable more than once. [`ReplayableBody::new`] resolves an arbitrary
//! source into one of a closed set of replayable representations exactly once,
//! at construction:
//!
//! - [`BodySource::Buffer`]: trivially replayable; every reader wraps the same
//!   bytes.
//! - [`BodySource::Seekable`]: the same stream is rewound to the start for
//!   every replay; its length is discovered by seeking once at construction.
//! - [`BodySource::Stream`]: a one-shot reader is drained into an owned buffer
//!   up front, bounding memory to the body size and making even a
//!   single-read source retry-safe.
//! - [`BodySource::Unsupported`]: fails construction with a descriptive error.
//!   This is a caller programming error, never a transient fault, and is
//!   reported before any attempt is issued.

use std::io::SeekFrom;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, ReadBuf};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Stream that can be both read and rewound.
pub trait SeekSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> SeekSource for T {}

/// The kinds of payload source a request body may be built from.
pub enum BodySource {
    /// Fixed in-memory bytes.
    Buffer(Vec<u8>),
    /// A rewindable stream, e.g. an open file.
    Seekable(Box<dyn SeekSource>),
    /// A stream that can only be read once; buffered fully at construction.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    /// A source the caller could not express as any replayable kind. The tag
    /// names the offending type for the error message.
    Unsupported(&'static str),
}

impl std::fmt::Debug for BodySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodySource::Buffer(b) => f.debug_tuple("Buffer").field(&b.len()).finish(),
            BodySource::Seekable(_) => f.write_str("Seekable(..)"),
            BodySource::Stream(_) => f.write_str("Stream(..)"),
            BodySource::Unsupported(kind) => f.debug_tuple("Unsupported").field(kind).finish(),
        }
    }
}

/// Errors produced while turning a [`BodySource`] into a [`ReplayableBody`].
#[derive(Debug, Error)]
pub enum BodyError {
    /// The source kind cannot be replayed. Permanent; never retried.
    #[error("cannot build a replayable body from a {kind} source")]
    Unsupported { kind: &'static str },
    /// Reading or rewinding the source failed.
    #[error("failed to prepare request body: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
enum Repr {
    Buffer(Arc<[u8]>),
    // The async mutex serializes replays of the single underlying stream; the
    // retry loop is sequential per logical call, so contention only arises if
    // a caller shares one body across calls.
    Seekable(Arc<Mutex<Box<dyn SeekSource>>>),
}

/// A request body that can be read any number of times.
///
/// Construction resolves the source once; [`reader`](Self::reader) then yields
/// a fresh, independently-readable stream per invocation, each producing
/// byte-identical content.
#[derive(Clone)]
pub struct ReplayableBody {
    repr: Repr,
    content_length: u64,
}

impl std::fmt::Debug for ReplayableBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.repr {
            Repr::Buffer(_) => "buffer",
            Repr::Seekable(_) => "seekable",
        };
        f.debug_struct("ReplayableBody")
            .field("kind", &kind)
            .field("content_length", &self.content_length)
            .finish()
    }
}

impl ReplayableBody {
    /// Resolve `source` into a replayable representation.
    pub async fn new(source: BodySource) -> Result<Self, BodyError> {
        match source {
            BodySource::Buffer(bytes) => Ok(Self::from_bytes(bytes)),
            BodySource::Seekable(mut stream) => {
                let content_length = stream.seek(SeekFrom::End(0)).await?;
                stream.seek(SeekFrom::Start(0)).await?;
                Ok(Self {
                    repr: Repr::Seekable(Arc::new(Mutex::new(stream))),
                    content_length,
                })
            }
            BodySource::Stream(mut stream) => {
                let mut buffered = Vec::new();
                stream.read_to_end(&mut buffered).await?;
                Ok(Self::from_bytes(buffered))
            }
            BodySource::Unsupported(kind) => Err(BodyError::Unsupported { kind }),
        }
    }

    fn from_bytes(bytes: Vec<u8>) -> Self {
        let content_length = bytes.len() as u64;
        Self { repr: Repr::Buffer(Arc::from(bytes)), content_length }
    }

    /// Total body length in bytes; always known after construction.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Open a fresh reader over the full body.
    ///
    /// For a seekable source this rewinds the shared underlying stream and
    /// holds it exclusively until the returned reader is dropped.
    pub async fn reader(&self) -> Result<BodyReader, BodyError> {
        match &self.repr {
            Repr::Buffer(bytes) => {
                Ok(BodyReader(ReaderRepr::Buffer(std::io::Cursor::new(Arc::clone(bytes)))))
            }
            Repr::Seekable(stream) => {
                let mut guard = Arc::clone(stream).lock_owned().await;
                guard.seek(SeekFrom::Start(0)).await?;
                Ok(BodyReader(ReaderRepr::Seekable(guard)))
            }
        }
    }
}

enum ReaderRepr {
    Buffer(std::io::Cursor<Arc<[u8]>>),
    Seekable(OwnedMutexGuard<Box<dyn SeekSource>>),
}

/// A single read pass over a [`ReplayableBody`].
pub struct BodyReader(ReaderRepr);

impl AsyncRead for BodyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().0 {
            ReaderRepr::Buffer(cursor) => Pin::new(cursor).poll_read(cx, buf),
            ReaderRepr::Seekable(guard) => Pin::new(&mut **guard).poll_read(cx, buf),
        }
    }
}
