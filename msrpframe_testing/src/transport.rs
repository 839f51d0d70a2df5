//! A [`Transport`] that keeps every write for inspection.

use std::{
    io,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use msrpframe::{ChunkPiece, transport::Transport};

use crate::wire::decode_fragments;

#[derive(Debug, Default)]
struct Inner {
    writes: Vec<Bytes>,
    fail_after: Option<usize>,
    shut_down: bool,
}

/// Records writes instead of sending them.
///
/// Clones share the same record, so a test can hand one clone to a session
/// and inspect the other.
#[derive(Clone, Debug, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingTransport {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Fail every write after the first `writes` succeed.
    #[must_use]
    pub fn failing_after(writes: usize) -> Self {
        let transport = Self::new();
        transport.lock().fail_after = Some(writes);
        transport
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every successful write, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<Bytes> { self.lock().writes.clone() }

    /// All written bytes joined together.
    #[must_use]
    pub fn wire(&self) -> Vec<u8> {
        self.lock()
            .writes
            .iter()
            .fold(BytesMut::new(), |mut acc, write| {
                acc.extend_from_slice(write);
                acc
            })
            .to_vec()
    }

    /// The written stream decoded into pieces.
    ///
    /// # Panics
    ///
    /// Panics if the written bytes are not valid protocol units.
    #[must_use]
    pub fn pieces(&self) -> Vec<ChunkPiece> { decode_fragments(&[self.wire()]) }

    /// Whether the session released the transport.
    #[must_use]
    pub fn is_shut_down(&self) -> bool { self.lock().shut_down }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn write(&self, bytes: Bytes) -> io::Result<()> {
        let mut inner = self.lock();
        if inner
            .fail_after
            .is_some_and(|limit| inner.writes.len() >= limit)
        {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected failure"));
        }
        inner.writes.push(bytes);
        Ok(())
    }

    async fn shutdown(&self) { self.lock().shut_down = true; }
}
