//! Physical write side of a connection.
//!
//! The outbound state machine issues one write at a time and waits for its
//! completion signal. [`Transport`] is the seam between that machine and the
//! socket; [`WriterTransport`] adapts any tokio [`AsyncWrite`] by moving it
//! into a dedicated writer task.

use std::{io, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

/// Destination for outbound bytes.
///
/// Implementations must complete writes in the order they were issued.
/// The session never issues a second write before the first completes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write `bytes` in full.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream. The session
    /// closes on the first failure and never retries.
    async fn write(&self, bytes: Bytes) -> io::Result<()>;

    /// Release the underlying stream. The default does nothing.
    async fn shutdown(&self) {}
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn write(&self, bytes: Bytes) -> io::Result<()> { (**self).write(bytes).await }

    async fn shutdown(&self) { (**self).shutdown().await; }
}

type WriteRequest = (Bytes, oneshot::Sender<io::Result<()>>);

/// [`Transport`] backed by a task that owns an [`AsyncWrite`].
#[derive(Clone, Debug)]
pub struct WriterTransport {
    tx: mpsc::Sender<WriteRequest>,
}

impl WriterTransport {
    /// Move `writer` into a new task and return the transport feeding it.
    ///
    /// The task flushes after every write and shuts the writer down once
    /// every transport clone is dropped or a write fails.
    pub fn spawn<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(write_loop(writer, rx));
        (Self { tx }, task)
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<WriteRequest>)
where
    W: AsyncWrite + Unpin,
{
    while let Some((bytes, reply)) = rx.recv().await {
        let result = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;
        let failed = result.is_err();
        let _ = reply.send(result);
        if failed {
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!("writer shutdown failed: error={e}");
    }
}

fn closed() -> io::Error { io::Error::new(io::ErrorKind::BrokenPipe, "writer task has stopped") }

#[async_trait]
impl Transport for WriterTransport {
    async fn write(&self, bytes: Bytes) -> io::Result<()> {
        let (reply, done) = oneshot::channel();
        self.tx.send((bytes, reply)).await.map_err(|_| closed())?;
        done.await.map_err(|_| closed())?
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn writes_reach_the_stream_in_order() {
        let (client, mut server) = tokio::io::duplex(64);
        let (transport, task) = WriterTransport::spawn(client);
        transport.write(Bytes::from_static(b"one ")).await.expect("first");
        transport.write(Bytes::from_static(b"two")).await.expect("second");
        drop(transport);
        task.await.expect("writer task");
        let mut out = String::new();
        server.read_to_string(&mut out).await.expect("read");
        assert_eq!(out, "one two");
    }

    #[tokio::test]
    async fn writes_fail_once_the_peer_is_gone() {
        let (client, server) = tokio::io::duplex(8);
        drop(server);
        let (transport, _task) = WriterTransport::spawn(client);
        let err = transport
            .write(Bytes::from_static(b"lost"))
            .await
            .expect_err("peer closed");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = transport
            .write(Bytes::from_static(b"again"))
            .await
            .expect_err("task stopped");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
