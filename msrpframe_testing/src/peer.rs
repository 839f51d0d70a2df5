//! A scripted far end for sessions running over an in-memory pipe.

use bytes::BytesMut;
use futures::StreamExt;
use msrpframe::{
    Message,
    MsrpCodec,
    Response,
    Session,
    SessionConfig,
    SessionContext,
    SessionHandle,
    WriterTransport,
    marshal::encode_message,
};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::codec::FramedRead;

use crate::listener::{EventStream, RecordingListener};

/// URI of the session under test.
pub const LOCAL_PATH: &str = "msrp://a.example.com:7777/local;tcp";
/// URI of the scripted peer.
pub const REMOTE_PATH: &str = "msrp://b.example.com:8888/remote;tcp";

/// The far end of a duplex pipe, speaking raw protocol units.
pub struct Peer {
    reader: FramedRead<ReadHalf<DuplexStream>, MsrpCodec>,
    writer: WriteHalf<DuplexStream>,
}

impl Peer {
    /// Wrap the peer's end of a pipe.
    #[must_use]
    pub fn new(stream: DuplexStream) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(read, MsrpCodec::new()),
            writer: write,
        }
    }

    /// Read pieces until one completes a unit and return that unit.
    ///
    /// # Panics
    ///
    /// Panics if the stream ends or carries invalid bytes.
    pub async fn next_message(&mut self) -> Message {
        loop {
            let piece = self
                .reader
                .next()
                .await
                .expect("session closed the stream")
                .expect("valid unit");
            if piece.kind().is_terminal() {
                return piece.into_message().expect("terminal piece carries the unit");
            }
        }
    }

    /// Write raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if the pipe is closed.
    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write to session");
    }

    /// Marshal and write `message`.
    pub async fn send(&mut self, message: impl Into<Message>) {
        let mut wire = BytesMut::new();
        encode_message(&message.into(), &mut wire);
        self.write_raw(&wire).await;
    }

    /// Answer `request` with `code`.
    pub async fn respond(&mut self, request: &Message, code: u16) {
        let response = Response::to_request(request.transaction_id(), request.headers(), code);
        self.send(response).await;
    }
}

/// A session under test with its peer and listener events.
pub struct SessionPair {
    /// The scripted far end.
    pub peer: Peer,
    /// Handle to the session.
    pub handle: SessionHandle,
    /// Listener callbacks.
    pub events: EventStream,
}

/// Spawn a session between [`LOCAL_PATH`] and [`REMOTE_PATH`].
///
/// An `active` session sends the handshake; call [`SessionPair::bind`] to
/// answer it.
///
/// # Panics
///
/// Panics if `config` is invalid.
#[must_use]
pub fn open_session(config: SessionConfig, active: bool) -> SessionPair {
    let (ours, theirs) = tokio::io::duplex(64 * 1024);
    let (read, write) = tokio::io::split(ours);
    let (transport, _writer) = WriterTransport::spawn(write);
    let (listener, events) = RecordingListener::channel();
    let session = Session::new(config).expect("valid session config");
    let ctx = SessionContext::new(LOCAL_PATH, REMOTE_PATH);
    let handle = if active {
        session.connect(transport, read, ctx, listener)
    } else {
        session.accept(transport, read, ctx, listener)
    };
    SessionPair {
        peer: Peer::new(theirs),
        handle,
        events,
    }
}

impl SessionPair {
    /// Accept the handshake of an active session and wait for it to bind.
    ///
    /// # Panics
    ///
    /// Panics if the session reports anything else first.
    pub async fn bind(&mut self) {
        let handshake = self.peer.next_message().await;
        assert!(handshake.body().is_empty(), "handshake carries no body");
        self.peer.respond(&handshake, 200).await;
        assert_eq!(self.events.next().await, crate::SessionEvent::Bound);
    }
}
