//! Observable states of the outbound transmission state machine.

use std::fmt;

/// Phase of an [`OutboundFsm`](super::OutboundFsm).
///
/// ```text
/// Init ──handshake──▶ AwaitingHandshakeResponse ──2xx──▶ Idle
///   └──────────────────bind──────────────────────────────▲
/// Idle ⇄ SendingChunk ⇄ SendingChunkAwaitingWrite ⇄ AwaitingResponse
/// any ──close──▶ Terminated
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutboundState {
    /// Not yet bound; sends are queued but nothing is written.
    Init,
    /// The handshake request was written; waiting for its response.
    AwaitingHandshakeResponse,
    /// Nothing in flight and nothing awaited.
    Idle,
    /// A chunk is open and the next physical write has not been issued.
    SendingChunk,
    /// A physical write is in flight.
    SendingChunkAwaitingWrite,
    /// The last chunk was closed and its response is outstanding.
    AwaitingResponse,
    /// Closed; every signal but `Close` is rejected.
    Terminated,
}

impl fmt::Display for OutboundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}
