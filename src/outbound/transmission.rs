//! Progress record of one logical request being chunked onto the wire.

use crate::message::{
    ByteRange,
    CorrelationId,
    Headers,
    ReportFlag,
    Request,
    TransactionId,
};

/// The chunk currently open on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct OpenChunk {
    /// Transaction id placed on this chunk's start and end lines.
    pub(super) wire_id: TransactionId,
    /// Body offset at which this chunk ends at the latest.
    pub(super) limit: u64,
}

/// State of a request across its chunks.
///
/// Keyed by a logical transaction id assigned at admission; every chunk goes
/// out under a fresh wire id recorded in `last_wire_id`.
#[derive(Debug)]
pub struct ChunkTransmission {
    correlation: CorrelationId,
    request: Request,
    written: u64,
    pub(super) last_wire_id: Option<TransactionId>,
    /// Wire ids of chunks whose end-line has been written.
    pub(super) closed_chunks: Vec<TransactionId>,
    pub(super) chunk: Option<OpenChunk>,
    /// Success code that arrived before the latest chunk was closed.
    pub(super) early_success: Option<u16>,
    pub(super) aborted: bool,
    pub(super) rejected: bool,
}

impl ChunkTransmission {
    pub(super) fn new(correlation: CorrelationId, request: Request) -> Self {
        Self {
            correlation,
            request,
            written: 0,
            last_wire_id: None,
            closed_chunks: Vec::new(),
            chunk: None,
            early_success: None,
            aborted: false,
            rejected: false,
        }
    }

    /// Handle supplied with the send.
    #[must_use]
    pub fn correlation(&self) -> CorrelationId { self.correlation }

    /// Body bytes already written.
    #[must_use]
    pub fn written(&self) -> u64 { self.written }

    /// Total body length.
    #[must_use]
    pub fn total(&self) -> u64 { self.request.body.len() as u64 }

    /// Body bytes not yet written.
    #[must_use]
    pub fn remaining(&self) -> u64 { self.total() - self.written }

    /// Whether every body byte has been written and the last chunk closed.
    #[must_use]
    pub fn is_finished(&self) -> bool { self.written == self.total() && self.chunk.is_none() }

    /// Whether the peer answers each chunk with a transaction response.
    ///
    /// With `Failure-Report: no` or `partial` the sender never waits.
    #[must_use]
    pub fn expects_response(&self) -> bool {
        matches!(self.request.headers.failure_report, None | Some(ReportFlag::Yes))
    }

    /// Whether any chunk of this request went out under `wire_id`.
    #[must_use]
    pub fn was_sent_under(&self, wire_id: &TransactionId) -> bool {
        self.last_wire_id.as_ref() == Some(wire_id) || self.closed_chunks.contains(wire_id)
    }

    /// Whether `wire_id` names the latest chunk and its end-line is still
    /// outstanding.
    pub(super) fn is_unclosed(&self, wire_id: &TransactionId) -> bool {
        self.last_wire_id.as_ref() == Some(wire_id) && !self.closed_chunks.contains(wire_id)
    }

    /// Borrow `len` body bytes starting at the write cursor and advance it.
    pub(super) fn take(&mut self, len: u64) -> bytes::Bytes {
        let start = usize::try_from(self.written).unwrap_or(usize::MAX);
        let end = usize::try_from(self.written + len).unwrap_or(usize::MAX);
        self.written += len;
        self.request.body.slice(start..end.min(self.request.body.len()))
    }

    /// Header block for a chunk covering `len` bytes from the cursor. An
    /// open-ended chunk carries `*` as its end.
    pub(super) fn chunk_headers(&self, len: Option<u64>) -> Headers {
        let mut headers = self.request.headers.clone();
        let start = self.written + 1;
        headers.byte_range = Some(ByteRange::new(
            start,
            len.map(|len| self.written + len),
            Some(self.total()),
        ));
        if len == Some(0) {
            headers.content_type = None;
            headers.content_disposition = None;
        }
        headers
    }

    pub(super) fn method(&self) -> &crate::message::Method { &self.request.method }
}
