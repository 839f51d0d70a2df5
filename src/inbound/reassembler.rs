//! Inbound helper that stitches chunk pieces back into complete messages.
//!
//! [`Reassembler`] mirrors the outbound chunker by collecting `SEND` bodies
//! keyed by [`MessageId`], placing every piece at its byte-range offset. It
//! guards against unbounded allocation with a configurable cap and purges
//! stale partial messages after a fixed timeout. Nothing here touches a
//! socket, so tests drive it directly with parsed pieces.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use bytes::Bytes;

use super::{PieceSink, ReassemblyError};
use crate::{
    message::{Continuation, Headers, MessageId},
    parser::ChunkPiece,
};

#[derive(Debug)]
struct PartialMessage {
    headers: Headers,
    content_offset: usize,
    buffer: Vec<u8>,
    // Received byte intervals, sorted, disjoint and half-open.
    covered: Vec<(u64, u64)>,
    total: Option<u64>,
    finished: bool,
    started_at: Instant,
}

impl PartialMessage {
    fn new(piece: &ChunkPiece, started_at: Instant) -> Self {
        Self {
            headers: piece.head().headers.clone(),
            content_offset: 0,
            buffer: Vec::new(),
            covered: Vec::new(),
            total: None,
            finished: false,
            started_at,
        }
    }

    fn place(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset..end].copy_from_slice(bytes);
        self.cover(offset as u64, end as u64);
    }

    fn cover(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let mut merged = (start, end);
        self.covered.retain(|&(from, to)| {
            if to < merged.0 || from > merged.1 {
                return true;
            }
            merged = (merged.0.min(from), merged.1.max(to));
            false
        });
        let at = self.covered.partition_point(|&(from, _)| from < merged.0);
        self.covered.insert(at, merged);
    }

    /// Whether every byte of `[0, len)` has arrived.
    fn covers(&self, len: u64) -> bool {
        len == 0
            || self
                .covered
                .first()
                .is_some_and(|&(start, end)| start == 0 && end >= len)
    }

    /// A `$` chunk was seen and the body has no gaps up to the total, or up
    /// to the furthest byte seen when the total is unknown.
    fn is_complete(&self) -> bool {
        self.finished && self.covers(self.total.unwrap_or(self.buffer.len() as u64))
    }
}

/// A fully reassembled `SEND`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReassembledMessage {
    message_id: MessageId,
    headers: Headers,
    content_offset: usize,
    body: Bytes,
}

impl ReassembledMessage {
    /// Identifier shared by the chunks that formed this message.
    #[must_use]
    pub fn message_id(&self) -> &MessageId { &self.message_id }

    /// Headers of the first chunk, including any CPIM block.
    #[must_use]
    pub fn headers(&self) -> &Headers { &self.headers }

    /// `Content-Type` of the first chunk.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> { self.headers.content_type.as_deref() }

    /// The raw body, CPIM block included.
    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    /// The body after any CPIM block.
    #[must_use]
    pub fn content(&self) -> Bytes { self.body.slice(self.content_offset.min(self.body.len())..) }

    /// Consume the message, returning the raw body.
    #[must_use]
    pub fn into_body(self) -> Bytes { self.body }
}

/// Outcome of feeding one piece.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reassembly {
    /// More pieces are required.
    Incomplete,
    /// The piece completed the message.
    Complete(ReassembledMessage),
    /// The sender aborted the message; its bytes were dropped.
    Aborted(MessageId),
}

/// Stateful `SEND` reassembler with timeout-based eviction.
#[derive(Debug)]
pub struct Reassembler {
    max_message_size: NonZeroUsize,
    timeout: Duration,
    buffers: HashMap<MessageId, PartialMessage>,
}

impl Reassembler {
    /// Create a reassembler that caps every message at `max_message_size`.
    #[must_use]
    pub fn new(max_message_size: NonZeroUsize, timeout: Duration) -> Self {
        Self {
            max_message_size,
            timeout,
            buffers: HashMap::new(),
        }
    }

    /// Process a piece using the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError`] when the piece has no message id or would
    /// push the message beyond the configured cap. The partial message is
    /// discarded.
    pub fn push(&mut self, piece: &ChunkPiece) -> Result<Reassembly, ReassemblyError> {
        self.push_at(piece, Instant::now())
    }

    /// Process a piece using an explicit clock reading.
    ///
    /// # Errors
    ///
    /// As for [`push`](Self::push).
    pub fn push_at(
        &mut self,
        piece: &ChunkPiece,
        now: Instant,
    ) -> Result<Reassembly, ReassemblyError> {
        self.purge_expired_at(now);
        let message_id = piece
            .message_id()
            .cloned()
            .ok_or(ReassemblyError::MissingMessageId)?;

        if piece.kind().is_terminal() && piece.continuation() == Continuation::Aborted {
            self.buffers.remove(&message_id);
            return Ok(Reassembly::Aborted(message_id));
        }

        let limit = self.max_message_size;
        let declared = piece.byte_range().total.unwrap_or(0);
        let attempted = (piece.offset() + piece.body().len() as u64).max(declared);
        if attempted > limit.get() as u64 {
            self.buffers.remove(&message_id);
            return Err(ReassemblyError::MessageTooLarge {
                message_id,
                attempted,
                limit,
            });
        }

        let partial = self
            .buffers
            .entry(message_id.clone())
            .or_insert_with(|| PartialMessage::new(piece, now));
        // Bounded by the size check above.
        let offset = usize::try_from(piece.offset()).unwrap_or(usize::MAX);
        partial.place(offset, piece.body());
        if piece.offset() == 0 {
            partial.content_offset = piece.content_offset();
        }
        if let Some(total) = piece.byte_range().total {
            partial.total = Some(total);
        }
        if piece.kind().is_terminal() && piece.continuation() == Continuation::Done {
            partial.finished = true;
        }

        if partial.is_complete() {
            let Some(partial) = self.buffers.remove(&message_id) else {
                return Ok(Reassembly::Incomplete);
            };
            return Ok(Reassembly::Complete(ReassembledMessage {
                message_id,
                headers: partial.headers,
                content_offset: partial.content_offset,
                body: Bytes::from(partial.buffer),
            }));
        }
        Ok(Reassembly::Incomplete)
    }

    /// Remove partial messages that exceeded the timeout.
    ///
    /// Returns the identifiers of messages that were evicted.
    pub fn purge_expired(&mut self) -> Vec<MessageId> { self.purge_expired_at(Instant::now()) }

    /// Remove partial messages that exceeded the timeout using an explicit
    /// clock reading.
    ///
    /// Returns the identifiers of messages that were evicted.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<MessageId> {
        let mut evicted = Vec::new();
        let timeout = self.timeout;
        self.buffers.retain(|message_id, partial| {
            let expired = now.saturating_duration_since(partial.started_at) >= timeout;
            if expired {
                evicted.push(message_id.clone());
            }
            !expired
        });
        evicted
    }

    /// Number of partial messages currently buffered.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.buffers.len() }
}

impl PieceSink for Reassembler {
    fn accept(&mut self, piece: &ChunkPiece) -> Result<Reassembly, ReassemblyError> { self.push(piece) }
}
