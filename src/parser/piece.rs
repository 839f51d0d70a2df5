//! Parser output: chunk pieces and the head they share.

use std::sync::Arc;

use bytes::Bytes;

use crate::message::{
    ByteRange,
    Continuation,
    Headers,
    Message,
    MessageId,
    MessageKind,
    Method,
    TransactionId,
};

/// Outcome of a successful [`MessageParser::parse`](super::MessageParser::parse) call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStatus {
    /// All bytes were consumed without completing anything.
    NeedMoreData,
    /// A non-terminal piece of an interruptible request is ready.
    PiecePart,
    /// The end-line was found; the terminal piece is ready.
    Done,
}

/// Position of a piece within the logical message it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceKind {
    /// First piece; more follow.
    Head,
    /// Neither first nor last.
    BodyOnly,
    /// Last piece of a message that was delivered in several.
    Tail,
    /// The whole chunk in one piece.
    Complete,
}

impl PieceKind {
    /// Whether this piece carries the start of the chunk body.
    #[must_use]
    pub const fn is_first(self) -> bool { matches!(self, Self::Head | Self::Complete) }

    /// Whether this piece ends the chunk.
    #[must_use]
    pub const fn is_terminal(self) -> bool { matches!(self, Self::Tail | Self::Complete) }
}

/// Start line of a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartLine {
    /// `MSRP <tid> <METHOD>`
    Request(Method),
    /// `MSRP <tid> <code> [reason]`
    Response {
        /// Status code.
        code: u16,
        /// Reason phrase.
        reason: Option<String>,
    },
}

/// Start line and headers shared by every piece of one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceHead {
    /// Transaction identifier on the start line.
    pub transaction_id: TransactionId,
    /// Parsed start line.
    pub start_line: StartLine,
    /// Header block.
    pub headers: Headers,
    /// Whether the request had no `Byte-Range` and `1-*/*` was assumed.
    pub byte_range_defaulted: bool,
}

impl PieceHead {
    /// Start-line classification.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match &self.start_line {
            StartLine::Request(Method::Report) => MessageKind::Report,
            StartLine::Request(_) => MessageKind::Request,
            StartLine::Response { .. } => MessageKind::Response,
        }
    }

    /// Effective byte range.
    #[must_use]
    pub fn byte_range(&self) -> ByteRange { self.headers.byte_range.unwrap_or_default() }

    /// `Message-ID`, absent on responses.
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> { self.headers.message_id.as_ref() }

    /// Whether the chunk may be cut short by its sender.
    #[must_use]
    pub fn is_interruptible(&self) -> bool {
        self.kind() == MessageKind::Request && self.byte_range().is_open_ended()
    }

    pub(crate) fn into_message(self, body: Bytes, continuation: Continuation) -> Message {
        use crate::message::{Report, Request, Response};
        match self.start_line {
            StartLine::Request(Method::Report) => Message::Report(Report {
                transaction_id: self.transaction_id,
                headers: self.headers,
                body,
            }),
            StartLine::Request(method) => Message::Request(Request {
                transaction_id: self.transaction_id,
                method,
                headers: self.headers,
                body,
                continuation,
            }),
            StartLine::Response { code, reason } => Message::Response(Response {
                transaction_id: self.transaction_id,
                code,
                reason,
                headers: self.headers,
            }),
        }
    }
}

/// One physically received fragment of a chunk.
///
/// Pieces of the same chunk share one [`PieceHead`]. Only the terminal piece
/// carries an assembled [`Message`]; its body holds the bytes of that piece
/// alone, so a chunk delivered as a single [`PieceKind::Complete`] piece
/// yields the whole body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkPiece {
    pub(crate) kind: PieceKind,
    pub(crate) head: Arc<PieceHead>,
    pub(crate) continuation: Continuation,
    pub(crate) body: Bytes,
    pub(crate) offset: u64,
    pub(crate) content_offset: usize,
    pub(crate) wire_size: usize,
    pub(crate) message: Option<Message>,
}

impl ChunkPiece {
    /// Position within the chunk.
    #[must_use]
    pub fn kind(&self) -> PieceKind { self.kind }

    /// Shared start line and headers.
    #[must_use]
    pub fn head(&self) -> &PieceHead { &self.head }

    /// Transaction identifier.
    #[must_use]
    pub fn transaction_id(&self) -> &TransactionId { &self.head.transaction_id }

    /// `Message-ID`, absent on responses.
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> { self.head.message_id() }

    /// Byte range of the chunk this piece belongs to.
    #[must_use]
    pub fn byte_range(&self) -> ByteRange { self.head.byte_range() }

    /// `More` on every piece but the terminal one.
    #[must_use]
    pub fn continuation(&self) -> Continuation { self.continuation }

    /// Body bytes carried by this piece.
    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    /// Zero-based offset of the first body byte within the logical message.
    #[must_use]
    pub fn offset(&self) -> u64 { self.offset }

    /// Offset inside [`ChunkPiece::body`] where application content starts,
    /// after an embedded CPIM header block.
    #[must_use]
    pub fn content_offset(&self) -> usize { self.content_offset }

    /// Application content: the body without the CPIM header block.
    #[must_use]
    pub fn content(&self) -> Bytes { self.body.slice(self.content_offset.min(self.body.len())..) }

    /// Wire bytes consumed to produce this piece.
    #[must_use]
    pub fn wire_size(&self) -> usize { self.wire_size }

    /// Assembled unit, present on terminal pieces.
    #[must_use]
    pub fn message(&self) -> Option<&Message> { self.message.as_ref() }

    /// Take the assembled unit.
    #[must_use]
    pub fn into_message(self) -> Option<Message> { self.message }
}
