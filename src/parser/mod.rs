//! Resumable message parser.
//!
//! [`MessageParser`] turns an arbitrarily fragmented byte stream into
//! [`ChunkPiece`]s without buffering whole messages. Each call consumes what
//! it can from the caller's buffer, starting at the position where the
//! previous call stopped, and reports one of:
//!
//! - [`ParseStatus::NeedMoreData`]: everything usable was consumed;
//! - [`ParseStatus::PiecePart`]: an interruptible request produced a
//!   non-terminal piece;
//! - [`ParseStatus::Done`]: the end-line was found.
//!
//! Callers own the buffer. After each call they may discard the bytes before
//! [`MessageParser::stopped_at_position`]; if they do, they must call
//! [`MessageParser::reset_buffer_position`] before the next call. Between
//! logical units they call [`MessageParser::reset`], never between pieces of
//! the same unit.

use std::sync::Arc;

use bytes::BytesMut;
use log::debug;

mod body;
pub mod error;
mod line;
pub mod piece;
mod stage;

use body::{EndLineScanner, Scan};
pub use error::ParseError;
pub use line::{END_LINE_PREAMBLE, PROTOCOL_PREFIX};
use line::{HeaderLine, LineStep, StartStep, read_header_line, read_start_line};
pub use piece::{ChunkPiece, ParseStatus, PieceHead, PieceKind, StartLine};
use stage::{CpimSection, Stage};

use crate::{
    message::{Continuation, CpimBlock, Headers, MessageKind},
    tokenizer::{Input, Lexed, Pattern, Tokenizer},
};

/// Default limit for the start line plus header block, CPIM block included.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 16 * 1024;

/// Resumable parser for one connection's inbound byte stream.
#[derive(Debug)]
pub struct MessageParser {
    tokenizer: Tokenizer,
    stage: Stage,
    start_step: StartStep,
    line_step: LineStep,
    pos: usize,
    mark: usize,
    max_header_size: usize,
    header_bytes: usize,
    wire_bytes: usize,
    draft: Option<PieceHead>,
    cpim: Option<CpimBlock>,
    head: Option<Arc<PieceHead>>,
    scanner: Option<EndLineScanner>,
    body: BytesMut,
    emitted: u64,
    first_piece: bool,
    content_offset: usize,
    piece: Option<ChunkPiece>,
}

impl Default for MessageParser {
    fn default() -> Self { Self::new() }
}

enum Step {
    Continue,
    Suspended,
}

impl MessageParser {
    /// Create a parser with the default header size limit.
    #[must_use]
    pub fn new() -> Self { Self::with_max_header_size(DEFAULT_MAX_HEADER_SIZE) }

    /// Create a parser that rejects header blocks larger than `limit` bytes.
    #[must_use]
    pub fn with_max_header_size(limit: usize) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            stage: Stage::StartLine,
            start_step: StartStep::default(),
            line_step: LineStep::default(),
            pos: 0,
            mark: 0,
            max_header_size: limit,
            header_bytes: 0,
            wire_bytes: 0,
            draft: None,
            cpim: None,
            head: None,
            scanner: None,
            body: BytesMut::new(),
            emitted: 0,
            first_piece: true,
            content_offset: 0,
            piece: None,
        }
    }

    /// Prepare for the next logical unit. The buffer position is kept.
    pub fn reset(&mut self) {
        let pos = self.pos;
        *self = Self::with_max_header_size(self.max_header_size);
        self.pos = pos;
    }

    /// Offset in the caller's buffer of the first byte not yet consumed.
    #[must_use]
    pub fn stopped_at_position(&self) -> usize { self.pos }

    /// Notify the parser that the caller dropped every byte before
    /// [`stopped_at_position`](Self::stopped_at_position).
    pub fn reset_buffer_position(&mut self) { self.pos = 0; }

    /// Take the piece produced by the last call that returned
    /// [`ParseStatus::PiecePart`] or [`ParseStatus::Done`].
    pub fn take_piece(&mut self) -> Option<ChunkPiece> { self.piece.take() }

    /// Whether a unit is partially parsed.
    #[must_use]
    pub fn is_mid_message(&self) -> bool {
        !matches!(self.stage, Stage::StartLine | Stage::Done | Stage::Failed)
            || self.tokenizer.is_mid_token()
    }

    /// Consume bytes from `buf`, starting at the stopped-at position.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for any protocol violation; the parser is
    /// halted afterwards and later calls return [`ParseError::Halted`].
    /// Calling again after [`ParseStatus::Done`] without [`reset`](Self::reset)
    /// returns [`ParseError::AwaitingReset`].
    pub fn parse(&mut self, buf: &[u8]) -> Result<ParseStatus, ParseError> {
        match self.stage {
            Stage::Failed => return Err(ParseError::Halted),
            Stage::Done => return Err(ParseError::AwaitingReset),
            _ => {}
        }
        let mut input = Input::new(buf, self.pos);
        self.mark = input.position();
        let result = self.drive(&mut input);
        self.pos = input.position();
        self.wire_bytes += self.pos - self.mark;
        if let Err(err) = &result {
            debug!("message parser halted: {err}");
            self.stage = Stage::Failed;
        }
        result
    }

    fn drive(&mut self, input: &mut Input<'_>) -> Result<ParseStatus, ParseError> {
        loop {
            let before = input.position();
            let step = match self.stage {
                Stage::StartLine => self.start_line(input)?,
                Stage::Headers => self.header_line(input)?,
                Stage::Cpim(section) => self.cpim_line(input, section)?,
                Stage::Body => return self.body(input),
                Stage::Done | Stage::Failed => return Ok(ParseStatus::NeedMoreData),
            };
            self.header_bytes += input.position() - before;
            if self.header_bytes > self.max_header_size {
                return Err(ParseError::HeaderTooLarge {
                    limit: self.max_header_size,
                });
            }
            if let Step::Suspended = step {
                return Ok(ParseStatus::NeedMoreData);
            }
        }
    }

    fn start_line(&mut self, input: &mut Input<'_>) -> Result<Step, ParseError> {
        let Lexed::Ready((transaction_id, start_line)) =
            read_start_line(&mut self.tokenizer, &mut self.start_step, input)?
        else {
            return Ok(Step::Suspended);
        };
        self.draft = Some(PieceHead {
            transaction_id,
            start_line,
            headers: Headers::default(),
            byte_range_defaulted: false,
        });
        self.stage = Stage::Headers;
        Ok(Step::Continue)
    }

    fn header_line(&mut self, input: &mut Input<'_>) -> Result<Step, ParseError> {
        let line = read_header_line(
            &mut self.tokenizer,
            &mut self.line_step,
            input,
            Pattern::header_value(),
            true,
        )?;
        let Some(draft) = self.draft.as_mut() else {
            return Err(ParseError::Halted);
        };
        match line {
            Lexed::Suspended => return Ok(Step::Suspended),
            Lexed::Ready(HeaderLine::Field(name, value)) => draft.headers.insert(&name, &value)?,
            Lexed::Ready(HeaderLine::Blank) => {
                validate(draft)?;
                if draft.kind() == MessageKind::Request
                    && draft.headers.is_cpim()
                    && draft.byte_range().is_first()
                {
                    self.cpim = Some(CpimBlock::default());
                    self.stage = Stage::Cpim(CpimSection::Message);
                } else {
                    self.enter_body(false);
                }
            }
            Lexed::Ready(HeaderLine::EndLinePreamble) => {
                validate(draft)?;
                self.enter_body(true);
            }
        }
        Ok(Step::Continue)
    }

    /// The CPIM block is consumed as header lines and copied verbatim into
    /// the body, so end-line detection only starts after it.
    fn cpim_line(&mut self, input: &mut Input<'_>, section: CpimSection) -> Result<Step, ParseError> {
        let before = input.position();
        let line = read_header_line(
            &mut self.tokenizer,
            &mut self.line_step,
            input,
            Pattern::cpim_value(),
            false,
        );
        self.body.extend_from_slice(input.consumed_since(before));
        let Some(cpim) = self.cpim.as_mut() else {
            return Err(ParseError::Halted);
        };
        match line? {
            Lexed::Suspended => return Ok(Step::Suspended),
            Lexed::Ready(HeaderLine::Field(name, value)) => match section {
                CpimSection::Message => cpim.headers.push((name, value)),
                CpimSection::Mime => cpim.mime.push((name, value)),
            },
            Lexed::Ready(HeaderLine::Blank) if section == CpimSection::Message => {
                self.stage = Stage::Cpim(CpimSection::Mime);
            }
            Lexed::Ready(HeaderLine::Blank | HeaderLine::EndLinePreamble) => {
                cpim.len = self.body.len();
                self.content_offset = cpim.len;
                self.enter_body(false);
            }
        }
        Ok(Step::Continue)
    }

    fn enter_body(&mut self, after_headers: bool) {
        let Some(mut draft) = self.draft.take() else {
            return;
        };
        draft.headers.cpim = self.cpim.take();
        self.scanner = Some(if after_headers {
            EndLineScanner::after_headers(&draft.transaction_id)
        } else {
            EndLineScanner::new(&draft.transaction_id)
        });
        self.head = Some(Arc::new(draft));
        self.stage = Stage::Body;
    }

    fn body(&mut self, input: &mut Input<'_>) -> Result<ParseStatus, ParseError> {
        let (Some(scanner), Some(head)) = (self.scanner.as_mut(), self.head.as_ref()) else {
            return Err(ParseError::Halted);
        };
        match scanner.scan(input, &mut self.body)? {
            Scan::Terminated(continuation) => {
                self.emit(input, continuation, true);
                self.stage = Stage::Done;
                Ok(ParseStatus::Done)
            }
            Scan::Exhausted if head.is_interruptible() && !self.body.is_empty() => {
                self.emit(input, Continuation::More, false);
                Ok(ParseStatus::PiecePart)
            }
            Scan::Exhausted => Ok(ParseStatus::NeedMoreData),
        }
    }

    fn emit(&mut self, input: &Input<'_>, continuation: Continuation, terminal: bool) {
        let Some(head) = self.head.clone() else {
            return;
        };
        self.wire_bytes += input.position() - self.mark;
        self.mark = input.position();
        let wire_size = std::mem::take(&mut self.wire_bytes);

        let body = self.body.split().freeze();
        let kind = match (self.first_piece, terminal) {
            (true, true) => PieceKind::Complete,
            (true, false) => PieceKind::Head,
            (false, true) => PieceKind::Tail,
            (false, false) => PieceKind::BodyOnly,
        };
        let offset = head.byte_range().offset() + self.emitted;
        let content_offset = if self.first_piece {
            self.content_offset
        } else {
            0
        };
        self.emitted += body.len() as u64;
        self.first_piece = false;
        let message = terminal.then(|| PieceHead::clone(&head).into_message(body.clone(), continuation));
        self.piece = Some(ChunkPiece {
            kind,
            head,
            continuation,
            body,
            offset,
            content_offset,
            wire_size,
            message,
        });
    }

    /// Bytes consumed but held back as a possible end-line prefix.
    #[must_use]
    pub fn held_back(&self) -> usize { self.scanner.as_ref().map_or(0, EndLineScanner::held) }
}

fn validate(head: &mut PieceHead) -> Result<(), ParseError> {
    let kind = head.kind();
    let headers = &head.headers;
    let missing = |header| ParseError::MissingHeader { kind, header };
    if headers.to_path.is_none() {
        return Err(missing("To-Path"));
    }
    if headers.from_path.is_none() {
        return Err(missing("From-Path"));
    }
    match kind {
        MessageKind::Request => {
            if headers.message_id.is_none() {
                return Err(missing("Message-ID"));
            }
            // Lenient peers omit Byte-Range on single-chunk messages; assume
            // the first segment with unknown length.
            head.byte_range_defaulted = headers.byte_range.is_none();
        }
        MessageKind::Report => {
            if headers.status.is_none() {
                return Err(missing("Status"));
            }
            let forbidden = |header| ParseError::ForbiddenHeader { kind, header };
            if headers.success_report.is_some() {
                return Err(forbidden("Success-Report"));
            }
            if headers.failure_report.is_some() {
                return Err(forbidden("Failure-Report"));
            }
        }
        MessageKind::Response => {}
    }
    Ok(())
}
