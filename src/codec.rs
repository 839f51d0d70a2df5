//! `tokio_util` codec over the resumable parser and the marshaller.
//!
//! [`MsrpCodec`] decodes [`ChunkPiece`]s and encodes whole [`Message`]s. It
//! honours the parser's buffer contract: consumed bytes are dropped from the
//! read buffer after every call, the parser is told about the compaction,
//! and the parser is reset only after a terminal piece.

use std::io;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    marshal::encode_message,
    message::Message,
    parser::{ChunkPiece, MessageParser, ParseError, ParseStatus},
};

/// Errors surfaced by [`MsrpCodec`].
#[derive(Debug, Error)]
pub enum CodecError {
    /// The inbound stream violates the protocol.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Reading from or writing to the transport failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The peer closed the stream in the middle of a unit.
    #[error("stream ended mid-message with {buffered} bytes buffered")]
    UnexpectedEof {
        /// Unparsed bytes left in the read buffer.
        buffered: usize,
    },
}

/// Framing codec for one connection.
#[derive(Debug, Default)]
pub struct MsrpCodec {
    parser: MessageParser,
}

impl MsrpCodec {
    /// Create a codec with default parser limits.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a codec whose parser rejects header blocks above `limit` bytes.
    #[must_use]
    pub fn with_max_header_size(limit: usize) -> Self {
        Self {
            parser: MessageParser::with_max_header_size(limit),
        }
    }
}

impl Decoder for MsrpCodec {
    type Item = ChunkPiece;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let status = self.parser.parse(src)?;
        src.advance(self.parser.stopped_at_position());
        self.parser.reset_buffer_position();
        match status {
            ParseStatus::NeedMoreData => Ok(None),
            ParseStatus::PiecePart => Ok(self.parser.take_piece()),
            ParseStatus::Done => {
                let piece = self.parser.take_piece();
                self.parser.reset();
                Ok(piece)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(piece) = self.decode(src)? {
            return Ok(Some(piece));
        }
        if src.is_empty() && !self.parser.is_mid_message() {
            return Ok(None);
        }
        Err(CodecError::UnexpectedEof {
            buffered: src.len(),
        })
    }
}

impl Encoder<Message> for MsrpCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_message(&item, dst);
        Ok(())
    }
}
