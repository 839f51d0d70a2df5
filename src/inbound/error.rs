//! Errors produced while reassembling inbound messages.

use std::num::NonZeroUsize;

use thiserror::Error;

use crate::message::MessageId;

/// Errors produced by [`Reassembler`](super::Reassembler).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The message would grow beyond the configured cap.
    #[error("message {message_id} too large: attempted {attempted} bytes, limit {limit}")]
    MessageTooLarge {
        /// Message being reassembled.
        message_id: MessageId,
        /// Size the message would have reached.
        attempted: u64,
        /// Configured cap.
        limit: NonZeroUsize,
    },
    /// A `SEND` piece arrived without a `Message-ID`.
    #[error("SEND piece without a Message-ID")]
    MissingMessageId,
}

impl ReassemblyError {
    /// Status code the session answers the offending chunk with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MessageTooLarge { .. } => 413,
            Self::MissingMessageId => 400,
        }
    }
}
