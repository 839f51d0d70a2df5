//! Fatal parser errors.

use thiserror::Error;

use crate::{
    message::{HeaderError, MessageKind},
    tokenizer::SyntaxError,
};

/// A protocol violation that stops the parser.
///
/// Every variant is terminal for the connection: after returning one the
/// parser is halted and only [`MessageParser::reset`](super::MessageParser::reset)
/// revives it. Running out of input is reported as
/// [`ParseStatus::NeedMoreData`](super::ParseStatus::NeedMoreData) instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Lexical failure.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// The start line or a header line has the wrong shape.
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        /// What the grammar required.
        expected: &'static str,
        /// Rendering of the token that arrived.
        found: String,
    },
    /// The transaction identifier is malformed.
    #[error("invalid transaction id {0:?}")]
    InvalidTransactionId(String),
    /// The method keyword is not upper-case letters.
    #[error("invalid method {0:?}")]
    InvalidMethod(String),
    /// A header line was rejected.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// A mandatory header is absent.
    #[error("{kind:?} is missing mandatory header {header}")]
    MissingHeader {
        /// Start-line classification.
        kind: MessageKind,
        /// Header name.
        header: &'static str,
    },
    /// A header is not permitted for the unit kind.
    #[error("{kind:?} must not carry {header}")]
    ForbiddenHeader {
        /// Start-line classification.
        kind: MessageKind,
        /// Header name.
        header: &'static str,
    },
    /// A line starting with the end-line preamble is not this unit's end-line.
    #[error("malformed end-line: unexpected byte {byte:#04x}")]
    TerminatorMismatch {
        /// First byte that broke the match.
        byte: u8,
    },
    /// The start line and headers exceed the configured limit.
    #[error("header block exceeds {limit} bytes")]
    HeaderTooLarge {
        /// Configured limit.
        limit: usize,
    },
    /// A previous call failed.
    #[error("parser halted after an earlier error")]
    Halted,
    /// A unit completed and `reset` has not been called yet.
    #[error("parser must be reset before the next message")]
    AwaitingReset,
}
