//! Lexical errors raised by the tokenizer.
//!
//! Every variant is fatal: the tokenizer halts and the owning connection is
//! expected to close. Running out of input is never reported here; it is the
//! [`Lexed::Suspended`](super::Lexed::Suspended) outcome instead.

use thiserror::Error;

/// Fatal lexical error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    /// A byte is not permitted in the active pattern.
    #[error("unexpected byte {byte:#04x} in {context}")]
    UnexpectedByte {
        /// Offending byte.
        byte: u8,
        /// Name of the active pattern.
        context: &'static str,
    },
    /// A carriage return was followed by something other than a line feed.
    #[error("carriage return followed by {byte:#04x} in {context}")]
    DanglingCarriageReturn {
        /// Byte that followed the CR.
        byte: u8,
        /// Name of the active pattern.
        context: &'static str,
    },
    /// LF without a preceding CR where the pattern does not tolerate it.
    #[error("bare line feed in {context}")]
    BareLineFeed {
        /// Name of the active pattern.
        context: &'static str,
    },
    /// A quote-closing byte appeared outside a quoted run.
    #[error("unmatched closing quote {byte:#04x} in {context}")]
    UnmatchedQuote {
        /// Closing byte.
        byte: u8,
        /// Name of the active pattern.
        context: &'static str,
    },
    /// Input ended inside a quoted run under a non-suspending policy.
    #[error("unterminated quoted string in {context}")]
    UnterminatedQuote {
        /// Name of the active pattern.
        context: &'static str,
    },
    /// Malformed UTF-8 sequence.
    #[error("invalid UTF-8 byte {byte:#04x}")]
    InvalidUtf8 {
        /// Byte that broke the sequence.
        byte: u8,
    },
    /// Input ended where the pattern forbids it.
    #[error("unexpected end of input in {context}")]
    UnexpectedEof {
        /// Name of the active pattern.
        context: &'static str,
    },
    /// A literal constant did not match.
    #[error("expected {expected:#04x} but found {found:#04x} while matching constant")]
    ConstantMismatch {
        /// Byte the constant required.
        expected: u8,
        /// Byte actually read.
        found: u8,
    },
    /// The tokenizer already failed and refuses further input.
    #[error("tokenizer halted after a previous error")]
    Halted,
}
