//! Canonical error, result and close-reason types for the crate.
//!
//! Each layer owns a focused error enum; [`Error`] gathers them for callers
//! that drive several layers at once.

use std::{fmt, io};

use thiserror::Error;

use crate::{
    codec::CodecError,
    config::ConfigError,
    inbound::ReassemblyError,
    mux::MuxError,
    outbound::OutboundError,
    parser::ParseError,
    session::SessionError,
    tokenizer::SyntaxError,
};

/// Why a session or outbound state machine terminated.
///
/// Upper layers use this to tell a normal close from a failure or timeout
/// and decide whether to re-establish.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Closed on request.
    Normal,
    /// The idle timer fired after a close was requested.
    IdleTimeout,
    /// The handshake response did not arrive in time.
    HandshakeTimeout,
    /// Queued bytes exceeded the configured limit.
    QueueOverflow,
    /// The handshake response was negative or answered another transaction.
    HandshakeFailed,
    /// Reading or writing the transport failed.
    Transport(String),
    /// The peer violated the protocol.
    Protocol(String),
}

impl CloseReason {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::IdleTimeout => "idle_timeout",
            Self::HandshakeTimeout => "handshake_timeout",
            Self::QueueOverflow => "queue_overflow",
            Self::HandshakeFailed => "handshake_failed",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
        }
    }

    /// Whether the close was caused by a failure rather than a request or
    /// timeout.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::QueueOverflow | Self::HandshakeFailed | Self::Transport(_) | Self::Protocol(_)
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(detail) | Self::Protocol(detail) => {
                write!(f, "{}: {detail}", self.label())
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Top-level error type exposed by `msrpframe`.
#[derive(Debug, Error)]
pub enum Error {
    /// Tokenizer failure.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// Message parser failure.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Framing codec failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Outbound state machine rejection.
    #[error(transparent)]
    Outbound(#[from] OutboundError),
    /// Session handle failure.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Inbound reassembly failure.
    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),
    /// Multiplexer registration failure.
    #[error(transparent)]
    Mux(#[from] MuxError),
    /// Transport I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Canonical result alias used by `msrpframe` public APIs.
pub type Result<T> = std::result::Result<T, Error>;
