#![doc(html_root_url = "https://docs.rs/msrpframe/latest")]
//! Public API for the `msrpframe` library.
//!
//! This crate provides the session layer of a chunked message relay
//! protocol: a resumable tokenizer and parser that accept bytes in arbitrary
//! fragments, a sans-IO outbound state machine that chunks and interleaves
//! traffic, and a tokio session actor tying both to a connection.

pub mod codec;
pub mod config;
pub mod error;
pub mod inbound;
pub mod marshal;
pub mod message;
pub mod metrics;
pub mod mux;
pub mod outbound;
pub mod parser;
pub mod session;
pub mod tokenizer;
pub mod transport;

pub use codec::{CodecError, MsrpCodec};
pub use config::{ConfigError, SessionConfig};
pub use error::{CloseReason, Error, Result};
pub use message::{CorrelationId, Message, MessageId, Report, Request, Response, TransactionId};
pub use mux::{ConnectionPool, Multiplexer};
pub use outbound::{OutboundFsm, OutboundState};
pub use parser::{ChunkPiece, MessageParser, ParseStatus};
pub use session::{Session, SessionContext, SessionHandle, SessionListener};
pub use transport::{Transport, WriterTransport};
