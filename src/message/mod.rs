//! Typed protocol units and header values.
//!
//! These types are shared by the parser, the marshaller and the outbound
//! transmission state machine. They carry no I/O and no parsing state.

use thiserror::Error;

pub mod byte_range;
pub mod cpim;
pub mod headers;
pub mod ids;
pub mod status;
pub mod types;

pub use byte_range::ByteRange;
pub use cpim::CpimBlock;
pub use headers::{HeaderError, Headers};
pub use ids::{CorrelationId, MessageId, TransactionId, TransactionIdGenerator};
pub use status::{Continuation, ReportFlag, Status, parse_status_code, reason_phrase};
pub use types::{Message, MessageKind, Method, Report, Request, Response};

/// A header value that does not match its grammar.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid {header} value {value:?}")]
pub struct HeaderValueError {
    /// Header or value kind being parsed.
    pub header: &'static str,
    /// Offending text.
    pub value: String,
}

impl HeaderValueError {
    pub(crate) fn new(header: &'static str, value: &str) -> Self {
        Self {
            header,
            value: value.to_owned(),
        }
    }
}
