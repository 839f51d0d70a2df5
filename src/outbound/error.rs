//! Errors returned by the outbound state machine.

use thiserror::Error;

use super::OutboundState;
use crate::message::{CorrelationId, TransactionId};

/// Rejection of a signal.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OutboundError {
    /// The signal does not apply to the current state; nothing changed.
    #[error("{signal} is not handled in state {state}")]
    NotHandled {
        /// State when the signal arrived.
        state: OutboundState,
        /// Signal name.
        signal: &'static str,
    },
    /// The state machine has terminated.
    #[error("outbound transmission has terminated")]
    Terminated,
    /// No queued or in-flight unit carries this correlation id.
    #[error("no unit with correlation id {0}")]
    UnknownCorrelation(CorrelationId),
    /// Admitting the unit would exceed the queue limit; the state machine
    /// terminated.
    #[error("queue overflow: {attempted} bytes exceed the {limit} byte limit")]
    QueueOverflow {
        /// Queued bytes including the rejected unit.
        attempted: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The handshake response answered a different transaction; the state
    /// machine terminated.
    #[error("handshake response for {found}, expected {expected}")]
    HandshakeMismatch {
        /// Transaction id of the handshake request.
        expected: TransactionId,
        /// Transaction id of the response.
        found: TransactionId,
    },
}
