//! Inputs and outputs of the outbound state machine.

use bytes::Bytes;

use crate::{
    error::CloseReason,
    message::{CorrelationId, Message, Response},
};

/// Input delivered to [`OutboundFsm::handle`](super::OutboundFsm::handle).
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    /// Active side: send the binding request.
    Handshake {
        /// Peer URI.
        to_path: String,
        /// Local URI.
        from_path: String,
    },
    /// Passive side: the peer's first request bound the session.
    Bind,
    /// Queue an application unit.
    Send {
        /// Request, response or report to transmit.
        message: Message,
        /// Handle reported back in events.
        correlation: CorrelationId,
    },
    /// Queue a response or report generated by the session itself.
    Control(Message),
    /// Abandon the unit sent under `correlation`.
    Abort(CorrelationId),
    /// The last [`Action::Write`] reached the transport.
    WriteCompleted,
    /// The last [`Action::Write`] failed.
    WriteFailed(String),
    /// A transaction response arrived from the peer.
    ResponseReceived(Response),
    /// Tear down.
    Close(CloseReason),
}

impl Signal {
    /// Short name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::Bind => "bind",
            Self::Send { .. } => "send",
            Self::Control(_) => "control",
            Self::Abort(_) => "abort",
            Self::WriteCompleted => "write-completed",
            Self::WriteFailed(_) => "write-failed",
            Self::ResponseReceived(_) => "response-received",
            Self::Close(_) => "close",
        }
    }
}

/// Notification for the session owner.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundEvent {
    /// The session is bound and ordinary traffic flows.
    Bound,
    /// Queue fill ratio after a completed write, in `0.0..`.
    QueueUsage(f64),
    /// The final outcome of a unit's transmission.
    ResponseReceived {
        /// Handle given to `Send`.
        correlation: CorrelationId,
        /// Status code returned by the peer.
        code: u16,
    },
    /// The unit will not be delivered further.
    MessageAborted {
        /// Handle given to `Send`.
        correlation: CorrelationId,
    },
    /// The state machine terminated.
    Closed(CloseReason),
}

/// Work requested by the state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Write these bytes, then signal `WriteCompleted` or `WriteFailed`.
    Write(Bytes),
    /// Deliver an event.
    Notify(OutboundEvent),
}
