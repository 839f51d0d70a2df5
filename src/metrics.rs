//! Metric helpers for `msrpframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::error::CloseReason;

/// Name of the counter tracking chunk pieces read or written.
pub const PIECES_TOTAL: &str = "msrpframe_pieces_total";
/// Name of the gauge tracking running sessions.
pub const SESSIONS_ACTIVE: &str = "msrpframe_sessions_active";
/// Name of the counter tracking session closes by reason.
pub const SESSION_CLOSED_TOTAL: &str = "msrpframe_session_closed_total";
/// Name of the counter tracking queue overflows.
pub const QUEUE_OVERFLOW_TOTAL: &str = "msrpframe_queue_overflow_total";

/// Direction of a chunk piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Pieces parsed from the peer.
    Inbound,
    /// Writes issued to the peer.
    Outbound,
}

impl Direction {
    /// Label value for the `direction` label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a chunk piece for the given direction.
pub fn inc_pieces(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(PIECES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Increment the running sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the running sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a session close.
pub fn inc_session_closed(reason: &CloseReason) {
    #[cfg(feature = "metrics")]
    counter!(SESSION_CLOSED_TOTAL, "reason" => reason.label()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = reason;
}

/// Record a queue overflow.
pub fn inc_queue_overflow() {
    #[cfg(feature = "metrics")]
    counter!(QUEUE_OVERFLOW_TOTAL).increment(1);
}
