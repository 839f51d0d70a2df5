//! Session lifecycle states and their transition table.

/// Lifecycle phase of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Spawned; a passive session waits here for the peer's first request.
    Init,
    /// The handshake request is out.
    Handshaking,
    /// Ordinary traffic flows.
    Bound,
    /// Close requested; the idle timer closes the session once traffic stops.
    Closing,
    /// Closed.
    Terminated,
}

/// Inputs that move a session between states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Transition {
    Handshake,
    Bind,
    RequestClose,
    Terminate,
}

impl SessionState {
    /// Next state for `transition`, or `None` when it does not apply.
    pub(super) fn next(self, transition: Transition) -> Option<Self> {
        match (self, transition) {
            (Self::Terminated, _) => None,
            (_, Transition::Terminate) => Some(Self::Terminated),
            (Self::Init, Transition::Handshake) => Some(Self::Handshaking),
            (Self::Init | Self::Handshaking, Transition::Bind) => Some(Self::Bound),
            (Self::Init | Self::Handshaking | Self::Bound, Transition::RequestClose) => {
                Some(Self::Closing)
            }
            _ => None,
        }
    }

    /// Whether the session has closed.
    #[must_use]
    pub fn is_terminated(self) -> bool { self == Self::Terminated }
}
