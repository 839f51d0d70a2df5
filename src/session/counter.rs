//! RAII guard behind the live session gauge.

/// Counts one running session task for as long as it lives.
pub(super) struct ActiveSession;

impl ActiveSession {
    pub(super) fn new() -> Self {
        crate::metrics::inc_sessions();
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) { crate::metrics::dec_sessions(); }
}
