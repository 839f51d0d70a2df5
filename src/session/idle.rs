//! Re-armable deadline used for the idle-close and handshake timers.

use std::{future, pin::Pin, time::Duration};

use tokio::time::{Instant, Sleep, sleep_until};

/// One optional deadline. Polling a disarmed timer never completes.
#[derive(Debug, Default)]
pub(super) struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    /// Schedule the deadline `after` from now, replacing any earlier one.
    pub(super) fn arm(&mut self, after: Duration) {
        let deadline = Instant::now() + after;
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(sleep_until(deadline))),
        }
    }

    pub(super) fn disarm(&mut self) { self.sleep = None; }

    pub(super) fn is_armed(&self) -> bool { self.sleep.is_some() }

    /// Wait for the deadline, then disarm.
    pub(super) async fn elapsed(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => future::pending().await,
        }
        self.sleep = None;
    }
}
