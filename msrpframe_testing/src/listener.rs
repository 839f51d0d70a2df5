//! A [`SessionListener`] that turns callbacks into a stream of events.

use std::time::Duration;

use msrpframe::{
    CloseReason,
    CorrelationId,
    Report,
    inbound::ReassembledMessage,
    session::SessionListener,
};
use tokio::sync::mpsc;

/// One listener callback.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Bound,
    QueueUsage(f64),
    Admission(bool),
    Response(CorrelationId, u16),
    Aborted(CorrelationId),
    Message(ReassembledMessage),
    Report(Report),
    Closed(CloseReason),
}

impl SessionEvent {
    /// Queue usage and admission updates arrive after every write; most
    /// tests skip them.
    #[must_use]
    pub fn is_flow_control(&self) -> bool { matches!(self, Self::QueueUsage(_) | Self::Admission(_)) }
}

/// Forwards every callback into an [`EventStream`].
#[derive(Clone, Debug)]
pub struct RecordingListener {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl RecordingListener {
    /// Create a listener and the stream its events arrive on.
    #[must_use]
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventStream { rx })
    }

    fn record(&self, event: SessionEvent) { let _ = self.tx.send(event); }
}

impl SessionListener for RecordingListener {
    fn bound(&self) { self.record(SessionEvent::Bound); }

    fn queue_usage_changed(&self, usage: f64) { self.record(SessionEvent::QueueUsage(usage)); }

    fn admission_changed(&self, admitting: bool) { self.record(SessionEvent::Admission(admitting)); }

    fn response_received(&self, correlation: CorrelationId, code: u16) {
        self.record(SessionEvent::Response(correlation, code));
    }

    fn message_aborted(&self, correlation: CorrelationId) {
        self.record(SessionEvent::Aborted(correlation));
    }

    fn message_received(&self, message: ReassembledMessage) {
        self.record(SessionEvent::Message(message));
    }

    fn report_received(&self, report: Report) { self.record(SessionEvent::Report(report)); }

    fn closed(&self, reason: &CloseReason) { self.record(SessionEvent::Closed(reason.clone())); }
}

/// Receiving end of a [`RecordingListener`].
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Next event of any kind.
    ///
    /// # Panics
    ///
    /// Panics if no event arrives within five seconds or the session is gone.
    pub async fn next_any(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("session listener dropped")
    }

    /// Next event that is not a flow-control update.
    ///
    /// # Panics
    ///
    /// As for [`next_any`](Self::next_any).
    pub async fn next(&mut self) -> SessionEvent {
        loop {
            let event = self.next_any().await;
            if !event.is_flow_control() {
                return event;
            }
        }
    }

    /// Wait for the next complete inbound message.
    ///
    /// # Panics
    ///
    /// Panics if another non-flow-control event arrives first.
    pub async fn message(&mut self) -> ReassembledMessage {
        match self.next().await {
            SessionEvent::Message(message) => message,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    /// Events received so far, without waiting.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
