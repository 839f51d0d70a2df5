//! Callbacks through which a session reports to its owner.

use std::sync::Arc;

use crate::{
    error::CloseReason,
    inbound::ReassembledMessage,
    message::{CorrelationId, Report},
};

/// Observer of one session.
///
/// Every method has a no-op default. Callbacks run on the session task, so
/// they must not block; hand work off through a channel instead.
#[expect(unused_variables, reason = "default methods ignore their arguments")]
pub trait SessionListener: Send + Sync + 'static {
    /// The session is bound and ordinary traffic flows.
    fn bound(&self) {}

    /// Queue fill ratio after a completed write.
    fn queue_usage_changed(&self, usage: f64) {}

    /// New sends are admitted again (`true`) or refused (`false`).
    fn admission_changed(&self, admitting: bool) {}

    /// Final status of the unit sent under `correlation`.
    fn response_received(&self, correlation: CorrelationId, code: u16) {}

    /// The unit sent under `correlation` will not be delivered further.
    fn message_aborted(&self, correlation: CorrelationId) {}

    /// A complete inbound message.
    fn message_received(&self, message: ReassembledMessage) {}

    /// An inbound delivery report.
    fn report_received(&self, report: Report) {}

    /// The session terminated.
    fn closed(&self, reason: &CloseReason) {}
}

/// Listener that ignores every callback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl SessionListener for NoopListener {}

impl<L: SessionListener + ?Sized> SessionListener for Arc<L> {
    fn bound(&self) { (**self).bound(); }

    fn queue_usage_changed(&self, usage: f64) { (**self).queue_usage_changed(usage); }

    fn admission_changed(&self, admitting: bool) { (**self).admission_changed(admitting); }

    fn response_received(&self, correlation: CorrelationId, code: u16) {
        (**self).response_received(correlation, code);
    }

    fn message_aborted(&self, correlation: CorrelationId) { (**self).message_aborted(correlation); }

    fn message_received(&self, message: ReassembledMessage) { (**self).message_received(message); }

    fn report_received(&self, report: Report) { (**self).report_received(report); }

    fn closed(&self, reason: &CloseReason) { (**self).closed(reason); }
}
