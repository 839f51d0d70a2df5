//! Two-level outbound queue with byte accounting.

use std::collections::VecDeque;

use crate::message::{Message, TransactionId};

/// Pending outbound work.
///
/// Responses and reports wait in the high-priority lane and are always
/// drained first. Requests wait in the low-priority lane as keys into the
/// transmission table; an interrupted request goes back to the front.
#[derive(Debug)]
pub(super) struct OutboundQueue {
    high: VecDeque<Message>,
    low: VecDeque<TransactionId>,
    queued_bytes: usize,
    limit: usize,
}

impl OutboundQueue {
    pub(super) fn new(limit: usize) -> Self {
        Self {
            high: VecDeque::new(),
            low: VecDeque::new(),
            queued_bytes: 0,
            limit,
        }
    }

    /// Reserve `bytes`. Returns the would-be total when it exceeds the limit.
    pub(super) fn reserve(&mut self, bytes: usize) -> Result<(), usize> {
        let attempted = self.queued_bytes.saturating_add(bytes);
        if attempted > self.limit {
            return Err(attempted);
        }
        self.queued_bytes = attempted;
        Ok(())
    }

    pub(super) fn release(&mut self, bytes: usize) {
        self.queued_bytes = self.queued_bytes.saturating_sub(bytes);
    }

    pub(super) fn limit(&self) -> usize { self.limit }

    pub(super) fn queued_bytes(&self) -> usize { self.queued_bytes }

    #[expect(
        clippy::cast_precision_loss,
        reason = "usage ratio is advisory; byte counts stay far below 2^52"
    )]
    pub(super) fn usage(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.queued_bytes as f64 / self.limit as f64
    }

    pub(super) fn push_control(&mut self, message: Message) { self.high.push_back(message); }

    pub(super) fn pop_control(&mut self) -> Option<Message> { self.high.pop_front() }

    pub(super) fn has_control(&self) -> bool { !self.high.is_empty() }

    pub(super) fn push_back(&mut self, id: TransactionId) { self.low.push_back(id); }

    pub(super) fn push_front(&mut self, id: TransactionId) { self.low.push_front(id); }

    pub(super) fn pop_front(&mut self) -> Option<TransactionId> { self.low.pop_front() }

    pub(super) fn remove(&mut self, id: &TransactionId) -> bool {
        let before = self.low.len();
        self.low.retain(|queued| queued != id);
        self.low.len() != before
    }

    pub(super) fn clear(&mut self) {
        self.high.clear();
        self.low.clear();
        self.queued_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(10, &[4, 6], Ok(()))]
    #[case(10, &[4, 7], Err(11))]
    #[case(0, &[0], Ok(()))]
    fn reserve_enforces_limit(
        #[case] limit: usize,
        #[case] sizes: &[usize],
        #[case] last: Result<(), usize>,
    ) {
        let mut queue = OutboundQueue::new(limit);
        let (tail, head) = sizes.split_last().expect("sizes");
        for size in head {
            queue.reserve(*size).expect("within limit");
        }
        assert_eq!(queue.reserve(*tail), last);
    }

    #[test]
    fn front_reinsertion_preserves_order() {
        let mut queue = OutboundQueue::new(100);
        queue.push_back(TransactionId::new("a000"));
        queue.push_back(TransactionId::new("b000"));
        let first = queue.pop_front().expect("first");
        queue.push_front(first.clone());
        assert_eq!(queue.pop_front(), Some(first));
        assert!(queue.remove(&TransactionId::new("b000")));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn usage_tracks_release() {
        let mut queue = OutboundQueue::new(8);
        queue.reserve(6).expect("reserve");
        queue.release(2);
        assert_eq!(queue.queued_bytes(), 4);
        assert!((queue.usage() - 0.5).abs() < f64::EPSILON);
    }
}
