//! Tests for the outbound transmission state machine.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use rstest::rstest;
use tokio_util::codec::Decoder;

use super::*;
use crate::{
    codec::MsrpCodec,
    message::{Headers, MessageId, ReportFlag, Response, TransactionId},
    parser::{ChunkPiece, StartLine},
};

const TO: &str = "msrp://b.example.com/2;tcp";
const FROM: &str = "msrp://a.example.com/1;tcp";

fn request(body: impl Into<Bytes>) -> Message {
    Message::Request(Request::send(
        TO,
        FROM,
        MessageId::new("m-1"),
        Some("text/plain"),
        body,
    ))
}

/// A request the peer never answers.
fn unanswered(body: &'static str) -> Message {
    let Message::Request(request) = request(body) else {
        unreachable!("request() builds requests");
    };
    Message::Request(request.with_failure_report(ReportFlag::No))
}

fn body_of(len: usize) -> Bytes {
    (0..len)
        .map(|i| b"abcdefghijklmnopqrstuvwxyz"[i % 26])
        .collect::<Vec<_>>()
        .into()
}

fn send(correlation: u64, message: Message) -> Signal {
    Signal::Send {
        message,
        correlation: CorrelationId::new(correlation),
    }
}

/// Drives an [`OutboundFsm`] and records everything it asks for.
struct Harness {
    fsm: OutboundFsm,
    writes: Vec<Bytes>,
    events: Vec<OutboundEvent>,
    last_request: Option<TransactionId>,
}

impl Harness {
    fn new(max_chunk_size: usize, write_block_size: usize, max_queued_bytes: usize) -> Self {
        let config = OutboundConfig {
            max_chunk_size,
            write_block_size,
            max_queued_bytes,
        };
        Self {
            fsm: OutboundFsm::new(config, Arc::new(TransactionIdGenerator::new("w"))),
            writes: Vec::new(),
            events: Vec::new(),
            last_request: None,
        }
    }

    fn bound(max_chunk_size: usize, write_block_size: usize) -> Self {
        let mut harness = Self::new(max_chunk_size, write_block_size, 1 << 20);
        harness.signal(Signal::Bind).expect("bind");
        harness.events.clear();
        harness
    }

    fn signal(&mut self, signal: Signal) -> Result<(), OutboundError> {
        let result = self.fsm.handle(signal);
        for action in self.fsm.take_actions() {
            match action {
                Action::Write(bytes) => {
                    if let Some(id) = request_id(&bytes) {
                        self.last_request = Some(id);
                    }
                    self.writes.push(bytes);
                }
                Action::Notify(event) => self.events.push(event),
            }
        }
        result
    }

    fn complete(&mut self) { self.signal(Signal::WriteCompleted).expect("write completed"); }

    fn respond(&mut self, code: u16) {
        let id = self.last_request.clone().expect("a request was written");
        self.signal(Signal::ResponseReceived(response(&id, code)))
            .expect("response");
    }

    /// Complete writes and answer chunks with `code` until nothing is left.
    fn run(&mut self, code: u16) {
        loop {
            match self.fsm.state() {
                OutboundState::SendingChunkAwaitingWrite => self.complete(),
                OutboundState::AwaitingResponse => self.respond(code),
                _ => break,
            }
        }
    }

    fn wire(&self) -> Vec<u8> { self.writes.concat() }

    fn non_usage_events(&self) -> Vec<OutboundEvent> {
        self.events
            .iter()
            .filter(|event| !matches!(event, OutboundEvent::QueueUsage(_)))
            .cloned()
            .collect()
    }
}

fn response(id: &TransactionId, code: u16) -> Response {
    let headers = Headers {
        to_path: Some(FROM.to_owned()),
        from_path: Some(TO.to_owned()),
        ..Headers::default()
    };
    Response::to_request(id, &headers, code)
}

/// Transaction id of a write that starts a `SEND`.
fn request_id(bytes: &[u8]) -> Option<TransactionId> {
    let line = bytes.split(|b| *b == b'\r').next()?;
    let mut words = std::str::from_utf8(line).ok()?.split(' ');
    if words.next()? != "MSRP" {
        return None;
    }
    let id = words.next()?;
    (words.next()? == "SEND").then(|| TransactionId::new(id))
}

fn pieces(wire: &[u8]) -> Vec<ChunkPiece> {
    let mut codec = MsrpCodec::new();
    let mut buf = BytesMut::from(wire);
    let mut out = Vec::new();
    while let Some(piece) = codec.decode(&mut buf).expect("valid wire") {
        out.push(piece);
    }
    assert!(buf.is_empty(), "trailing bytes on the wire");
    out
}

/// Terminal `SEND` pieces as `(offset, body length, continuation)`.
fn send_chunks(wire: &[u8]) -> Vec<(u64, u64, Continuation)> {
    let mut out: Vec<(u64, u64, Continuation)> = Vec::new();
    let mut open: Option<(u64, u64)> = None;
    for piece in pieces(wire) {
        if !matches!(piece.head().start_line, StartLine::Request(_)) {
            continue;
        }
        let (offset, len) = open.get_or_insert((piece.offset(), 0));
        *len += piece.body().len() as u64;
        if piece.kind().is_terminal() {
            out.push((*offset, *len, piece.continuation()));
            open = None;
        }
    }
    out
}

#[rstest]
#[case(0, 16)]
#[case(5, 16)]
#[case(16, 16)]
#[case(17, 16)]
#[case(100, 16)]
#[case(4096, 2048)]
fn chunking_covers_the_body_in_order(#[case] size: usize, #[case] max_chunk: usize) {
    let mut harness = Harness::bound(max_chunk, max_chunk);
    let body = body_of(size);
    harness.signal(send(1, request(body.clone()))).expect("send");
    harness.run(200);

    let expected = size.div_ceil(max_chunk).max(1);
    assert_eq!(harness.writes.len(), expected);
    let chunks = send_chunks(&harness.wire());
    assert_eq!(chunks.len(), expected);
    for (index, (offset, _, continuation)) in chunks.iter().enumerate() {
        assert_eq!(*offset, (index * max_chunk) as u64);
        let last = index + 1 == expected;
        let flag = if last {
            Continuation::Done
        } else {
            Continuation::More
        };
        assert_eq!(*continuation, flag);
    }
    let delivered: Vec<u8> = pieces(&harness.wire())
        .iter()
        .flat_map(|piece| piece.body().to_vec())
        .collect();
    assert_eq!(delivered, body.to_vec());
    assert_eq!(
        harness.non_usage_events(),
        vec![OutboundEvent::ResponseReceived {
            correlation: CorrelationId::new(1),
            code: 200,
        }]
    );
    assert_eq!(harness.fsm.state(), OutboundState::Idle);
    assert_eq!(harness.fsm.queued_bytes(), 0);
}

#[test]
fn every_chunk_uses_a_fresh_transaction_id() {
    let mut harness = Harness::bound(4, 4);
    harness.signal(send(1, request("abcdefghij"))).expect("send");
    harness.run(200);
    let ids: Vec<_> = harness.writes.iter().filter_map(|w| request_id(w)).collect();
    assert_eq!(ids.len(), 3);
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
}

#[test]
fn large_chunks_are_written_in_blocks_with_open_range() {
    let mut harness = Harness::bound(30, 10);
    harness.signal(send(1, request(body_of(25)))).expect("send");
    harness.run(200);
    assert_eq!(harness.writes.len(), 3);
    let head = String::from_utf8_lossy(&harness.writes[0]).into_owned();
    assert!(head.contains("Byte-Range: 1-*/25\r\n"), "{head}");
    assert_eq!(
        send_chunks(&harness.wire()),
        vec![(0, 25, Continuation::Done)]
    );
}

#[test]
fn responses_interrupt_an_open_chunk() {
    let mut harness = Harness::bound(100, 10);
    harness.signal(send(1, request(body_of(100)))).expect("send");
    harness.complete();
    assert_eq!(harness.writes.len(), 2);

    let peer = TransactionId::new("peer0001");
    let reply = response(&peer, 200);
    harness
        .signal(Signal::Control(Message::Response(reply)))
        .expect("control");
    harness.complete();
    assert_eq!(harness.writes.len(), 3);
    let interrupted = harness.last_request.clone().expect("chunk id");
    assert_eq!(
        harness.writes[2].as_ref(),
        format!("\r\n-------{interrupted}+\r\n").as_bytes()
    );
    harness.complete();
    assert!(harness.writes[3].starts_with(b"MSRP peer0001 200"));
    harness.complete();
    assert_eq!(harness.fsm.state(), OutboundState::AwaitingResponse);
    harness.respond(200);
    assert_ne!(harness.last_request, Some(interrupted));
    harness.run(200);

    assert_eq!(
        send_chunks(&harness.wire()),
        vec![(0, 20, Continuation::More), (20, 80, Continuation::Done)]
    );
}

#[test]
fn responses_wait_for_a_free_transport_but_not_for_awaited_chunks() {
    let mut harness = Harness::bound(10, 10);
    harness.signal(send(1, request(body_of(20)))).expect("send");
    harness.complete();
    assert_eq!(harness.fsm.state(), OutboundState::AwaitingResponse);
    let peer = TransactionId::new("peer0002");
    harness
        .signal(Signal::Control(Message::Response(response(&peer, 200))))
        .expect("control");
    assert_eq!(harness.writes.len(), 2);
    assert!(harness.writes[1].starts_with(b"MSRP peer0002 200"));
}

#[test]
fn overflow_tears_down_without_writing_the_unit() {
    let mut harness = Harness::new(64, 64, 10);
    harness.signal(Signal::Bind).expect("bind");
    harness.signal(send(1, request("12345678"))).expect("fits");
    let err = harness
        .signal(send(2, request("overflow")))
        .expect_err("exceeds limit");
    assert_eq!(
        err,
        OutboundError::QueueOverflow {
            attempted: 16,
            limit: 10,
        }
    );
    assert_eq!(harness.writes.len(), 1);
    assert!(!harness.wire().windows(8).any(|w| w == b"overflow"));
    assert!(
        harness
            .events
            .contains(&OutboundEvent::Closed(CloseReason::QueueOverflow))
    );
    assert_eq!(harness.fsm.state(), OutboundState::Terminated);
}

#[test]
fn queue_usage_follows_every_write() {
    let mut harness = Harness::bound(4, 4);
    harness
        .signal(send(1, unanswered("abcdefgh")))
        .expect("send");
    harness.run(200);
    let usage: Vec<_> = harness
        .events
        .iter()
        .filter(|event| matches!(event, OutboundEvent::QueueUsage(_)))
        .collect();
    assert_eq!(usage.len(), harness.writes.len());
}

#[test]
fn failure_report_no_streams_without_waiting() {
    let mut harness = Harness::bound(4, 4);
    harness
        .signal(send(1, unanswered("abcdefghij")))
        .expect("send");
    while harness.fsm.state() == OutboundState::SendingChunkAwaitingWrite {
        harness.complete();
    }
    assert_eq!(harness.writes.len(), 3);
    assert_eq!(harness.fsm.state(), OutboundState::Idle);
    assert!(harness.non_usage_events().is_empty());
}

#[test]
fn sends_before_binding_are_held() {
    let mut harness = Harness::new(64, 64, 1024);
    harness.signal(send(1, request("early"))).expect("send");
    assert!(harness.writes.is_empty());
    assert_eq!(harness.fsm.state(), OutboundState::Init);
    harness.signal(Signal::Bind).expect("bind");
    assert_eq!(harness.events.first(), Some(&OutboundEvent::Bound));
    assert_eq!(harness.writes.len(), 1);
}

#[test]
fn handshake_is_an_empty_send() {
    let mut harness = Harness::new(64, 64, 1024);
    harness
        .signal(Signal::Handshake {
            to_path: TO.to_owned(),
            from_path: FROM.to_owned(),
        })
        .expect("handshake");
    assert_eq!(
        harness.fsm.state(),
        OutboundState::AwaitingHandshakeResponse
    );
    let wire = String::from_utf8_lossy(&harness.writes[0]).into_owned();
    assert!(wire.contains("Byte-Range: 1-0/0\r\n"), "{wire}");
    assert!(!wire.contains("Content-Type"));
    harness.complete();
    harness.respond(200);
    assert!(harness.fsm.is_bound());
    assert_eq!(harness.fsm.state(), OutboundState::Idle);
    assert_eq!(harness.non_usage_events(), vec![OutboundEvent::Bound]);
}

#[test]
fn handshake_response_with_another_transaction_is_fatal() {
    let mut harness = Harness::new(64, 64, 1024);
    harness
        .signal(Signal::Handshake {
            to_path: TO.to_owned(),
            from_path: FROM.to_owned(),
        })
        .expect("handshake");
    let expected = harness.last_request.clone().expect("handshake id");
    let found = TransactionId::new("other001");
    let err = harness
        .signal(Signal::ResponseReceived(response(&found, 200)))
        .expect_err("mismatch");
    assert_eq!(err, OutboundError::HandshakeMismatch { expected, found });
    assert_eq!(
        harness.non_usage_events(),
        vec![OutboundEvent::Closed(CloseReason::HandshakeFailed)]
    );
}

#[test]
fn handshake_rejection_closes() {
    let mut harness = Harness::new(64, 64, 1024);
    harness
        .signal(Signal::Handshake {
            to_path: TO.to_owned(),
            from_path: FROM.to_owned(),
        })
        .expect("handshake");
    harness.respond(481);
    assert_eq!(harness.fsm.state(), OutboundState::Terminated);
    assert_eq!(
        harness.non_usage_events(),
        vec![OutboundEvent::Closed(CloseReason::HandshakeFailed)]
    );
}

#[test]
fn aborting_a_queued_unit_drops_it_unwritten() {
    let mut harness = Harness::bound(64, 64);
    harness.signal(send(1, request("first"))).expect("send");
    harness.signal(send(2, request("second"))).expect("send");
    harness
        .signal(Signal::Abort(CorrelationId::new(2)))
        .expect("abort");
    harness.run(200);
    assert!(!harness.wire().windows(6).any(|w| w == b"second"));
    assert_eq!(
        harness.non_usage_events(),
        vec![
            OutboundEvent::MessageAborted {
                correlation: CorrelationId::new(2),
            },
            OutboundEvent::ResponseReceived {
                correlation: CorrelationId::new(1),
                code: 200,
            },
        ]
    );
    assert_eq!(harness.fsm.queued_bytes(), 0);
}

#[test]
fn aborting_mid_chunk_closes_it_with_hash() {
    let mut harness = Harness::bound(100, 10);
    harness.signal(send(1, request(body_of(50)))).expect("send");
    harness
        .signal(Signal::Abort(CorrelationId::new(1)))
        .expect("abort");
    harness.complete();
    let id = harness.last_request.clone().expect("chunk id");
    assert_eq!(
        harness.writes[1].as_ref(),
        format!("\r\n-------{id}#\r\n").as_bytes()
    );
    harness.complete();
    assert_eq!(harness.fsm.state(), OutboundState::Idle);
    assert_eq!(
        send_chunks(&harness.wire()),
        vec![(0, 10, Continuation::Aborted)]
    );
    assert_eq!(
        harness.non_usage_events(),
        vec![OutboundEvent::MessageAborted {
            correlation: CorrelationId::new(1),
        }]
    );
}

#[test]
fn aborting_between_chunks_sends_an_empty_aborted_chunk() {
    let mut harness = Harness::bound(10, 10);
    harness.signal(send(1, request(body_of(30)))).expect("send");
    harness.complete();
    harness
        .signal(Signal::Abort(CorrelationId::new(1)))
        .expect("abort");
    harness.respond(200);
    assert_eq!(harness.writes.len(), 2);
    let wire = String::from_utf8_lossy(&harness.writes[1]).into_owned();
    assert!(wire.contains("Byte-Range: 11-10/30\r\n"), "{wire}");
    assert!(wire.ends_with("#\r\n"));
    harness.complete();
    assert_eq!(
        send_chunks(&harness.wire()),
        vec![(0, 10, Continuation::More), (10, 0, Continuation::Aborted)]
    );
    assert_eq!(
        harness.non_usage_events(),
        vec![OutboundEvent::MessageAborted {
            correlation: CorrelationId::new(1),
        }]
    );
}

#[test]
fn aborting_an_unknown_unit_is_rejected() {
    let mut harness = Harness::bound(10, 10);
    assert_eq!(
        harness.signal(Signal::Abort(CorrelationId::new(9))),
        Err(OutboundError::UnknownCorrelation(CorrelationId::new(9)))
    );
}

#[test]
fn rejecting_the_open_chunk_truncates_it() {
    let mut harness = Harness::bound(100, 10);
    harness.signal(send(1, request(body_of(50)))).expect("send");
    harness.respond(413);
    assert_eq!(
        harness.non_usage_events(),
        vec![
            OutboundEvent::ResponseReceived {
                correlation: CorrelationId::new(1),
                code: 413,
            },
            OutboundEvent::MessageAborted {
                correlation: CorrelationId::new(1),
            },
        ]
    );
    harness.complete();
    assert!(harness.writes[1].ends_with(b"+\r\n"));
    harness.complete();
    assert_eq!(harness.writes.len(), 2);
    assert_eq!(harness.fsm.state(), OutboundState::Idle);
    assert_eq!(harness.fsm.queued_bytes(), 0);
}

#[test]
fn rejecting_a_closed_chunk_drops_the_unit() {
    let mut harness = Harness::bound(10, 10);
    harness.signal(send(1, request(body_of(30)))).expect("send");
    harness.complete();
    harness.respond(481);
    assert_eq!(harness.fsm.state(), OutboundState::Idle);
    assert_eq!(harness.writes.len(), 1);
    assert!(harness.fsm.transmission(CorrelationId::new(1)).is_none());
    assert_eq!(harness.fsm.queued_bytes(), 0);
}

#[test]
fn success_for_an_open_chunk_settles_when_it_closes() {
    let mut harness = Harness::bound(100, 10);
    harness.signal(send(1, request(body_of(100)))).expect("send");
    harness.complete();
    harness.respond(200);
    assert!(harness.non_usage_events().is_empty());
    while harness.fsm.state() == OutboundState::SendingChunkAwaitingWrite {
        harness.complete();
    }
    assert_eq!(harness.fsm.state(), OutboundState::Idle);
    assert_eq!(
        harness.non_usage_events(),
        vec![OutboundEvent::ResponseReceived {
            correlation: CorrelationId::new(1),
            code: 200,
        }]
    );

    harness.signal(send(2, request("next"))).expect("queue moves on");
    harness.run(200);
    assert_eq!(
        send_chunks(&harness.wire()),
        vec![(0, 100, Continuation::Done), (0, 4, Continuation::Done)]
    );
}

#[test]
fn partial_failure_reports_still_reject_closed_chunks() {
    let mut harness = Harness::bound(4, 4);
    let Message::Request(partial) = request(body_of(12)) else {
        unreachable!("request() builds requests");
    };
    harness
        .signal(send(1, Message::Request(partial.with_failure_report(ReportFlag::Partial))))
        .expect("send");
    harness.complete();
    harness.respond(413);
    while harness.fsm.state() == OutboundState::SendingChunkAwaitingWrite {
        harness.complete();
    }

    assert_eq!(
        send_chunks(&harness.wire()),
        vec![(0, 4, Continuation::More), (4, 4, Continuation::More)]
    );
    assert_eq!(
        harness.non_usage_events(),
        vec![
            OutboundEvent::ResponseReceived {
                correlation: CorrelationId::new(1),
                code: 413,
            },
            OutboundEvent::MessageAborted {
                correlation: CorrelationId::new(1),
            },
        ]
    );
    assert_eq!(harness.fsm.state(), OutboundState::Idle);
    assert_eq!(harness.fsm.queued_bytes(), 0);
}

#[test]
fn partial_failure_reports_reject_an_earlier_chunk_while_one_is_open() {
    let mut harness = Harness::bound(8, 4);
    let Message::Request(partial) = request(body_of(24)) else {
        unreachable!("request() builds requests");
    };
    harness
        .signal(send(1, Message::Request(partial.with_failure_report(ReportFlag::Partial))))
        .expect("send");
    harness.complete();
    let first = harness.last_request.clone().expect("first chunk");
    harness.complete();
    assert_ne!(harness.last_request, Some(first.clone()));
    harness
        .signal(Signal::ResponseReceived(response(&first, 413)))
        .expect("response");
    while harness.fsm.state() == OutboundState::SendingChunkAwaitingWrite {
        harness.complete();
    }

    assert_eq!(
        send_chunks(&harness.wire()),
        vec![(0, 8, Continuation::More), (8, 4, Continuation::More)]
    );
    assert!(harness.non_usage_events().contains(&OutboundEvent::MessageAborted {
        correlation: CorrelationId::new(1),
    }));
    assert_eq!(harness.fsm.queued_bytes(), 0);
}

#[test]
fn intermediate_responses_are_not_reported() {
    let mut harness = Harness::bound(10, 10);
    harness.signal(send(7, request(body_of(20)))).expect("send");
    harness.complete();
    harness.respond(200);
    assert!(harness.non_usage_events().is_empty());
    let progress = harness
        .fsm
        .transmission(CorrelationId::new(7))
        .expect("still tracked");
    assert_eq!(progress.written(), 20);
}

#[test]
fn close_is_idempotent() {
    let mut harness = Harness::bound(10, 10);
    harness
        .signal(Signal::Close(CloseReason::Normal))
        .expect("close");
    harness
        .signal(Signal::Close(CloseReason::IdleTimeout))
        .expect("second close");
    assert_eq!(
        harness.non_usage_events(),
        vec![OutboundEvent::Closed(CloseReason::Normal)]
    );
    assert_eq!(
        harness.signal(send(1, request("late"))),
        Err(OutboundError::Terminated)
    );
}

#[test]
fn write_failure_terminates() {
    let mut harness = Harness::bound(10, 10);
    harness.signal(send(1, request("data"))).expect("send");
    harness
        .signal(Signal::WriteFailed("broken pipe".to_owned()))
        .expect("failure handled");
    assert_eq!(
        harness.non_usage_events(),
        vec![OutboundEvent::Closed(CloseReason::Transport(
            "broken pipe".to_owned()
        ))]
    );
}

#[rstest]
#[case(Signal::WriteCompleted, "write-completed")]
#[case(Signal::Bind, "bind")]
#[case(Signal::Handshake { to_path: TO.to_owned(), from_path: FROM.to_owned() }, "handshake")]
fn signals_outside_their_state_are_not_handled(
    #[case] signal: Signal,
    #[case] name: &'static str,
) {
    let mut harness = Harness::bound(10, 10);
    assert_eq!(
        harness.signal(signal),
        Err(OutboundError::NotHandled {
            state: OutboundState::Idle,
            signal: name,
        })
    );
}

#[test]
fn responses_before_binding_are_not_handled() {
    let mut harness = Harness::new(10, 10, 100);
    let err = harness
        .signal(Signal::ResponseReceived(response(
            &TransactionId::new("x0000"),
            200,
        )))
        .expect_err("not bound");
    assert!(matches!(
        err,
        OutboundError::NotHandled {
            state: OutboundState::Init,
            ..
        }
    ));
}

#[rstest]
#[case(&[0.2, 0.6, 0.55, 0.5], &[None, Some(false), None, Some(true)])]
#[case(&[0.51, 0.51, 0.49], &[Some(false), None, Some(true)])]
fn admission_gate_hysteresis(#[case] usage: &[f64], #[case] changes: &[Option<bool>]) {
    let mut gate = AdmissionGate::default();
    let observed: Vec<_> = usage.iter().map(|u| gate.update(*u)).collect();
    assert_eq!(observed, changes);
}

#[test]
fn admission_gate_with_separate_watermarks() {
    let mut gate = AdmissionGate::with_watermarks(0.8, 0.3);
    assert_eq!(gate.update(0.5), None);
    assert_eq!(gate.update(0.9), Some(false));
    assert_eq!(gate.update(0.5), None);
    assert!(!gate.is_admitting());
    assert_eq!(gate.update(0.3), Some(true));
}
