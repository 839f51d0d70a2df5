//! End-to-end tests: sessions exchanging chunked traffic over in-memory pipes.

use std::time::Duration;

use bytes::Bytes;
use msrpframe::{
    CloseReason,
    MessageId,
    Request,
    Session,
    SessionConfig,
    SessionContext,
    SessionHandle,
    WriterTransport,
    message::ReportFlag,
};
use msrpframe_testing::{
    EventStream,
    LOCAL_PATH,
    LoggerHandle,
    RecordingListener,
    RecordingTransport,
    SessionEvent,
    logger,
    open_session,
    split_every,
    wire,
};
use rstest::rstest;

const ALICE: &str = "msrp://alice.example.com:7777/a1;tcp";
const BOB: &str = "msrp://bob.example.com:8888/b1;tcp";

fn body(len: usize) -> Bytes {
    (0..len)
        .map(|i| b"0123456789abcdef"[i % 16])
        .collect::<Vec<_>>()
        .into()
}

struct Endpoint {
    handle: SessionHandle,
    events: EventStream,
}

/// Alice connects to Bob over one duplex pipe.
fn pair(config: &SessionConfig) -> (Endpoint, Endpoint) {
    let (alice_io, bob_io) = tokio::io::duplex(16 * 1024);
    let (alice_read, alice_write) = tokio::io::split(alice_io);
    let (bob_read, bob_write) = tokio::io::split(bob_io);
    let (alice_transport, _) = WriterTransport::spawn(alice_write);
    let (bob_transport, _) = WriterTransport::spawn(bob_write);
    let (alice_listener, alice_events) = RecordingListener::channel();
    let (bob_listener, bob_events) = RecordingListener::channel();

    let bob = Session::new(config.clone()).expect("config").accept(
        bob_transport,
        bob_read,
        SessionContext::new(BOB, ALICE),
        bob_listener,
    );
    let alice = Session::new(config.clone()).expect("config").connect(
        alice_transport,
        alice_read,
        SessionContext::new(ALICE, BOB),
        alice_listener,
    );
    (
        Endpoint {
            handle: alice,
            events: alice_events,
        },
        Endpoint {
            handle: bob,
            events: bob_events,
        },
    )
}

#[rstest]
#[case::single_chunk(10, 64)]
#[case::exact_multiple(64, 16)]
#[case::ragged(100, 16)]
#[tokio::test]
async fn chunked_message_arrives_intact(#[case] size: usize, #[case] chunk: usize) {
    let config = SessionConfig::builder()
        .max_chunk_size(chunk)
        .build()
        .expect("valid config");
    let (mut alice, mut bob) = pair(&config);
    assert_eq!(alice.events.next().await, SessionEvent::Bound);

    let payload = body(size);
    let request = Request::send(BOB, ALICE, MessageId::new("big-1"), Some("text/plain"), payload.clone())
        .with_success_report(ReportFlag::Yes);
    let correlation = alice.handle.send(request).await.expect("send");

    // Bob binds on the handshake before the payload arrives.
    assert_eq!(bob.events.next().await, SessionEvent::Bound);
    let received = bob.events.message().await;
    assert_eq!(received.message_id(), &MessageId::new("big-1"));
    assert_eq!(received.body(), &payload);

    assert_eq!(
        alice.events.next().await,
        SessionEvent::Response(correlation, 200)
    );
    match alice.events.next().await {
        SessionEvent::Report(report) => {
            assert_eq!(report.headers.message_id, Some(MessageId::new("big-1")));
            assert_eq!(report.status().map(|status| status.code), Some(200));
        }
        other => panic!("expected a success report, got {other:?}"),
    }
}

#[tokio::test]
async fn both_directions_share_the_connection() {
    let (mut alice, mut bob) = pair(&SessionConfig::default());
    assert_eq!(alice.events.next().await, SessionEvent::Bound);

    alice
        .handle
        .send(Request::send(BOB, ALICE, MessageId::new("a-1"), Some("text/plain"), "ping"))
        .await
        .expect("send");
    assert_eq!(bob.events.next().await, SessionEvent::Bound);
    assert_eq!(bob.events.message().await.body().as_ref(), b"ping");

    let reply = bob
        .handle
        .send(Request::send(ALICE, BOB, MessageId::new("b-1"), Some("text/plain"), "pong"))
        .await
        .expect("send");
    let mut saw_pong = false;
    let mut saw_reply_response = false;
    while !(saw_pong && saw_reply_response) {
        tokio::select! {
            event = alice.events.next() => match event {
                SessionEvent::Message(message) => {
                    assert_eq!(message.body().as_ref(), b"pong");
                    saw_pong = true;
                }
                SessionEvent::Response(..) => {}
                other => panic!("unexpected event at alice: {other:?}"),
            },
            event = bob.events.next() => {
                assert_eq!(event, SessionEvent::Response(reply, 200));
                saw_reply_response = true;
            }
        }
    }
}

#[tokio::test]
async fn closing_one_side_closes_the_other() {
    let (mut alice, bob) = pair(&SessionConfig::default());
    assert_eq!(alice.events.next().await, SessionEvent::Bound);
    alice.handle.close().await.expect("close");
    assert_eq!(alice.handle.closed().await, CloseReason::Normal);
    let reason = tokio::time::timeout(Duration::from_secs(5), bob.handle.closed())
        .await
        .expect("bob noticed the close");
    assert!(matches!(
        reason,
        CloseReason::Normal | CloseReason::Transport(_)
    ));
}

#[rstest]
#[case::byte_by_byte(1)]
#[case::small(7)]
#[case::large(4096)]
#[tokio::test]
async fn fragmented_inbound_chunks_reassemble(#[case] fragment: usize) {
    let mut pair = open_session(SessionConfig::default(), false);
    let mut stream = wire::send_request("tx01", "m1", "1-5/11", b"hello", b'+');
    stream.extend(wire::send_request("tx02", "m1", "6-11/11", b" world", b'$'));
    for piece in split_every(&stream, fragment) {
        pair.peer.write_raw(&piece).await;
    }

    for txid in ["tx01", "tx02"] {
        let response = pair.peer.next_message().await;
        assert_eq!(response.transaction_id().as_str(), txid);
    }
    assert_eq!(pair.events.next().await, SessionEvent::Bound);
    assert_eq!(pair.events.message().await.body().as_ref(), b"hello world");
}

#[tokio::test]
async fn aborted_inbound_message_is_not_delivered() {
    let mut pair = open_session(SessionConfig::default(), false);
    pair.peer
        .write_raw(&wire::send_request("tx01", "m1", "1-5/10", b"hello", b'+'))
        .await;
    pair.peer
        .write_raw(&wire::send_request("tx02", "m1", "6-5/10", b"", b'#'))
        .await;
    pair.peer
        .write_raw(&wire::send_request("tx03", "m2", "1-4/4", b"next", b'$'))
        .await;
    for _ in 0..3 {
        pair.peer.next_message().await;
    }
    assert_eq!(pair.events.next().await, SessionEvent::Bound);
    let message = pair.events.message().await;
    assert_eq!(message.message_id(), &MessageId::new("m2"));
}

#[tokio::test]
async fn write_failure_closes_with_transport_reason() {
    let (_peer_io, ours) = tokio::io::duplex(1024);
    let transport = RecordingTransport::failing_after(0);
    let (listener, mut events) = RecordingListener::channel();
    let handle = Session::new(SessionConfig::default())
        .expect("config")
        .connect(
            transport.clone(),
            ours,
            SessionContext::new(LOCAL_PATH, BOB),
            listener,
        );
    assert!(matches!(handle.closed().await, CloseReason::Transport(_)));
    assert!(matches!(
        events.next().await,
        SessionEvent::Closed(CloseReason::Transport(_))
    ));
    assert!(transport.writes().is_empty());
}

#[rstest]
#[tokio::test]
async fn lifecycle_is_logged(mut logger: LoggerHandle) {
    let mut pair = open_session(SessionConfig::default(), true);
    pair.bind().await;
    pair.handle.close().await.expect("close");
    assert_eq!(pair.handle.closed().await, CloseReason::Normal);

    assert!(!logger.messages_containing("session bound").is_empty());
}
