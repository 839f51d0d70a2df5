//! Tests for inbound reassembly.

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use bytes::BytesMut;
use rstest::{fixture, rstest};
use tokio_util::codec::Decoder;

use super::*;
use crate::{
    codec::MsrpCodec,
    marshal::{encode_end_line, encode_piece_head},
    message::{Continuation, Headers, MessageId, Method, TransactionId},
    parser::{PieceKind, StartLine},
};

const TIMEOUT: Duration = Duration::from_secs(30);

#[fixture]
fn reassembler() -> Reassembler {
    Reassembler::new(NonZeroUsize::new(64).expect("non-zero"), TIMEOUT)
}

fn chunk(id: &str, range: &str, content_type: &str, body: &[u8], flag: Continuation) -> Vec<u8> {
    let mut headers = Headers::default();
    for (name, value) in [
        ("To-Path", "msrp://b.example.com/2;tcp"),
        ("From-Path", "msrp://a.example.com/1;tcp"),
        ("Message-ID", "m1"),
        ("Byte-Range", range),
        ("Content-Type", content_type),
    ] {
        headers.insert(name, value).expect("valid header");
    }
    let id = TransactionId::new(id);
    let mut wire = BytesMut::new();
    let has_body = !body.is_empty();
    encode_piece_head(&id, &StartLine::Request(Method::Send), &headers, has_body, &mut wire);
    wire.extend_from_slice(body);
    encode_end_line(&id, flag, has_body, &mut wire);
    wire.to_vec()
}

fn text(id: &str, range: &str, body: &str, flag: Continuation) -> Vec<u8> {
    chunk(id, range, "text/plain", body.as_bytes(), flag)
}

fn pieces(wire: &[u8]) -> Vec<ChunkPiece> {
    let mut codec = MsrpCodec::new();
    let mut buf = BytesMut::from(wire);
    let mut out = Vec::new();
    while let Some(piece) = codec.decode(&mut buf).expect("valid wire") {
        out.push(piece);
    }
    out
}

fn feed(reassembler: &mut Reassembler, wire: &[u8]) -> Vec<Reassembly> {
    pieces(wire)
        .iter()
        .map(|piece| reassembler.push(piece).expect("accepted"))
        .collect()
}

fn completed(outcome: &Reassembly) -> &ReassembledMessage {
    match outcome {
        Reassembly::Complete(message) => message,
        other => panic!("expected a complete message, got {other:?}"),
    }
}

#[rstest]
fn single_chunk_completes(mut reassembler: Reassembler) {
    let outcomes = feed(
        &mut reassembler,
        &text("tx01", "1-5/5", "hello", Continuation::Done),
    );
    let message = completed(&outcomes[0]);
    assert_eq!(message.message_id(), &MessageId::new("m1"));
    assert_eq!(message.body().as_ref(), b"hello");
    assert_eq!(message.content_type(), Some("text/plain"));
    assert_eq!(reassembler.buffered_len(), 0);
}

#[rstest]
#[case::in_order(&[("tx01", "1-5/10", "abcde", Continuation::More), ("tx02", "6-10/10", "fghij", Continuation::Done)])]
#[case::reversed(&[("tx02", "6-10/10", "fghij", Continuation::Done), ("tx01", "1-5/10", "abcde", Continuation::More)])]
fn chunks_are_placed_by_offset(
    mut reassembler: Reassembler,
    #[case] chunks: &[(&str, &str, &str, Continuation)],
) {
    let wire: Vec<u8> = chunks
        .iter()
        .flat_map(|(id, range, body, flag)| text(id, range, body, *flag))
        .collect();
    let outcomes = feed(&mut reassembler, &wire);
    assert_eq!(outcomes[0], Reassembly::Incomplete);
    assert_eq!(completed(&outcomes[1]).body().as_ref(), b"abcdefghij");
}

#[rstest]
fn repeated_bytes_do_not_fill_gaps(mut reassembler: Reassembler) {
    let mut wire = text("tx01", "1-4/8", "abcd", Continuation::More);
    wire.extend(text("tx02", "1-4/8", "abcd", Continuation::More));
    wire.extend(text("tx03", "8-8/8", "h", Continuation::Done));
    let outcomes = feed(&mut reassembler, &wire);
    assert_eq!(outcomes, vec![Reassembly::Incomplete; 3]);
    assert_eq!(reassembler.buffered_len(), 1);

    let outcomes = feed(
        &mut reassembler,
        &text("tx04", "3-7/8", "cdefg", Continuation::More),
    );
    assert_eq!(completed(&outcomes[0]).body().as_ref(), b"abcdefgh");
}

#[rstest]
fn interrupted_pieces_accumulate(mut reassembler: Reassembler) {
    let wire = text("tx01", "1-*/10", "0123456789", Continuation::Done);
    let split = wire.len() - 14;
    let mut codec = MsrpCodec::new();
    let mut buf = BytesMut::from(&wire[..split]);
    let head = codec.decode(&mut buf).expect("head").expect("partial piece");
    assert_eq!(head.kind(), PieceKind::Head);
    assert_eq!(
        reassembler.push(&head).expect("head accepted"),
        Reassembly::Incomplete
    );
    buf.extend_from_slice(&wire[split..]);
    let tail = codec.decode(&mut buf).expect("tail").expect("terminal piece");
    let outcome = reassembler.push(&tail).expect("tail accepted");
    assert_eq!(completed(&outcome).body().as_ref(), b"0123456789");
}

#[rstest]
fn aborted_messages_are_dropped(mut reassembler: Reassembler) {
    let mut wire = text("tx01", "1-5/10", "abcde", Continuation::More);
    wire.extend(text("tx02", "6-5/10", "", Continuation::Aborted));
    let outcomes = feed(&mut reassembler, &wire);
    assert_eq!(outcomes[1], Reassembly::Aborted(MessageId::new("m1")));
    assert_eq!(reassembler.buffered_len(), 0);
}

#[test]
fn oversized_messages_are_rejected() {
    let mut reassembler = Reassembler::new(NonZeroUsize::new(8).expect("non-zero"), TIMEOUT);
    let piece = pieces(&text("tx01", "1-5/10", "abcde", Continuation::More))
        .pop()
        .expect("piece");
    let err = reassembler.push(&piece).expect_err("too large");
    assert_eq!(
        err,
        ReassemblyError::MessageTooLarge {
            message_id: MessageId::new("m1"),
            attempted: 10,
            limit: NonZeroUsize::new(8).expect("non-zero"),
        }
    );
    assert_eq!(err.status_code(), 413);
    assert_eq!(reassembler.buffered_len(), 0);
}

#[rstest]
fn stale_partials_are_purged(mut reassembler: Reassembler) {
    let start = Instant::now();
    let piece = pieces(&text("tx01", "1-5/10", "abcde", Continuation::More))
        .pop()
        .expect("piece");
    reassembler.push_at(&piece, start).expect("accepted");
    assert!(
        reassembler
            .purge_expired_at(start + TIMEOUT - Duration::from_millis(1))
            .is_empty()
    );
    assert_eq!(
        reassembler.purge_expired_at(start + TIMEOUT),
        vec![MessageId::new("m1")]
    );
    assert_eq!(reassembler.buffered_len(), 0);
}

#[test]
fn cpim_content_skips_the_nested_block() {
    let block = b"From: <im:alice@example.com>\r\nTo: <im:bob@example.com>\r\n\r\nContent-Type: text/plain\r\n\r\n";
    let mut body = block.to_vec();
    body.extend_from_slice(b"hi");
    let wire = chunk("tx01", "1-*/*", "message/cpim", &body, Continuation::Done);
    let mut reassembler = Reassembler::new(NonZeroUsize::new(1024).expect("non-zero"), TIMEOUT);
    let outcomes = feed(&mut reassembler, &wire);
    let message = completed(outcomes.last().expect("outcome"));
    assert_eq!(message.content().as_ref(), b"hi");
    assert_eq!(message.body().len(), block.len() + 2);
    let cpim = message.headers().cpim.as_ref().expect("cpim headers");
    assert_eq!(cpim.content_type(), Some("text/plain"));
}
