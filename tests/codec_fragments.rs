//! Decoding must not depend on how the byte stream was fragmented.

use bytes::BytesMut;
use msrpframe::{
    Message,
    MessageId,
    Request,
    Response,
    TransactionId,
    marshal::encode_message,
    parser::PieceKind,
};
use msrpframe_testing::{decode_fragments, split_at_points, wire};
use proptest::prelude::*;

fn stream() -> Vec<u8> {
    let mut bytes = wire::send_request("tx01", "m1", "1-14/14", "héllo wörld!".as_bytes(), b'$');
    bytes.extend(wire::response("rx01", 200, "OK"));
    let request = Request::send(
        "msrp://b.example.com/2;tcp",
        "msrp://a.example.com/1;tcp",
        MessageId::new("m2"),
        Some("text/plain"),
        "line one\r\n-------notanendline$\r\nline two",
    )
    .with_transaction_id(TransactionId::new("tx02"));
    let mut encoded = BytesMut::new();
    encode_message(&Message::Request(request), &mut encoded);
    bytes.extend_from_slice(&encoded);
    bytes.extend(wire::send_request("tx03", "m3", "1-*/*", b"open ended", b'+'));
    bytes
}

/// Bodies of every unit, joined per transaction, plus the count of units.
fn summarise(fragments: &[Vec<u8>]) -> (Vec<(String, Vec<u8>)>, usize) {
    let mut bodies: Vec<(String, Vec<u8>)> = Vec::new();
    let mut units = 0;
    for piece in decode_fragments(fragments) {
        let txid = piece.transaction_id().as_str().to_owned();
        match bodies.last_mut() {
            Some((last, body)) if *last == txid => body.extend_from_slice(piece.body()),
            _ => bodies.push((txid, piece.body().to_vec())),
        }
        if piece.kind().is_terminal() {
            units += 1;
        }
    }
    (bodies, units)
}

#[test]
fn whole_stream_decodes_into_four_units() {
    let (bodies, units) = summarise(&[stream()]);
    assert_eq!(units, 4);
    assert_eq!(bodies[0].1, "héllo wörld!".as_bytes());
    assert!(bodies[1].1.is_empty());
    assert_eq!(bodies[2].1, b"line one\r\n-------notanendline$\r\nline two");
    assert_eq!(bodies[3].1, b"open ended");
}

#[test]
fn terminal_pieces_rebuild_their_units() {
    let pieces = decode_fragments(&[stream()]);
    let response = pieces
        .into_iter()
        .find(|piece| piece.transaction_id().as_str() == "rx01")
        .expect("response piece");
    assert_eq!(response.kind(), PieceKind::Complete);
    match response.into_message() {
        Some(Message::Response(Response { code, .. })) => assert_eq!(code, 200),
        other => panic!("expected a response, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn any_fragmentation_yields_the_same_units(
        cuts in proptest::collection::vec(0..400usize, 0..24),
    ) {
        let bytes = stream();
        let expected = summarise(&[bytes.clone()]);
        let fragments = split_at_points(&bytes, &cuts);
        prop_assert_eq!(summarise(&fragments), expected);
    }
}
