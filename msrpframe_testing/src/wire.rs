//! Hand-built wire units and byte splitting.
//!
//! Units here are written out literally rather than through the crate's
//! marshaller, so tests can check the two against each other.

use bytes::BytesMut;
use msrpframe::{ChunkPiece, MsrpCodec};
use tokio_util::codec::Decoder;

use crate::peer::{LOCAL_PATH, REMOTE_PATH};

/// A `SEND` from the remote peer to the local session.
///
/// `flag` is the end-line continuation byte (`$`, `+` or `#`).
#[must_use]
pub fn send_request(txid: &str, message_id: &str, range: &str, body: &[u8], flag: u8) -> Vec<u8> {
    let mut wire = format!(
        "MSRP {txid} SEND\r\nTo-Path: {LOCAL_PATH}\r\nFrom-Path: {REMOTE_PATH}\r\n\
         Message-ID: {message_id}\r\nByte-Range: {range}\r\n"
    )
    .into_bytes();
    if body.is_empty() {
        wire.extend_from_slice(format!("-------{txid}").as_bytes());
    } else {
        wire.extend_from_slice(b"Content-Type: text/plain\r\n\r\n");
        wire.extend_from_slice(body);
        wire.extend_from_slice(format!("\r\n-------{txid}").as_bytes());
    }
    wire.push(flag);
    wire.extend_from_slice(b"\r\n");
    wire
}

/// A response from the remote peer to the local session.
#[must_use]
pub fn response(txid: &str, code: u16, reason: &str) -> Vec<u8> {
    format!(
        "MSRP {txid} {code} {reason}\r\nTo-Path: {LOCAL_PATH}\r\nFrom-Path: {REMOTE_PATH}\r\n\
         -------{txid}$\r\n"
    )
    .into_bytes()
}

/// Cut `bytes` into fragments of at most `size` bytes.
///
/// # Panics
///
/// Panics if `size` is zero.
#[must_use]
pub fn split_every(bytes: &[u8], size: usize) -> Vec<Vec<u8>> {
    assert!(size > 0, "fragment size must be positive");
    bytes.chunks(size).map(<[u8]>::to_vec).collect()
}

/// Cut `bytes` at the given offsets. Offsets beyond the end, duplicates and
/// unsorted input are tolerated.
#[must_use]
pub fn split_at_points(bytes: &[u8], points: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = points
        .iter()
        .map(|point| (*point).min(bytes.len()))
        .collect();
    cuts.sort_unstable();
    cuts.dedup();
    let mut fragments = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        fragments.push(bytes[start..cut].to_vec());
        start = cut;
    }
    fragments.push(bytes[start..].to_vec());
    fragments
}

/// Decode fragments the way a connection reader receives them.
///
/// # Panics
///
/// Panics on a protocol error.
#[must_use]
pub fn decode_fragments<B: AsRef<[u8]>>(fragments: &[B]) -> Vec<ChunkPiece> {
    let mut codec = MsrpCodec::new();
    let mut buffer = BytesMut::new();
    let mut pieces = Vec::new();
    for fragment in fragments {
        buffer.extend_from_slice(fragment.as_ref());
        while let Some(piece) = codec.decode(&mut buffer).expect("valid wire") {
            pieces.push(piece);
        }
    }
    pieces
}
