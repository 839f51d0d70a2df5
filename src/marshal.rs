//! Serialisation of protocol units and chunk pieces to wire bytes.
//!
//! Header lines are written in a fixed order: `To-Path`, `From-Path`,
//! `Message-ID`, `Success-Report`, `Failure-Report`, `Byte-Range`, `Status`,
//! extension headers, then `Content-Type` and `Content-Disposition`. A unit
//! without a body has no blank line; its end-line follows the headers
//! directly.

use bytes::{BufMut, BytesMut};

use crate::{
    message::{Continuation, Headers, Message, Method, TransactionId},
    parser::{END_LINE_PREAMBLE, PROTOCOL_PREFIX, StartLine},
};

fn needs_quoting(value: &str) -> bool {
    const BLANKS: [char; 2] = [' ', '\t'];
    value.contains(['"', '\r', '\n']) || value.starts_with(BLANKS) || value.ends_with(BLANKS)
}

fn put_header(dst: &mut BytesMut, name: &str, value: &str) {
    dst.put_slice(name.as_bytes());
    dst.put_slice(b": ");
    if needs_quoting(value) {
        dst.put_u8(b'"');
        for byte in value.bytes() {
            if matches!(byte, b'"' | b'\\') {
                dst.put_u8(b'\\');
            }
            dst.put_u8(byte);
        }
        dst.put_u8(b'"');
    } else {
        dst.put_slice(value.as_bytes());
    }
    dst.put_slice(b"\r\n");
}

fn put_headers(dst: &mut BytesMut, headers: &Headers) {
    if let Some(path) = &headers.to_path {
        put_header(dst, "To-Path", path);
    }
    if let Some(path) = &headers.from_path {
        put_header(dst, "From-Path", path);
    }
    if let Some(id) = &headers.message_id {
        put_header(dst, "Message-ID", id.as_str());
    }
    if let Some(flag) = headers.success_report {
        put_header(dst, "Success-Report", flag.as_str());
    }
    if let Some(flag) = headers.failure_report {
        put_header(dst, "Failure-Report", flag.as_str());
    }
    if let Some(range) = headers.byte_range {
        put_header(dst, "Byte-Range", &range.to_string());
    }
    if let Some(status) = &headers.status {
        put_header(dst, "Status", &status.to_string());
    }
    for (name, value) in &headers.extensions {
        put_header(dst, name, value);
    }
    if let Some(content_type) = &headers.content_type {
        put_header(dst, "Content-Type", content_type);
    }
    if let Some(disposition) = &headers.content_disposition {
        put_header(dst, "Content-Disposition", disposition);
    }
}

/// Write the start line, the header block and, when `has_body` is set, the
/// blank line that precedes the body.
pub fn encode_piece_head(
    transaction_id: &TransactionId,
    start_line: &StartLine,
    headers: &Headers,
    has_body: bool,
    dst: &mut BytesMut,
) {
    dst.put_slice(PROTOCOL_PREFIX);
    dst.put_u8(b' ');
    dst.put_slice(transaction_id.as_str().as_bytes());
    dst.put_u8(b' ');
    match start_line {
        StartLine::Request(method) => dst.put_slice(method.as_str().as_bytes()),
        StartLine::Response { code, reason } => {
            dst.put_slice(format!("{code:03}").as_bytes());
            if let Some(reason) = reason {
                dst.put_u8(b' ');
                dst.put_slice(reason.as_bytes());
            }
        }
    }
    dst.put_slice(b"\r\n");
    put_headers(dst, headers);
    if has_body {
        dst.put_slice(b"\r\n");
    }
}

/// Write the end-line. `after_body` adds the CRLF that separates it from the
/// body; without a body the CRLF of the last header line serves.
pub fn encode_end_line(
    transaction_id: &TransactionId,
    continuation: Continuation,
    after_body: bool,
    dst: &mut BytesMut,
) {
    if after_body {
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(END_LINE_PREAMBLE);
    dst.put_slice(transaction_id.as_str().as_bytes());
    dst.put_u8(continuation.as_byte());
    dst.put_slice(b"\r\n");
}

/// Serialise a complete unit as a single chunk.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use msrpframe::{
///     marshal::encode_message,
///     message::{Message, MessageId, Request, TransactionId},
/// };
///
/// let request = Request::send("msrp://b/2;tcp", "msrp://a/1;tcp", MessageId::new("m1"), None, "")
///     .with_transaction_id(TransactionId::new("tx01"));
/// let mut wire = BytesMut::new();
/// encode_message(&Message::Request(request), &mut wire);
/// assert!(wire.ends_with(b"Byte-Range: 1-0/0\r\n-------tx01$\r\n"));
/// ```
pub fn encode_message(message: &Message, dst: &mut BytesMut) {
    let body = message.body();
    let has_body = !body.is_empty();
    let (start_line, continuation) = match message {
        Message::Request(request) => (
            StartLine::Request(request.method.clone()),
            request.continuation,
        ),
        Message::Response(response) => (
            StartLine::Response {
                code: response.code,
                reason: response.reason.clone(),
            },
            Continuation::Done,
        ),
        Message::Report(_) => (StartLine::Request(Method::Report), Continuation::Done),
    };
    let transaction_id = message.transaction_id();
    dst.reserve(256 + body.len());
    encode_piece_head(transaction_id, &start_line, message.headers(), has_body, dst);
    dst.put_slice(body);
    encode_end_line(transaction_id, continuation, has_body, dst);
}
