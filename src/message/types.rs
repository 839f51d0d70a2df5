//! Protocol units: requests, responses and reports.

use std::fmt;

use bytes::Bytes;

use super::{ByteRange, Continuation, Headers, MessageId, ReportFlag, Status, TransactionId};

/// Request method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// `SEND`
    Send,
    /// `REPORT`
    Report,
    /// Any other method name; answered with `501`.
    Extension(String),
}

impl Method {
    /// Parse a method keyword. Method names are case-sensitive.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "SEND" => Self::Send,
            "REPORT" => Self::Report,
            other => Self::Extension(other.to_owned()),
        }
    }

    /// Wire keyword.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Send => "SEND",
            Self::Report => "REPORT",
            Self::Extension(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Classification taken from the start line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A request other than `REPORT`.
    Request,
    /// A numeric status line.
    Response,
    /// A `REPORT` request.
    Report,
}

/// A request such as `SEND`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Transaction identifier of this chunk.
    pub transaction_id: TransactionId,
    /// Method keyword.
    pub method: Method,
    /// Header block.
    pub headers: Headers,
    /// Body bytes, including any embedded CPIM header block.
    pub body: Bytes,
    /// End-line flag.
    pub continuation: Continuation,
}

impl Request {
    /// Build a complete `SEND` carrying `body`.
    ///
    /// The byte range covers the whole body and the transaction identifier
    /// is assigned by the sender when the request is chunked.
    #[must_use]
    pub fn send(
        to_path: impl Into<String>,
        from_path: impl Into<String>,
        message_id: MessageId,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        let len = body.len() as u64;
        let headers = Headers {
            to_path: Some(to_path.into()),
            from_path: Some(from_path.into()),
            message_id: Some(message_id),
            byte_range: Some(ByteRange::new(1, Some(len), Some(len))),
            content_type: if body.is_empty() {
                None
            } else {
                content_type.map(str::to_owned)
            },
            ..Headers::default()
        };
        Self {
            transaction_id: TransactionId::new("unassigned"),
            method: Method::Send,
            headers,
            body,
            continuation: Continuation::Done,
        }
    }

    /// Set `Success-Report`.
    #[must_use]
    pub fn with_success_report(mut self, flag: ReportFlag) -> Self {
        self.headers.success_report = Some(flag);
        self
    }

    /// Set `Failure-Report`.
    #[must_use]
    pub fn with_failure_report(mut self, flag: ReportFlag) -> Self {
        self.headers.failure_report = Some(flag);
        self
    }

    /// Replace the transaction identifier.
    #[must_use]
    pub fn with_transaction_id(mut self, id: TransactionId) -> Self {
        self.transaction_id = id;
        self
    }
}

/// A transaction response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Transaction identifier of the request being answered.
    pub transaction_id: TransactionId,
    /// Three digit status code.
    pub code: u16,
    /// Optional reason phrase.
    pub reason: Option<String>,
    /// Header block; only the paths are meaningful.
    pub headers: Headers,
}

impl Response {
    /// Build a response to a request with the given transaction id and
    /// headers. Paths are reversed.
    #[must_use]
    pub fn to_request(transaction_id: &TransactionId, request: &Headers, code: u16) -> Self {
        Self {
            transaction_id: transaction_id.clone(),
            code,
            reason: super::status::reason_phrase(code).map(str::to_owned),
            headers: request.reversed_paths(),
        }
    }

    /// Whether the code is in the 2xx class.
    #[must_use]
    pub fn is_success(&self) -> bool { (200..300).contains(&self.code) }
}

/// A `REPORT` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Transaction identifier.
    pub transaction_id: TransactionId,
    /// Header block; `Status` is always present.
    pub headers: Headers,
    /// Body, normally empty.
    pub body: Bytes,
}

impl Report {
    /// Build a delivery report for the message described by `request`.
    ///
    /// `received` is the number of bytes covered by the report.
    #[must_use]
    pub fn for_message(request: &Headers, status: Status, received: u64) -> Self {
        let mut headers = request.reversed_paths();
        headers.message_id.clone_from(&request.message_id);
        let total = request
            .byte_range
            .and_then(|range| range.total)
            .or(Some(received));
        headers.byte_range = Some(ByteRange::new(1, Some(received), total));
        headers.status = Some(status);
        Self {
            transaction_id: TransactionId::new("unassigned"),
            headers,
            body: Bytes::new(),
        }
    }

    /// `Status` header; reports built by this crate always carry one.
    #[must_use]
    pub fn status(&self) -> Option<&Status> { self.headers.status.as_ref() }
}

/// Any protocol unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// `SEND` or an extension method.
    Request(Request),
    /// Transaction response.
    Response(Response),
    /// `REPORT` request.
    Report(Report),
}

impl Message {
    /// Transaction identifier on the start line.
    #[must_use]
    pub fn transaction_id(&self) -> &TransactionId {
        match self {
            Self::Request(r) => &r.transaction_id,
            Self::Response(r) => &r.transaction_id,
            Self::Report(r) => &r.transaction_id,
        }
    }

    /// Start-line classification.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request(_) => MessageKind::Request,
            Self::Response(_) => MessageKind::Response,
            Self::Report(_) => MessageKind::Report,
        }
    }

    /// Header block.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        match self {
            Self::Request(r) => &r.headers,
            Self::Response(r) => &r.headers,
            Self::Report(r) => &r.headers,
        }
    }

    /// Body bytes; responses have none.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        match self {
            Self::Request(r) => &r.body,
            Self::Response(_) => &[],
            Self::Report(r) => &r.body,
        }
    }

    /// Whether the unit jumps the request queue and may interrupt a chunk.
    #[must_use]
    pub fn is_priority(&self) -> bool { !matches!(self, Self::Request(_)) }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self { Self::Request(value) }
}

impl From<Response> for Message {
    fn from(value: Response) -> Self { Self::Response(value) }
}

impl From<Report> for Message {
    fn from(value: Report) -> Self { Self::Report(value) }
}
