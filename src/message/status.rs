//! `Status`, `Success-Report`/`Failure-Report` values and the continuation
//! flag.

use std::{fmt, str::FromStr};

use super::HeaderValueError;

/// Trailing end-line marker of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Continuation {
    /// `+`: more chunks follow.
    More,
    /// `$`: the message is complete.
    Done,
    /// `#`: the sender abandoned the message.
    Aborted,
}

impl Continuation {
    /// Decode the end-line flag byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'+' => Some(Self::More),
            b'$' => Some(Self::Done),
            b'#' => Some(Self::Aborted),
            _ => None,
        }
    }

    /// Wire byte for this flag.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::More => b'+',
            Self::Done => b'$',
            Self::Aborted => b'#',
        }
    }

    /// Whether no further chunk of the message will follow.
    #[must_use]
    pub const fn is_final(self) -> bool { !matches!(self, Self::More) }
}

/// Value of `Success-Report` or `Failure-Report`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportFlag {
    /// `yes`
    Yes,
    /// `no`
    No,
    /// `partial`, only meaningful for `Failure-Report`.
    Partial,
}

impl ReportFlag {
    /// Header text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Partial => "partial",
        }
    }
}

impl FromStr for ReportFlag {
    type Err = HeaderValueError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "partial" => Ok(Self::Partial),
            _ => Err(HeaderValueError::new("report flag", raw)),
        }
    }
}

impl fmt::Display for ReportFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// `Status` header carried by REPORT requests: `NNN CCC [reason]`.
///
/// # Examples
///
/// ```
/// use msrpframe::message::Status;
/// let status: Status = "000 200 OK".parse().expect("valid status");
/// assert_eq!(status.code, 200);
/// assert!(status.is_success());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Status {
    /// Namespace, `000` for MSRP.
    pub namespace: u16,
    /// Three digit status code.
    pub code: u16,
    /// Optional human readable text.
    pub reason: Option<String>,
}

impl Status {
    /// Status in the MSRP namespace.
    #[must_use]
    pub fn new(code: u16, reason: Option<&str>) -> Self {
        Self {
            namespace: 0,
            code,
            reason: reason.map(str::to_owned),
        }
    }

    /// Whether the code is in the 2xx class.
    #[must_use]
    pub fn is_success(&self) -> bool { (200..300).contains(&self.code) }
}

fn three_digits(text: &str) -> Option<u16> {
    if text.len() == 3 && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

impl FromStr for Status {
    type Err = HeaderValueError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || HeaderValueError::new("Status", raw);
        let mut parts = raw.trim().splitn(3, ' ');
        let namespace = parts.next().and_then(three_digits).ok_or_else(invalid)?;
        let code = parts.next().and_then(three_digits).ok_or_else(invalid)?;
        let reason = parts
            .next()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_owned);
        Ok(Self {
            namespace,
            code,
            reason,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03} {:03}", self.namespace, self.code)?;
        if let Some(reason) = &self.reason {
            write!(f, " {reason}")?;
        }
        Ok(())
    }
}

/// Parse a three digit response code.
#[must_use]
pub fn parse_status_code(text: &str) -> Option<u16> { three_digits(text) }

/// Default reason phrase for well-known response codes.
#[must_use]
pub fn reason_phrase(code: u16) -> Option<&'static str> {
    Some(match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        408 => "Request Timeout",
        413 => "Stop Sending Message",
        415 => "Unsupported Media Type",
        423 => "Interval Out-of-Bounds",
        481 => "Session Does Not Exist",
        501 => "Unknown Method",
        506 => "Session Already Bound",
        _ => return None,
    })
}
