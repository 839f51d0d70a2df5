//! `Byte-Range` header value.

use std::{fmt, str::FromStr};

use super::HeaderValueError;

/// Position of a chunk within its logical message.
///
/// `start` is 1-based as on the wire. `end` and `total` are `None` when
/// unknown; the wire form is `*` (a `-1` from lenient peers is accepted).
///
/// # Examples
///
/// ```
/// use msrpframe::message::ByteRange;
/// let range: ByteRange = "1-25/25".parse().expect("valid range");
/// assert_eq!(range.offset(), 0);
/// assert_eq!(range.end, Some(25));
/// assert_eq!(range.to_string(), "1-25/25");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// First byte of the chunk, counting from 1.
    pub start: u64,
    /// Last byte of the chunk, if known.
    pub end: Option<u64>,
    /// Length of the whole message, if known.
    pub total: Option<u64>,
}

impl ByteRange {
    /// Build a range.
    #[must_use]
    pub const fn new(start: u64, end: Option<u64>, total: Option<u64>) -> Self {
        Self { start, end, total }
    }

    /// Range assumed for a request that omits the header: first segment,
    /// unknown end and total.
    #[must_use]
    pub const fn first_unknown() -> Self { Self::new(1, None, None) }

    /// Zero-based offset of the chunk's first byte.
    #[must_use]
    pub const fn offset(&self) -> u64 { self.start.saturating_sub(1) }

    /// Whether this chunk starts the message.
    #[must_use]
    pub const fn is_first(&self) -> bool { self.start == 1 }

    /// Whether the chunk length is left open, which allows the sender to
    /// interrupt it.
    #[must_use]
    pub const fn is_open_ended(&self) -> bool { self.end.is_none() }
}

impl Default for ByteRange {
    fn default() -> Self { Self::first_unknown() }
}

fn parse_bound(text: &str, raw: &str) -> Result<Option<u64>, HeaderValueError> {
    match text {
        "*" | "-1" => Ok(None),
        _ => text
            .parse()
            .map(Some)
            .map_err(|_| HeaderValueError::new("Byte-Range", raw)),
    }
}

impl FromStr for ByteRange {
    type Err = HeaderValueError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || HeaderValueError::new("Byte-Range", raw);
        let (range, total) = raw.trim().split_once('/').ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let start: u64 = start.parse().map_err(|_| invalid())?;
        if start == 0 {
            return Err(invalid());
        }
        let end = parse_bound(end, raw)?;
        let total = parse_bound(total, raw)?;
        if let (Some(end), Some(total)) = (end, total) {
            if end > total {
                return Err(invalid());
            }
        }
        Ok(Self { start, end, total })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.start)?;
        match self.end {
            Some(end) => write!(f, "{end}")?,
            None => f.write_str("*")?,
        }
        match self.total {
            Some(total) => write!(f, "/{total}"),
            None => f.write_str("/*"),
        }
    }
}
