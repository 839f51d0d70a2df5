//! Identifier newtypes and the transaction identifier generator.

use std::{
    fmt::Write as _,
    sync::atomic::{AtomicU64, Ordering},
};

use derive_more::{Display, From, Into};

/// Correlates a request with its response; unique per physical write when
/// a message is chunked.
///
/// # Examples
///
/// ```
/// use msrpframe::message::TransactionId;
/// let id = TransactionId::new("a786hjs2");
/// assert_eq!(id.as_str(), "a786hjs2");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }

    /// Whether `text` is a well-formed identifier: an alphanumeric followed
    /// by 3 to 31 alphanumerics or `.-+%=`.
    #[must_use]
    pub fn is_valid(text: &str) -> bool {
        let bytes = text.as_bytes();
        (4..=32).contains(&bytes.len())
            && bytes[0].is_ascii_alphanumeric()
            && bytes[1..]
                .iter()
                .all(|b| b.is_ascii_alphanumeric() || b".-+%=".contains(b))
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// Identifies a logical message across all of its chunks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// Application supplied handle used to correlate sends with outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Create a new correlation identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self { Self(value) }

    /// Return the inner value.
    #[must_use]
    pub const fn get(self) -> u64 { self.0 }
}

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Produces unique transaction and message identifiers.
///
/// Identifiers combine a per-generator prefix with a base-36 counter so two
/// generators with different prefixes never collide.
#[derive(Debug)]
pub struct TransactionIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl TransactionIdGenerator {
    /// Create a generator. `prefix` must be alphanumeric and at most 16
    /// characters; anything else is filtered out.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        let mut prefix: String = prefix
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(16)
            .collect();
        if prefix.is_empty() {
            prefix.push('t');
        }
        Self {
            prefix,
            next: AtomicU64::new(0),
        }
    }

    fn next_suffix(&self) -> String {
        let mut value = self.next.fetch_add(1, Ordering::Relaxed);
        let mut digits = Vec::with_capacity(13);
        loop {
            digits.push(ALPHABET[(value % 36) as usize]);
            value /= 36;
            if value == 0 {
                break;
            }
        }
        let mut out = String::with_capacity(self.prefix.len() + 4 + digits.len());
        out.push_str(&self.prefix);
        // Pad so that the shortest identifier still satisfies the 4 byte minimum.
        for _ in digits.len()..4 {
            out.push('0');
        }
        for digit in digits.iter().rev() {
            let _ = out.write_char(char::from(*digit));
        }
        out
    }

    /// Next transaction identifier.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId { TransactionId(self.next_suffix()) }

    /// Next message identifier.
    #[must_use]
    pub fn message_id(&self) -> MessageId { MessageId(self.next_suffix()) }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self { Self::new("t") }
}
