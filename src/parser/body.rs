//! Body scanning and end-line detection.

use bytes::BytesMut;

use super::{ParseError, line::END_LINE_PREAMBLE};
use crate::{
    message::{Continuation, TransactionId},
    tokenizer::Input,
};

/// Result of scanning the available bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Scan {
    /// Input ran out before the end-line.
    Exhausted,
    /// The end-line was consumed.
    Terminated(Continuation),
}

/// Incremental matcher for `CRLF ------- <tid> <flag> CRLF`.
///
/// Bytes that may still turn out to be the end-line are held in
/// `candidate` rather than in the body; they are released to the body as
/// soon as the match fails.
#[derive(Debug)]
pub(super) struct EndLineScanner {
    expected: Vec<u8>,
    flag_at: usize,
    candidate: Vec<u8>,
    strict: bool,
}

impl EndLineScanner {
    pub(super) fn new(transaction_id: &TransactionId) -> Self {
        let mut expected = Vec::with_capacity(END_LINE_PREAMBLE.len() + 40);
        expected.extend_from_slice(b"\r\n");
        expected.extend_from_slice(END_LINE_PREAMBLE);
        expected.extend_from_slice(transaction_id.as_str().as_bytes());
        let flag_at = expected.len();
        expected.extend_from_slice(b"$\r\n");
        Self {
            expected,
            flag_at,
            candidate: Vec::new(),
            strict: false,
        }
    }

    /// Scanner for a unit without a body: the CRLF that closed the last
    /// header line is the leading CRLF of the end-line, and anything other
    /// than the end-line is an error.
    pub(super) fn after_headers(transaction_id: &TransactionId) -> Self {
        let mut scanner = Self::new(transaction_id);
        scanner.candidate.extend_from_slice(b"\r\n");
        scanner.strict = true;
        scanner
    }

    /// Number of consumed bytes held back as a possible end-line prefix.
    pub(super) fn held(&self) -> usize { self.candidate.len() }

    fn accepts(&self, index: usize, byte: u8) -> bool {
        if index == self.flag_at {
            Continuation::from_byte(byte).is_some()
        } else {
            self.expected.get(index) == Some(&byte)
        }
    }

    /// Whether `bytes` could be the start of the end-line.
    fn is_prefix(&self, bytes: &[u8]) -> bool {
        bytes
            .iter()
            .enumerate()
            .all(|(index, byte)| self.accepts(index, *byte))
    }

    /// Consume input into `body` until the end-line is found or the input is
    /// exhausted.
    pub(super) fn scan(
        &mut self,
        input: &mut Input<'_>,
        body: &mut BytesMut,
    ) -> Result<Scan, ParseError> {
        loop {
            if self.candidate.is_empty() {
                let rest = input.remaining();
                let run = rest.iter().position(|b| *b == b'\r').unwrap_or(rest.len());
                body.extend_from_slice(&rest[..run]);
                input.advance(run);
            }
            let Some(byte) = input.next_byte() else {
                return Ok(Scan::Exhausted);
            };
            if self.accepts(self.candidate.len(), byte) {
                self.candidate.push(byte);
                if self.candidate.len() == self.expected.len() {
                    let flag = self.candidate[self.flag_at];
                    self.candidate.clear();
                    let continuation =
                        Continuation::from_byte(flag).ok_or(ParseError::TerminatorMismatch {
                            byte: flag,
                        })?;
                    return Ok(Scan::Terminated(continuation));
                }
                continue;
            }
            if self.strict {
                return Err(ParseError::TerminatorMismatch { byte });
            }
            self.candidate.push(byte);
            let restart = (1..=self.candidate.len())
                .find(|&start| self.is_prefix(&self.candidate[start..]))
                .unwrap_or(self.candidate.len());
            body.extend_from_slice(&self.candidate[..restart]);
            self.candidate.drain(..restart);
        }
    }
}
