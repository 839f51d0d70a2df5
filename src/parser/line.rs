//! Start line and header line readers.
//!
//! Both readers are step machines driven by the tokenizer. A step that
//! suspends leaves its state untouched, so the next call resumes with the
//! token that was being assembled.

use std::ops::Range;

use super::{ParseError, StartLine};
use crate::{
    message::{Method, TransactionId, parse_status_code},
    tokenizer::{Input, Lexed, Pattern, Token, Tokenizer},
};

/// Magic prefix of every start line.
pub const PROTOCOL_PREFIX: &[u8] = b"MSRP";
/// Dashes opening every end-line.
pub const END_LINE_PREAMBLE: &[u8] = b"-------";

#[derive(Debug, Default)]
pub(super) enum StartStep {
    #[default]
    Prefix,
    PrefixSpace,
    TransactionId,
    TransactionIdSpace(TransactionId),
    Verb(TransactionId),
    AfterMethod(TransactionId, Method),
    AfterCode(TransactionId, u16),
    Reason(TransactionId, u16),
    ReasonEnd(TransactionId, u16, String),
}

impl StartStep {
    fn expects(&self) -> &'static str {
        match self {
            Self::Prefix => "protocol prefix",
            Self::PrefixSpace | Self::TransactionIdSpace(_) => "space",
            Self::TransactionId => "transaction id",
            Self::Verb(_) => "method or status code",
            Self::AfterMethod(..) | Self::ReasonEnd(..) => "end of line",
            Self::AfterCode(..) => "reason phrase or end of line",
            Self::Reason(..) => "reason phrase",
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Word(word) => format!("word {word:?}"),
        Token::EndOfLine => "end of line".to_owned(),
        Token::EndOfStream => "end of stream".to_owned(),
        Token::Space => "space".to_owned(),
        Token::Delimiter(byte) => format!("delimiter {:?}", char::from(*byte)),
    }
}

fn method(word: String) -> Result<Method, ParseError> {
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ParseError::InvalidMethod(word));
    }
    Ok(Method::from_keyword(&word))
}

/// Read `MSRP <tid> <METHOD>` or `MSRP <tid> <code> [reason]`.
pub(super) fn read_start_line(
    tokenizer: &mut Tokenizer,
    step: &mut StartStep,
    input: &mut Input<'_>,
) -> Result<Lexed<(TransactionId, StartLine)>, ParseError> {
    loop {
        if matches!(step, StartStep::Prefix) {
            match tokenizer.read_constant(input, PROTOCOL_PREFIX)? {
                Lexed::Ready(()) => *step = StartStep::PrefixSpace,
                Lexed::Suspended => return Ok(Lexed::Suspended),
            }
            continue;
        }
        let pattern = if matches!(step, StartStep::Reason(..)) {
            Pattern::reason_phrase()
        } else {
            Pattern::request_line()
        };
        let Lexed::Ready(token) = tokenizer.read(input, pattern)? else {
            return Ok(Lexed::Suspended);
        };
        *step = match (std::mem::take(step), token) {
            (StartStep::PrefixSpace, Token::Space) => StartStep::TransactionId,
            (StartStep::TransactionId, Token::Word(word)) => {
                if !TransactionId::is_valid(&word) {
                    return Err(ParseError::InvalidTransactionId(word));
                }
                StartStep::TransactionIdSpace(TransactionId::new(word))
            }
            (StartStep::TransactionIdSpace(tid), Token::Space) => StartStep::Verb(tid),
            (StartStep::Verb(tid), Token::Word(word)) => match parse_status_code(&word) {
                Some(code) => StartStep::AfterCode(tid, code),
                None => StartStep::AfterMethod(tid, method(word)?),
            },
            (StartStep::AfterMethod(tid, method), Token::EndOfLine) => {
                return Ok(Lexed::Ready((tid, StartLine::Request(method))));
            }
            (StartStep::AfterCode(tid, code), Token::Space) => StartStep::Reason(tid, code),
            (StartStep::AfterCode(tid, code) | StartStep::Reason(tid, code), Token::EndOfLine) => {
                return Ok(Lexed::Ready((tid, StartLine::Response { code, reason: None })));
            }
            (StartStep::Reason(tid, code), Token::Word(reason)) => {
                StartStep::ReasonEnd(tid, code, reason)
            }
            (StartStep::ReasonEnd(tid, code, reason), Token::EndOfLine) => {
                let reason = reason.trim();
                let reason = (!reason.is_empty()).then(|| reason.to_owned());
                return Ok(Lexed::Ready((tid, StartLine::Response { code, reason })));
            }
            (current, token) => {
                return Err(ParseError::UnexpectedToken {
                    expected: current.expects(),
                    found: describe(&token),
                });
            }
        };
    }
}

#[derive(Debug, Default)]
pub(super) enum LineStep {
    #[default]
    Start,
    BlankLine,
    Name,
    Colon(String),
    Value(String),
    ValueEnd(String, String),
}

/// A complete line of a header block.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum HeaderLine {
    Field(String, String),
    /// Empty line closing the block.
    Blank,
    /// The next bytes are the end-line preamble; nothing was consumed.
    EndLinePreamble,
}

/// Read one `Name: value` line, a blank line, or (when `watch_preamble` is
/// set) detect an end-line starting where a header name was expected.
pub(super) fn read_header_line(
    tokenizer: &mut Tokenizer,
    step: &mut LineStep,
    input: &mut Input<'_>,
    value_pattern: &Pattern,
    watch_preamble: bool,
) -> Result<Lexed<HeaderLine>, ParseError> {
    loop {
        match step {
            LineStep::Start => {
                let rest = input.remaining();
                let Some(&first) = rest.first() else {
                    return Ok(Lexed::Suspended);
                };
                if first == b'\r' {
                    *step = LineStep::BlankLine;
                    continue;
                }
                if watch_preamble {
                    let seen = rest.len().min(END_LINE_PREAMBLE.len());
                    if rest[..seen] == END_LINE_PREAMBLE[..seen] {
                        if seen < END_LINE_PREAMBLE.len() {
                            return Ok(Lexed::Suspended);
                        }
                        return Ok(Lexed::Ready(HeaderLine::EndLinePreamble));
                    }
                }
                *step = LineStep::Name;
                continue;
            }
            LineStep::BlankLine => {
                return match tokenizer.read_constant(input, b"\r\n")? {
                    Lexed::Ready(()) => {
                        *step = LineStep::Start;
                        Ok(Lexed::Ready(HeaderLine::Blank))
                    }
                    Lexed::Suspended => Ok(Lexed::Suspended),
                };
            }
            _ => {}
        }

        let pattern = if matches!(step, LineStep::Value(_)) {
            value_pattern
        } else {
            Pattern::header_name()
        };
        let Lexed::Ready(token) = tokenizer.read(input, pattern)? else {
            return Ok(Lexed::Suspended);
        };
        *step = match (std::mem::take(step), token) {
            (LineStep::Name, Token::Word(name)) => LineStep::Colon(name),
            (LineStep::Colon(name), Token::Delimiter(b':')) => LineStep::Value(name),
            (LineStep::Value(name), Token::Word(value)) => {
                LineStep::ValueEnd(name, trim_unquoted(&value, tokenizer.last_quoted_span()))
            }
            (LineStep::Value(name), Token::EndOfLine) => {
                return Ok(Lexed::Ready(HeaderLine::Field(name, String::new())));
            }
            (LineStep::ValueEnd(name, value), Token::EndOfLine) => {
                return Ok(Lexed::Ready(HeaderLine::Field(name, value)));
            }
            (current, token) => {
                let expected = match current {
                    LineStep::Name => "header name",
                    LineStep::Colon(_) => "':' after header name",
                    _ => "end of header line",
                };
                return Err(ParseError::UnexpectedToken {
                    expected,
                    found: describe(&token),
                });
            }
        };
    }
}

/// Strip blanks around `value`, leaving anything inside `quoted` intact.
fn trim_unquoted(value: &str, quoted: Option<Range<usize>>) -> String {
    const BLANKS: [char; 2] = [' ', '\t'];
    let Some(quoted) = quoted else {
        return value.trim_matches(BLANKS).to_owned();
    };
    let head = value[..quoted.start].trim_start_matches(BLANKS);
    let tail = value[quoted.end..].trim_end_matches(BLANKS);
    let mut trimmed = String::with_capacity(value.len());
    trimmed.push_str(head);
    trimmed.push_str(&value[quoted]);
    trimmed.push_str(tail);
    trimmed
}
