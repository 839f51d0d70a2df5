//! Resumable lexer over partially received byte buffers.
//!
//! The [`Tokenizer`] classifies bytes through a [`Pattern`] and produces
//! [`Token`]s. When the input runs dry mid-token it freezes its state (word
//! buffer, quoting mode, UTF-8 accumulator) and reports
//! [`Lexed::Suspended`]; the next call with fresh bytes resumes exactly where
//! it stopped. Consumed bytes are owned by the tokenizer from then on, so the
//! caller only re-presents bytes past [`Input::position`].

use std::ops::Range;

pub mod error;
pub mod pattern;

pub use error::SyntaxError;
pub use pattern::{CharClass, EofPolicy, Pattern, PatternBuilder};

/// Lexical token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// A run of word bytes, quoted text and decoded UTF-8 characters.
    Word(String),
    /// CRLF, or a bare LF when tolerated.
    EndOfLine,
    /// End of input under [`EofPolicy::Delimit`].
    EndOfStream,
    /// A space-class byte.
    Space,
    /// A delimiter-class byte.
    Delimiter(u8),
}

/// Outcome of a lexer call that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lexed<T> {
    /// The value is complete.
    Ready(T),
    /// The input ran out; call again with more bytes.
    Suspended,
}

/// Read cursor over the bytes available for one call.
#[derive(Debug)]
pub struct Input<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    /// Wrap `bytes`, starting at `pos`.
    #[must_use]
    pub fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self {
            bytes,
            pos: pos.min(bytes.len()),
        }
    }

    /// Offset of the next unread byte.
    #[must_use]
    pub fn position(&self) -> usize { self.pos }

    /// Unread bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] { &self.bytes[self.pos..] }

    /// Whether every byte has been read.
    #[must_use]
    pub fn is_exhausted(&self) -> bool { self.pos >= self.bytes.len() }

    /// Bytes between `from` and the current position.
    #[must_use]
    pub fn consumed_since(&self, from: usize) -> &'a [u8] { &self.bytes[from..self.pos] }

    /// Read one byte.
    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(byte)
    }

    /// Mark `count` further bytes as read.
    pub fn advance(&mut self, count: usize) { self.pos = (self.pos + count).min(self.bytes.len()); }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LexState {
    Idle,
    InWord,
    AfterDelimiter,
    AfterCr,
    AfterLf,
    QuoteOpened,
    Halted,
}

#[derive(Clone, Copy, Debug, Default)]
struct Utf8Accumulator {
    remaining: u8,
    len: u8,
    code: u32,
}

impl Utf8Accumulator {
    fn is_active(self) -> bool { self.remaining > 0 }

    fn start(byte: u8) -> Option<Self> {
        let (len, code) = match byte {
            0xC2..=0xDF => (2, u32::from(byte & 0x1F)),
            0xE0..=0xEF => (3, u32::from(byte & 0x0F)),
            0xF0..=0xF4 => (4, u32::from(byte & 0x07)),
            _ => return None,
        };
        Some(Self {
            remaining: len - 1,
            len,
            code,
        })
    }

    /// Feed a continuation byte; returns the decoded character when complete.
    fn push(&mut self, byte: u8) -> Result<Option<char>, SyntaxError> {
        if byte & 0xC0 != 0x80 {
            return Err(SyntaxError::InvalidUtf8 { byte });
        }
        self.code = (self.code << 6) | u32::from(byte & 0x3F);
        self.remaining -= 1;
        if self.remaining > 0 {
            return Ok(None);
        }
        let minimum = match self.len {
            2 => 0x80,
            3 => 0x800,
            _ => 0x1_0000,
        };
        if self.code < minimum {
            return Err(SyntaxError::InvalidUtf8 { byte });
        }
        char::from_u32(self.code)
            .map(Some)
            .ok_or(SyntaxError::InvalidUtf8 { byte })
    }
}

/// Resumable lexer state machine.
#[derive(Debug)]
pub struct Tokenizer {
    state: LexState,
    word: String,
    word_started: bool,
    pending: Option<Token>,
    quote_close: Option<u8>,
    escaped: bool,
    // Word offsets from the first opening quote to the last closing quote.
    quoted_from: Option<usize>,
    quoted_to: usize,
    last_quoted: Option<Range<usize>>,
    utf8: Utf8Accumulator,
    constant_matched: usize,
}

impl Default for Tokenizer {
    fn default() -> Self { Self::new() }
}

impl Tokenizer {
    /// Create an idle tokenizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: LexState::Idle,
            word: String::new(),
            word_started: false,
            pending: None,
            quote_close: None,
            escaped: false,
            quoted_from: None,
            quoted_to: 0,
            last_quoted: None,
            utf8: Utf8Accumulator::default(),
            constant_matched: 0,
        }
    }

    /// Forget all state, including a previous failure.
    pub fn reset(&mut self) { *self = Self::new(); }

    /// Whether a fatal error has been reported.
    #[must_use]
    pub fn is_halted(&self) -> bool { self.state == LexState::Halted }

    /// Span of the last returned word covered by quoted runs, from the first
    /// opening quote to the last closing one. `None` when it had no quotes.
    #[must_use]
    pub fn last_quoted_span(&self) -> Option<Range<usize>> { self.last_quoted.clone() }

    /// Whether a token is partially assembled or buffered.
    #[must_use]
    pub fn is_mid_token(&self) -> bool {
        self.word_started
            || self.pending.is_some()
            || self.quote_close.is_some()
            || self.escaped
            || self.utf8.is_active()
            || self.constant_matched > 0
            || self.state == LexState::AfterCr
    }

    /// Read the next token using `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a [`SyntaxError`] for bytes the pattern rejects, malformed
    /// line endings, quoting or UTF-8. The tokenizer halts afterwards.
    pub fn read(
        &mut self,
        input: &mut Input<'_>,
        pattern: &Pattern,
    ) -> Result<Lexed<Token>, SyntaxError> {
        if self.is_halted() {
            return Err(SyntaxError::Halted);
        }
        if let Some(token) = self.pending.take() {
            self.state = LexState::Idle;
            return Ok(Lexed::Ready(token));
        }
        let result = self.lex(input, pattern);
        if result.is_err() {
            self.state = LexState::Halted;
        }
        result
    }

    /// Match the literal `constant`, resuming a partial match.
    ///
    /// # Errors
    ///
    /// Returns [`SyntaxError::ConstantMismatch`] on the first differing byte.
    pub fn read_constant(
        &mut self,
        input: &mut Input<'_>,
        constant: &[u8],
    ) -> Result<Lexed<()>, SyntaxError> {
        if self.is_halted() {
            return Err(SyntaxError::Halted);
        }
        while self.constant_matched < constant.len() {
            let Some(found) = input.next_byte() else {
                return Ok(Lexed::Suspended);
            };
            let expected = constant[self.constant_matched];
            if found != expected {
                self.state = LexState::Halted;
                return Err(SyntaxError::ConstantMismatch { expected, found });
            }
            self.constant_matched += 1;
        }
        self.constant_matched = 0;
        Ok(Lexed::Ready(()))
    }

    fn lex(&mut self, input: &mut Input<'_>, pattern: &Pattern) -> Result<Lexed<Token>, SyntaxError> {
        loop {
            let Some(byte) = input.next_byte() else {
                return self.on_exhausted(pattern);
            };

            if self.state == LexState::AfterCr {
                if byte == b'\n' {
                    return Ok(self.finish(Token::EndOfLine, LexState::AfterLf));
                }
                return Err(SyntaxError::DanglingCarriageReturn {
                    byte,
                    context: pattern.name(),
                });
            }

            if self.utf8.is_active() {
                if let Some(ch) = self.utf8.push(byte)? {
                    self.push_char(ch);
                }
                continue;
            }

            if let Some(close) = self.quote_close {
                self.lex_quoted(byte, close, pattern)?;
                continue;
            }

            match pattern.class(byte) {
                CharClass::Word => self.push_char(char::from(byte)),
                CharClass::Delimiter => {
                    return Ok(self.finish(Token::Delimiter(byte), LexState::AfterDelimiter));
                }
                CharClass::Space => return Ok(self.finish(Token::Space, LexState::AfterDelimiter)),
                CharClass::Cr => self.state = LexState::AfterCr,
                CharClass::Lf if pattern.tolerates_bare_lf() => {
                    return Ok(self.finish(Token::EndOfLine, LexState::AfterLf));
                }
                CharClass::Lf => {
                    return Err(SyntaxError::BareLineFeed {
                        context: pattern.name(),
                    });
                }
                CharClass::Quote => {
                    self.quote_close = Some(pattern.closer(byte));
                    self.quoted_from.get_or_insert(self.word.len());
                    self.word_started = true;
                    if pattern.echo_quotes() {
                        self.word.push(char::from(byte));
                    }
                    self.state = LexState::QuoteOpened;
                }
                CharClass::QuoteClose => {
                    return Err(SyntaxError::UnmatchedQuote {
                        byte,
                        context: pattern.name(),
                    });
                }
                CharClass::Utf8Lead2 | CharClass::Utf8Lead3 | CharClass::Utf8Lead4 => {
                    self.start_utf8(byte)?;
                }
                CharClass::Utf8Continuation => return Err(SyntaxError::InvalidUtf8 { byte }),
                CharClass::Invalid => {
                    return Err(SyntaxError::UnexpectedByte {
                        byte,
                        context: pattern.name(),
                    });
                }
            }
        }
    }

    /// Quoted runs take every byte literally, delimiters and line endings
    /// included, until the closing byte.
    fn lex_quoted(&mut self, byte: u8, close: u8, pattern: &Pattern) -> Result<(), SyntaxError> {
        if self.escaped {
            self.escaped = false;
        } else if pattern.escape() == Some(byte) {
            self.escaped = true;
            if pattern.echo_quotes() {
                self.word.push(char::from(byte));
            }
            return Ok(());
        } else if byte == close {
            self.quote_close = None;
            if pattern.echo_quotes() {
                self.word.push(char::from(byte));
            }
            self.quoted_to = self.word.len();
            self.state = LexState::InWord;
            return Ok(());
        }
        if byte >= 0x80 {
            return self.start_utf8(byte);
        }
        self.push_char(char::from(byte));
        Ok(())
    }

    fn start_utf8(&mut self, byte: u8) -> Result<(), SyntaxError> {
        self.utf8 = Utf8Accumulator::start(byte).ok_or(SyntaxError::InvalidUtf8 { byte })?;
        self.word_started = true;
        Ok(())
    }

    fn push_char(&mut self, ch: char) {
        self.word.push(ch);
        self.word_started = true;
        self.state = LexState::InWord;
    }

    /// End the current word (if any) and yield `token`, buffering it behind
    /// the word when both are due.
    fn finish(&mut self, token: Token, after: LexState) -> Lexed<Token> {
        if self.word_started {
            self.last_quoted = self.quoted_from.take().map(|from| from..self.quoted_to);
            self.quoted_to = 0;
            self.pending = Some(token);
            self.state = after;
            self.word_started = false;
            return Lexed::Ready(Token::Word(std::mem::take(&mut self.word)));
        }
        self.state = LexState::Idle;
        Lexed::Ready(token)
    }

    fn on_exhausted(&mut self, pattern: &Pattern) -> Result<Lexed<Token>, SyntaxError> {
        let context = pattern.name();
        match pattern.eof_policy() {
            EofPolicy::Suspend => Ok(Lexed::Suspended),
            EofPolicy::Fail => Err(SyntaxError::UnexpectedEof { context }),
            EofPolicy::Delimit => {
                if self.quote_close.is_some() {
                    return Err(SyntaxError::UnterminatedQuote { context });
                }
                if self.utf8.is_active() || self.state == LexState::AfterCr {
                    return Err(SyntaxError::UnexpectedEof { context });
                }
                Ok(self.finish(Token::EndOfStream, LexState::AfterDelimiter))
            }
        }
    }
}

/// Split a complete string into words using `pattern`, which must use
/// [`EofPolicy::Delimit`].
///
/// # Errors
///
/// Propagates [`SyntaxError`]s from the tokenizer.
pub fn split_words(text: &str, pattern: &Pattern) -> Result<Vec<String>, SyntaxError> {
    debug_assert_eq!(pattern.eof_policy(), EofPolicy::Delimit);
    let mut tokenizer = Tokenizer::new();
    let mut input = Input::new(text.as_bytes(), 0);
    let mut words = Vec::new();
    loop {
        match tokenizer.read(&mut input, pattern)? {
            Lexed::Ready(Token::Word(word)) => words.push(word),
            Lexed::Ready(Token::EndOfStream) | Lexed::Suspended => return Ok(words),
            Lexed::Ready(_) => {}
        }
    }
}

#[cfg(test)]
mod tests;
