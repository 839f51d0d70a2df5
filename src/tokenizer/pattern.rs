//! Character-class tables that drive the [`Tokenizer`](super::Tokenizer).
//!
//! A [`Pattern`] maps every byte value to a [`CharClass`] and carries the
//! flags controlling end-of-input, quoting and line-ending behaviour. Tables
//! are immutable once built; the protocol contexts the parser needs are
//! exposed as lazily initialised statics.

use std::sync::LazyLock;

/// Lexical class assigned to a single byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharClass {
    /// Appended to the current word.
    Word,
    /// Ends the current word and is returned as [`Token::Delimiter`](super::Token::Delimiter).
    Delimiter,
    /// Ends the current word and is returned as [`Token::Space`](super::Token::Space).
    Space,
    /// Carriage return; must be followed by a line feed.
    Cr,
    /// Line feed.
    Lf,
    /// Opens a quoted run closed by the byte registered with
    /// [`PatternBuilder::quote`].
    Quote,
    /// Closing byte of a quote pair whose opener differs from it.
    QuoteClose,
    /// Lead byte of a two byte UTF-8 sequence.
    Utf8Lead2,
    /// Lead byte of a three byte UTF-8 sequence.
    Utf8Lead3,
    /// Lead byte of a four byte UTF-8 sequence.
    Utf8Lead4,
    /// UTF-8 continuation byte seen outside a sequence.
    Utf8Continuation,
    /// Not permitted in this context.
    Invalid,
}

/// Behaviour when the input is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EofPolicy {
    /// Freeze the lexer state and report suspension.
    Suspend,
    /// Treat end of input as a terminator and return
    /// [`Token::EndOfStream`](super::Token::EndOfStream).
    Delimit,
    /// End of input is a syntax error.
    Fail,
}

/// Immutable byte classification table plus lexer flags.
#[derive(Clone, Debug)]
pub struct Pattern {
    name: &'static str,
    classes: [CharClass; 256],
    closers: [u8; 256],
    eof: EofPolicy,
    echo_quotes: bool,
    escape: Option<u8>,
    bare_lf: bool,
}

impl Pattern {
    /// Start building a pattern. Every byte begins as [`CharClass::Invalid`]
    /// except the UTF-8 continuation range.
    #[must_use]
    pub fn builder(name: &'static str) -> PatternBuilder { PatternBuilder::new(name) }

    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str { self.name }

    /// Class of `byte` in this context.
    #[must_use]
    pub fn class(&self, byte: u8) -> CharClass { self.classes[usize::from(byte)] }

    /// Closing byte for a quote opened with `open`.
    #[must_use]
    pub fn closer(&self, open: u8) -> u8 { self.closers[usize::from(open)] }

    /// End-of-input policy.
    #[must_use]
    pub fn eof_policy(&self) -> EofPolicy { self.eof }

    /// Whether quote bytes are copied into the word.
    #[must_use]
    pub fn echo_quotes(&self) -> bool { self.echo_quotes }

    /// Byte that makes the next byte of a quoted run literal.
    #[must_use]
    pub fn escape(&self) -> Option<u8> { self.escape }

    /// Whether a line feed without a preceding carriage return ends a line.
    #[must_use]
    pub fn tolerates_bare_lf(&self) -> bool { self.bare_lf }

    /// `MSRP <transaction-id> <method|status>` context.
    #[must_use]
    pub fn request_line() -> &'static Pattern { &REQUEST_LINE }

    /// Free text after a status code.
    #[must_use]
    pub fn reason_phrase() -> &'static Pattern { &REASON_PHRASE }

    /// Header field names up to the colon.
    #[must_use]
    pub fn header_name() -> &'static Pattern { &HEADER_NAME }

    /// Header field values; quotes group text and are stripped, `\` escapes
    /// inside them.
    #[must_use]
    pub fn header_value() -> &'static Pattern { &HEADER_VALUE }

    /// CPIM and MIME sub-header values; quotes are kept verbatim.
    #[must_use]
    pub fn cpim_value() -> &'static Pattern { &CPIM_VALUE }

    /// Space separated URI lists held in a complete string.
    #[must_use]
    pub fn path_list() -> &'static Pattern { &PATH_LIST }
}

/// Builder for [`Pattern`].
#[derive(Clone, Debug)]
pub struct PatternBuilder {
    pattern: Pattern,
}

impl PatternBuilder {
    fn new(name: &'static str) -> Self {
        let mut classes = [CharClass::Invalid; 256];
        for class in &mut classes[0x80..=0xBF] {
            *class = CharClass::Utf8Continuation;
        }
        Self {
            pattern: Pattern {
                name,
                classes,
                closers: [0; 256],
                eof: EofPolicy::Suspend,
                echo_quotes: false,
                escape: None,
                bare_lf: false,
            },
        }
    }

    /// Assign `class` to every byte in `bytes`.
    #[must_use]
    pub fn class(mut self, bytes: impl IntoIterator<Item = u8>, class: CharClass) -> Self {
        for byte in bytes {
            self.pattern.classes[usize::from(byte)] = class;
        }
        self
    }

    /// Mark ASCII letters and digits as word bytes.
    #[must_use]
    pub fn alphanumeric(self) -> Self {
        self.class(b'a'..=b'z', CharClass::Word)
            .class(b'A'..=b'Z', CharClass::Word)
            .class(b'0'..=b'9', CharClass::Word)
    }

    /// Mark printable ASCII (`0x21..=0x7E`) as word bytes.
    #[must_use]
    pub fn printable(self) -> Self { self.class(0x21..=0x7E, CharClass::Word) }

    /// Accept multi-byte UTF-8 sequences as word characters.
    #[must_use]
    pub fn utf8(self) -> Self {
        self.class(0xC2..=0xDF, CharClass::Utf8Lead2)
            .class(0xE0..=0xEF, CharClass::Utf8Lead3)
            .class(0xF0..=0xF4, CharClass::Utf8Lead4)
    }

    /// Classify CR and LF as line terminators.
    #[must_use]
    pub fn line_endings(self) -> Self {
        self.class([b'\r'], CharClass::Cr)
            .class([b'\n'], CharClass::Lf)
    }

    /// Register a quote pair.
    #[must_use]
    pub fn quote(mut self, open: u8, close: u8) -> Self {
        self.pattern.classes[usize::from(open)] = CharClass::Quote;
        if close != open {
            self.pattern.classes[usize::from(close)] = CharClass::QuoteClose;
        }
        self.pattern.closers[usize::from(open)] = close;
        self
    }

    /// Set the end-of-input policy.
    #[must_use]
    pub fn eof(mut self, policy: EofPolicy) -> Self {
        self.pattern.eof = policy;
        self
    }

    /// Copy quote bytes into the word.
    #[must_use]
    pub fn echo_quotes(mut self, echo: bool) -> Self {
        self.pattern.echo_quotes = echo;
        self
    }

    /// Inside quoted runs, take the byte after `escape` literally, a closing
    /// quote included. The escape byte is dropped unless quotes are echoed.
    #[must_use]
    pub fn escape(mut self, escape: u8) -> Self {
        self.pattern.escape = Some(escape);
        self
    }

    /// Accept LF without a preceding CR as a line ending.
    #[must_use]
    pub fn tolerate_bare_lf(mut self, tolerate: bool) -> Self {
        self.pattern.bare_lf = tolerate;
        self
    }

    /// Finish the table.
    #[must_use]
    pub fn build(self) -> Pattern { self.pattern }
}

const IDENT_EXTRA: &[u8] = b".-+%=";
const TOKEN_EXTRA: &[u8] = b"!#$%&'*+-.^_`|~";

static REQUEST_LINE: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::builder("request-line")
        .alphanumeric()
        .class(IDENT_EXTRA.iter().copied(), CharClass::Word)
        .class([b' '], CharClass::Space)
        .line_endings()
        .build()
});

static REASON_PHRASE: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::builder("reason-phrase")
        .printable()
        .class([b' ', b'\t'], CharClass::Word)
        .utf8()
        .line_endings()
        .build()
});

static HEADER_NAME: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::builder("header-name")
        .alphanumeric()
        .class(TOKEN_EXTRA.iter().copied(), CharClass::Word)
        .class([b':'], CharClass::Delimiter)
        .line_endings()
        .build()
});

static HEADER_VALUE: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::builder("header-value")
        .printable()
        .class([b' ', b'\t'], CharClass::Word)
        .utf8()
        .quote(b'"', b'"')
        .escape(b'\\')
        .line_endings()
        .build()
});

static CPIM_VALUE: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::builder("cpim-value")
        .printable()
        .class([b' ', b'\t'], CharClass::Word)
        .utf8()
        .quote(b'"', b'"')
        .escape(b'\\')
        .echo_quotes(true)
        .line_endings()
        .build()
});

static PATH_LIST: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::builder("path-list")
        .printable()
        .utf8()
        .class([b' ', b'\t'], CharClass::Space)
        .eof(EofPolicy::Delimit)
        .build()
});
