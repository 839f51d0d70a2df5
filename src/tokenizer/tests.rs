//! Unit tests for the resumable tokenizer.

use proptest::prelude::*;
use rstest::rstest;

use super::{Input, Lexed, Pattern, SyntaxError, Token, Tokenizer, split_words};

/// Drain every token available from `chunks`, feeding them one at a time.
fn tokens_from_chunks(chunks: &[&[u8]], pattern: &Pattern) -> Result<Vec<Token>, SyntaxError> {
    let mut tokenizer = Tokenizer::new();
    let mut tokens = Vec::new();
    for chunk in chunks {
        let mut input = Input::new(chunk, 0);
        while let Lexed::Ready(token) = tokenizer.read(&mut input, pattern)? {
            tokens.push(token);
        }
        assert!(input.is_exhausted(), "suspension must consume the whole chunk");
    }
    Ok(tokens)
}

fn word(text: &str) -> Token { Token::Word(text.to_owned()) }

#[test]
fn request_line_tokens() {
    let tokens = tokens_from_chunks(&[b"MSRP a786hjs2 SEND\r\n"], Pattern::request_line())
        .expect("valid request line");
    assert_eq!(
        tokens,
        vec![
            word("MSRP"),
            Token::Space,
            word("a786hjs2"),
            Token::Space,
            word("SEND"),
            Token::EndOfLine,
        ]
    );
}

#[test]
fn header_name_stops_at_colon() {
    let tokens = tokens_from_chunks(&[b"To-Path:"], Pattern::header_name()).expect("valid name");
    assert_eq!(tokens, vec![word("To-Path"), Token::Delimiter(b':')]);
}

#[test]
fn quoted_value_keeps_spaces_and_colons() {
    let tokens = tokens_from_chunks(&[b" \"a b:c\"\r\n"], Pattern::header_value())
        .expect("valid quoted value");
    assert_eq!(tokens, vec![word(" a b:c"), Token::EndOfLine]);
}

#[test]
fn echoing_pattern_keeps_quote_bytes() {
    let tokens = tokens_from_chunks(&[b"\"MR SANDERS\" <im:piglet>\r\n"], Pattern::cpim_value())
        .expect("valid cpim value");
    assert_eq!(
        tokens,
        vec![word("\"MR SANDERS\" <im:piglet>"), Token::EndOfLine]
    );
}

#[test]
fn quoted_run_swallows_line_endings() {
    let tokens = tokens_from_chunks(&[b"\"x\r\ny\"\r\n"], Pattern::header_value())
        .expect("quoted CRLF is literal");
    assert_eq!(tokens, vec![word("x\r\ny"), Token::EndOfLine]);
}

#[test]
fn empty_quotes_yield_empty_word() {
    let tokens =
        tokens_from_chunks(&[b"\"\"\r\n"], Pattern::header_value()).expect("empty quoted value");
    assert_eq!(tokens, vec![word(""), Token::EndOfLine]);
}

#[rstest]
#[case::whole(&[b"\"a\\\"b\\\\\" c\r\n".as_slice()])]
#[case::split_after_escape(&[b"\"a\\".as_slice(), b"\"b\\\\\" c\r\n".as_slice()])]
fn escaped_quotes_stay_inside_the_run(#[case] chunks: &[&[u8]]) {
    let tokens = tokens_from_chunks(chunks, Pattern::header_value()).expect("escaped quote");
    assert_eq!(tokens, vec![word("a\"b\\ c"), Token::EndOfLine]);
}

#[test]
fn echoing_pattern_keeps_escapes() {
    let tokens = tokens_from_chunks(&[b"\"x\\\"y\"\r\n"], Pattern::cpim_value()).expect("cpim escape");
    assert_eq!(tokens, vec![word("\"x\\\"y\""), Token::EndOfLine]);
}

#[test]
fn quoted_span_excludes_outer_blanks() {
    let mut tokenizer = Tokenizer::new();
    let mut input = Input::new(b" \" a \" \r\n", 0);
    let token = tokenizer.read(&mut input, Pattern::header_value()).expect("value");
    assert_eq!(token, Lexed::Ready(word("  a  ")));
    assert_eq!(tokenizer.last_quoted_span(), Some(1..4));
}

#[test]
fn split_three_byte_character_resumes() {
    let euro = "\u{20ac}".as_bytes();
    let whole = [euro, b"\r\n"].concat();
    let split = tokens_from_chunks(&[&euro[..1], &euro[1..], b"\r\n"], Pattern::header_value())
        .expect("split utf-8");
    let joined = tokens_from_chunks(&[&whole], Pattern::header_value()).expect("whole utf-8");
    assert_eq!(split, joined);
    assert_eq!(split, vec![word("\u{20ac}"), Token::EndOfLine]);
}

#[rstest]
#[case::bare_lf(b"SEND\n".as_slice(), Pattern::request_line())]
#[case::cr_without_lf(b"SEND\rX".as_slice(), Pattern::request_line())]
#[case::invalid_byte(b"SE@ND\r\n".as_slice(), Pattern::request_line())]
#[case::broken_utf8(b"\xe2\x41\r\n".as_slice(), Pattern::header_value())]
#[case::stray_continuation(b"\x80\r\n".as_slice(), Pattern::header_value())]
#[case::overlong_utf8(b"\xe0\x80\x80\r\n".as_slice(), Pattern::header_value())]
fn malformed_input_is_fatal(#[case] bytes: &[u8], #[case] pattern: &Pattern) {
    let mut tokenizer = Tokenizer::new();
    let mut input = Input::new(bytes, 0);
    let err = loop {
        match tokenizer.read(&mut input, pattern) {
            Ok(Lexed::Ready(_)) => {}
            Ok(Lexed::Suspended) => panic!("malformed input must not suspend"),
            Err(err) => break err,
        }
    };
    assert_ne!(err, SyntaxError::Halted);
    assert!(tokenizer.is_halted());
    let mut more = Input::new(b"ok\r\n", 0);
    assert_eq!(tokenizer.read(&mut more, pattern), Err(SyntaxError::Halted));
}

#[test]
fn unmatched_closing_quote_is_fatal() {
    let pattern = Pattern::builder("angle")
        .alphanumeric()
        .quote(b'<', b'>')
        .line_endings()
        .build();
    let mut tokenizer = Tokenizer::new();
    let mut input = Input::new(b"abc>\r\n", 0);
    assert_eq!(
        tokenizer.read(&mut input, &pattern),
        Err(SyntaxError::UnmatchedQuote {
            byte: b'>',
            context: "angle"
        })
    );
}

#[test]
fn bare_lf_tolerated_when_configured() {
    let pattern = Pattern::builder("lenient")
        .alphanumeric()
        .line_endings()
        .tolerate_bare_lf(true)
        .build();
    let tokens = tokens_from_chunks(&[b"abc\n"], &pattern).expect("lenient line ending");
    assert_eq!(tokens, vec![word("abc"), Token::EndOfLine]);
}

#[test]
fn delimit_policy_yields_end_of_stream() {
    assert_eq!(
        split_words("msrp://a:1/x;tcp  msrp://b:2/y;tcp", Pattern::path_list())
            .expect("path list"),
        vec!["msrp://a:1/x;tcp".to_owned(), "msrp://b:2/y;tcp".to_owned()]
    );
    assert!(split_words("", Pattern::path_list()).expect("empty list").is_empty());
}

#[test]
fn fail_policy_rejects_end_of_input() {
    let pattern = Pattern::builder("strict")
        .alphanumeric()
        .eof(super::EofPolicy::Fail)
        .build();
    let mut tokenizer = Tokenizer::new();
    let mut input = Input::new(b"abc", 0);
    assert_eq!(
        tokenizer.read(&mut input, &pattern),
        Err(SyntaxError::UnexpectedEof { context: "strict" })
    );
}

#[test]
fn unterminated_quote_under_delimit_policy() {
    assert_eq!(
        split_words("\"abc", &Pattern::builder("q")
            .printable()
            .quote(b'"', b'"')
            .eof(super::EofPolicy::Delimit)
            .build()),
        Err(SyntaxError::UnterminatedQuote { context: "q" })
    );
}

#[test]
fn constant_match_resumes_across_calls() {
    let mut tokenizer = Tokenizer::new();
    let mut first = Input::new(b"MS", 0);
    assert_eq!(
        tokenizer.read_constant(&mut first, b"MSRP"),
        Ok(Lexed::Suspended)
    );
    assert!(tokenizer.is_mid_token());
    let mut second = Input::new(b"RP ", 0);
    assert_eq!(tokenizer.read_constant(&mut second, b"MSRP"), Ok(Lexed::Ready(())));
    assert_eq!(second.position(), 2);
}

#[test]
fn constant_mismatch_is_fatal() {
    let mut tokenizer = Tokenizer::new();
    let mut input = Input::new(b"HTTP", 0);
    assert_eq!(
        tokenizer.read_constant(&mut input, b"MSRP"),
        Err(SyntaxError::ConstantMismatch {
            expected: b'M',
            found: b'H'
        })
    );
    assert!(tokenizer.is_halted());
}

const SAMPLE: &[u8] = b"MSRP a786hjs2 200 OK\r\nTo-Path: msrp://b.example.com:7654/jsh;tcp\r\n\
Subject: \"caf\xc3\xa9 \xe2\x82\xac \xf0\x9f\x98\x80: ok\"\r\n";

fn sample_tokens(chunks: &[&[u8]]) -> Vec<Token> {
    let pattern = Pattern::header_value();
    tokens_from_chunks(chunks, pattern).expect("sample tokenizes")
}

proptest! {
    #[test]
    fn chunk_boundaries_do_not_change_tokens(cuts in proptest::collection::vec(0..SAMPLE.len(), 0..12)) {
        let mut cuts = cuts;
        cuts.sort_unstable();
        cuts.dedup();
        let mut chunks = Vec::new();
        let mut start = 0;
        for cut in cuts {
            chunks.push(&SAMPLE[start..cut]);
            start = cut;
        }
        chunks.push(&SAMPLE[start..]);
        prop_assert_eq!(sample_tokens(&chunks), sample_tokens(&[SAMPLE]));
    }
}

#[test]
fn byte_by_byte_matches_single_call() {
    let singles: Vec<&[u8]> = SAMPLE.chunks(1).collect();
    assert_eq!(sample_tokens(&singles), sample_tokens(&[SAMPLE]));
}
