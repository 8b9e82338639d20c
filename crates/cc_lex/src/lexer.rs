//! The tokenizer (§4.3): physical-to-logical line splicing, then a single
//! forward scan producing the token sequence for one file.

use crate::hideset::HideSet;
use crate::literal::{decode_char_literal, decode_literal_body, scan_number};
use crate::token::{match_punct, Token, TokenKind};
use cc_base::{ErrorKind, FileId, Result, SpannedError, Span};

/// Joins backslash-newline continuations while keeping the *count* of `\n`
/// bytes in the output equal to the input, so physical line numbers stay
/// accurate (§4.3, boundary: "Backslash-newline splice inside identifier").
///
/// Each spliced-away newline is deferred and re-emitted immediately after
/// the next real newline, rather than dropped — this is what lets a simple
/// "count `\n` bytes seen so far" line counter agree with the file's
/// physical line numbers even though the spliced text reads as one line.
pub fn splice_backslash_newlines(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut deferred_newlines = 0u32;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
            i += 2;
            deferred_newlines += 1;
        } else if bytes[i] == b'\n' {
            out.push(b'\n');
            i += 1;
            for _ in 0..deferred_newlines {
                out.push(b'\n');
            }
            deferred_newlines = 0;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    // Safety: we only ever copy bytes verbatim from valid UTF-8 input.
    String::from_utf8(out).expect("splicing preserves UTF-8 validity")
}

/// Prepares raw file bytes for tokenizing: guarantees a trailing newline
/// (boundary: "File not ending in newline"), appends the NUL sentinel, and
/// splices backslash-newlines.
pub fn prepare_source(raw: &str) -> String {
    let mut s = raw.to_string();
    if !s.ends_with('\n') {
        s.push('\n');
    }
    let spliced = splice_backslash_newlines(&s);
    let mut out = spliced;
    out.push('\0');
    out
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    file: FileId,
    pos: usize,
    line_no: u32,
    at_bol: bool,
    has_space: bool,
    first_emitted: bool,
}

impl<'a> Scanner<'a> {
    fn byte(&self, offset: usize) -> u8 {
        *self.bytes.get(self.pos + offset).unwrap_or(&0)
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.file, start as u32, end as u32)
    }

    fn make_token(&mut self, kind: TokenKind, start: usize, end: usize) -> Token {
        let span = self.span(start, end);
        let tok = Token {
            kind,
            span,
            line_no: self.line_no,
            at_bol: self.at_bol,
            has_space: self.has_space,
            is_first_of_file: !self.first_emitted,
            hideset: HideSet::empty(),
        };
        self.first_emitted = true;
        self.at_bol = false;
        self.has_space = false;
        tok
    }

    /// Scans a quoted literal body starting at the opening quote, returning
    /// the raw (un-decoded) bytes between the quotes and the index just
    /// past the closing quote.
    fn scan_quoted(&self, quote: u8, start: usize) -> Result<(usize, usize)> {
        let mut i = start + 1;
        loop {
            if i >= self.bytes.len() || self.bytes[i] == 0 || self.bytes[i] == b'\n' {
                return Err(SpannedError::new(
                    ErrorKind::Lex,
                    "unterminated literal",
                    self.span(start, i),
                ));
            }
            if self.bytes[i] == b'\\' {
                i += 2;
                continue;
            }
            if self.bytes[i] == quote {
                return Ok((i + 1, i));
            }
            i += 1;
        }
    }
}

/// Tokenizes `source` (already produced by [`prepare_source`]) into a
/// complete token sequence for file `file`, terminated by an EOF sentinel.
pub fn tokenize(file: FileId, source: &str) -> Result<Vec<Token>> {
    let mut s = Scanner {
        src: source,
        bytes: source.as_bytes(),
        file,
        pos: 0,
        line_no: 1,
        at_bol: true,
        has_space: false,
        first_emitted: false,
    };
    let mut tokens = Vec::new();

    while s.byte(0) != 0 {
        let c = s.byte(0);
        match c {
            b'\n' => {
                s.line_no += 1;
                s.at_bol = true;
                s.pos += 1;
            }
            b' ' | b'\t' | b'\r' | 0x0b | 0x0c => {
                s.has_space = true;
                s.pos += 1;
            }
            b'/' if s.byte(1) == b'/' => {
                s.pos += 2;
                while s.byte(0) != 0 && s.byte(0) != b'\n' {
                    s.pos += 1;
                }
                s.has_space = true;
            }
            b'/' if s.byte(1) == b'*' => {
                let start = s.pos;
                s.pos += 2;
                loop {
                    if s.byte(0) == 0 {
                        return Err(SpannedError::new(
                            ErrorKind::Lex,
                            "unterminated block comment",
                            s.span(start, s.pos),
                        ));
                    }
                    if s.byte(0) == b'*' && s.byte(1) == b'/' {
                        s.pos += 2;
                        break;
                    }
                    if s.byte(0) == b'\n' {
                        s.line_no += 1;
                    }
                    s.pos += 1;
                }
                s.has_space = true;
            }
            b'"' => {
                let start = s.pos;
                let (next, close) = s.scan_quoted(b'"', start)?;
                let body = decode_literal_body(&s.bytes[start + 1..close], s.span(start, next))?;
                let tok = s.make_token(
                    TokenKind::Str { bytes: body, elem_size: 1 },
                    start,
                    next,
                );
                tokens.push(tok);
                s.pos = next;
            }
            b'\'' => {
                let start = s.pos;
                let (next, close) = s.scan_quoted(b'\'', start)?;
                let value = decode_char_literal(&s.bytes[start + 1..close], s.span(start, next))?;
                let tok = s.make_token(
                    TokenKind::Num(crate::literal::NumLit::Int {
                        value: value as u64,
                        kind: crate::literal::IntKind::Int,
                    }),
                    start,
                    next,
                );
                tokens.push(tok);
                s.pos = next;
            }
            b'L' | b'u' | b'U' if s.byte(1) == b'"' || (c == b'u' && s.byte(1) == b'8' && s.byte(2) == b'"') => {
                let start = s.pos;
                let elem_size: u8 = if c == b'L' {
                    4
                } else if c == b'u' && s.byte(1) == b'8' {
                    1
                } else if c == b'u' {
                    2
                } else {
                    4
                };
                let quote_pos = if elem_size == 1 && c == b'u' { start + 2 } else { start + 1 };
                let (next, close) = s.scan_quoted(b'"', quote_pos)?;
                let body = decode_literal_body(&s.bytes[quote_pos + 1..close], s.span(start, next))?;
                let tok = s.make_token(TokenKind::Str { bytes: body, elem_size }, start, next);
                tokens.push(tok);
                s.pos = next;
            }
            _ if c.is_ascii_digit() || (c == b'.' && s.byte(1).is_ascii_digit()) => {
                let start = s.pos;
                let (lit, len) = scan_number(&s.bytes[start..], s.span(start, start + 1))?;
                let tok = s.make_token(TokenKind::Num(lit), start, start + len);
                tokens.push(tok);
                s.pos = start + len;
            }
            _ if is_ident_start(c) => {
                let start = s.pos;
                let mut i = start + 1;
                while is_ident_continue(*s.bytes.get(i).unwrap_or(&0)) {
                    i += 1;
                }
                let tok = s.make_token(TokenKind::Ident, start, i);
                tokens.push(tok);
                s.pos = i;
            }
            _ => {
                let start = s.pos;
                match match_punct(&s.bytes[start..]) {
                    Some(len) => {
                        let tok = s.make_token(TokenKind::Reserved, start, start + len);
                        tokens.push(tok);
                        s.pos = start + len;
                    }
                    None => {
                        return Err(SpannedError::new(
                            ErrorKind::Lex,
                            format!("invalid token byte 0x{c:02x}"),
                            s.span(start, start + 1),
                        ));
                    }
                }
            }
        }
    }

    let eof_span = s.span(s.pos, s.pos);
    tokens.push(Token::eof(eof_span, s.line_no));
    convert_keywords(&mut tokens, source);
    Ok(tokens)
}

/// Retargets identifier tokens whose spelling is a reserved word to
/// `TokenKind::Reserved` (§4.3 "A post-pass").
fn convert_keywords(tokens: &mut [Token], source: &str) {
    for tok in tokens.iter_mut() {
        if tok.is_ident() && crate::keyword::is_keyword(tok.text(source)) {
            tok.kind = TokenKind::Reserved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{IntKind, NumLit};

    fn lex(src: &str) -> (String, Vec<Token>) {
        let prepared = prepare_source(src);
        let tokens = tokenize(FileId(0), &prepared).unwrap();
        (prepared, tokens)
    }

    #[test]
    fn splices_backslash_newline_preserving_line_count() {
        let src = "int ab\\\nc = 1;\nint y;\n";
        let spliced = splice_backslash_newlines(src);
        assert_eq!(spliced.matches('\n').count(), src.matches('\n').count());
        assert!(spliced.contains("abc"));
    }

    #[test]
    fn identifier_survives_mid_token_splice() {
        let (source, tokens) = lex("int ab\\\nc;\n");
        // tokens: int, abc, ;, eof
        assert_eq!(tokens[1].text(&source), "abc");
        assert_eq!(tokens.last().unwrap().line_no, 3);
    }

    #[test]
    fn line_comment_is_skipped() {
        let (_src, tokens) = lex("int x; // comment\nint y;\n");
        assert!(!tokens.iter().any(|t| t.is_eof() && t.line_no == 1));
        assert_eq!(tokens.last().unwrap().line_no, 3);
    }

    #[test]
    fn unterminated_block_comment_is_fatal() {
        let prepared = prepare_source("int x; /* oops\n");
        assert!(tokenize(FileId(0), &prepared).is_err());
    }

    #[test]
    fn string_literal_decodes_escapes() {
        let (_src, tokens) = lex("\"a\\nb\";\n");
        match &tokens[0].kind {
            TokenKind::Str { bytes, elem_size } => {
                assert_eq!(bytes, &[b'a', b'\n', b'b']);
                assert_eq!(*elem_size, 1);
            }
            other => panic!("expected string token, got {other:?}"),
        }
    }

    #[test]
    fn wide_string_prefix_sets_elem_size() {
        let (_src, tokens) = lex("L\"x\";\n");
        match &tokens[0].kind {
            TokenKind::Str { elem_size, .. } => assert_eq!(*elem_size, 4),
            other => panic!("expected string token, got {other:?}"),
        }
    }

    #[test]
    fn integer_and_punct_tokens() {
        let (src, tokens) = lex("1+2*3;\n");
        assert!(matches!(tokens[0].kind, TokenKind::Num(NumLit::Int { value: 1, kind: IntKind::Int })));
        assert_eq!(tokens[1].text(&src), "+");
        assert!(matches!(tokens[2].kind, TokenKind::Num(NumLit::Int { value: 2, .. })));
    }

    #[test]
    fn keywords_become_reserved() {
        let (src, tokens) = lex("return 0;\n");
        assert_eq!(tokens[0].text(&src), "return");
        assert_eq!(tokens[0].kind, TokenKind::Reserved);
    }

    #[test]
    fn invalid_byte_is_fatal() {
        let prepared = prepare_source("int x = `;\n");
        assert!(tokenize(FileId(0), &prepared).is_err());
    }

    #[test]
    fn empty_translation_unit_yields_only_eof() {
        let (_src, tokens) = lex("");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_eof());
    }

    #[test]
    fn missing_trailing_newline_is_tolerated() {
        let prepared = prepare_source("int x;");
        let tokens = tokenize(FileId(0), &prepared).unwrap();
        assert!(tokens.iter().any(|t| t.is_ident()));
    }
}
