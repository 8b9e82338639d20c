//! The `Token` type produced by the lexer and consumed/rewritten by the
//! preprocessor (§3 "Token").

use crate::hideset::HideSet;
use crate::literal::NumLit;
use cc_base::{SourceMap, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A punctuator or a keyword spelling (after `convert_keywords`); the
    /// spec treats these as one kind, "reserved-punctuator-or-keyword".
    Reserved,
    Ident,
    Str { bytes: Vec<u8>, elem_size: u8 },
    Num(NumLit),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line_no: u32,
    /// True if this token is the first on its (logical) source line.
    pub at_bol: bool,
    /// True if whitespace (or a comment) precedes this token on the line.
    pub has_space: bool,
    /// True if this is the first token produced from its file, used by the
    /// preprocessor to recognize a leading `#` as column-one regardless of
    /// `at_bol` bookkeeping edge cases.
    pub is_first_of_file: bool,
    pub hideset: HideSet,
}

impl Token {
    pub fn eof(span: Span, line_no: u32) -> Self {
        Self {
            kind: TokenKind::Eof,
            span,
            line_no,
            at_bol: true,
            has_space: false,
            is_first_of_file: false,
            hideset: HideSet::empty(),
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_ident(&self) -> bool {
        matches!(self.kind, TokenKind::Ident)
    }

    /// Does this token's spelling (recovered via `text`) equal `s`? Used
    /// throughout the parser/preprocessor for `equal(tok, "{")`-style checks
    /// against punctuators, keywords, and identifiers alike.
    pub fn is(&self, text: &str, source: &str) -> bool {
        matches!(self.kind, TokenKind::Reserved | TokenKind::Ident) && self.text(source) == text
    }

    /// Recovers this token's source spelling via its span. For string/num
    /// tokens this is the *raw* spelling, not the decoded value.
    ///
    /// Only correct for a single-file token stream — `source` must be the
    /// contents of whichever file `self.span.file` names. Multi-file streams
    /// (anything that has passed through `#include` splicing) must use
    /// [`Token::text_in`] instead, which looks the file up itself.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.span.start as usize..self.span.end as usize]
    }

    /// Like `text`, but resolves the owning file out of `files` via
    /// `self.span.file` instead of assuming a single shared buffer — the
    /// form every multi-file-aware caller (parser, preprocessor) should use.
    pub fn text_in<'s>(&self, files: &'s SourceMap) -> &'s str {
        let src = files.contents(self.span.file);
        &src[self.span.start as usize..self.span.end as usize]
    }

    /// Like `is`, but resolves spelling via a [`SourceMap`] (see `text_in`).
    pub fn is_in(&self, text: &str, files: &SourceMap) -> bool {
        matches!(self.kind, TokenKind::Reserved | TokenKind::Ident) && self.text_in(files) == text
    }
}

/// Punctuators, longest-match-first (3 → 2 → 1 bytes), per §4.3.
pub const PUNCT_3: &[&str] = &["<<=", ">>=", "..."];
pub const PUNCT_2: &[&str] = &[
    "==", "!=", "<=", ">=", "->", "+=", "-=", "*=", "/=", "++", "--", "%=",
    "&=", "|=", "^=", "&&", "||", "<<", ">>", "##",
];

/// Matches the longest punctuator starting at `bytes`, returning its length
/// (3, 2, or 1) or `None` if `bytes[0]` is not an `ispunct` byte at all.
pub fn match_punct(bytes: &[u8]) -> Option<usize> {
    let s = std::str::from_utf8(bytes).unwrap_or("");
    for p in PUNCT_3 {
        if s.starts_with(p) {
            return Some(3);
        }
    }
    for p in PUNCT_2 {
        if s.starts_with(p) {
            return Some(2);
        }
    }
    if !bytes.is_empty() && is_ascii_punct(bytes[0]) {
        return Some(1);
    }
    None
}

fn is_ascii_punct(b: u8) -> bool {
    b.is_ascii_punctuation()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_byte_punct_wins_over_prefix() {
        assert_eq!(match_punct(b"<<=x"), Some(3));
        assert_eq!(match_punct(b"..."), Some(3));
    }

    #[test]
    fn two_byte_punct_matched() {
        assert_eq!(match_punct(b"==x"), Some(2));
        assert_eq!(match_punct(b"##"), Some(2));
    }

    #[test]
    fn single_byte_punct_fallback() {
        assert_eq!(match_punct(b"+x"), Some(1));
        assert_eq!(match_punct(b"(x"), Some(1));
    }

    #[test]
    fn non_punct_byte_is_none() {
        assert_eq!(match_punct(b"abc"), None);
    }
}
