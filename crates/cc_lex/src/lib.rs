//! # cc_lex
//!
//! The tokenizer (§4.3): reads one file's bytes, splices backslash-newline
//! continuations, and scans a complete [`Token`] sequence terminated by an
//! EOF sentinel. Every token carries its [`HideSet`] so the preprocessor
//! (`cc_pp`) can rewrite the sequence in place without re-lexing.
//!
//! ```text
//! file bytes ──splice──▶ NUL-terminated buffer ──scan──▶ Vec<Token>
//! ```

pub mod hideset;
pub mod keyword;
pub mod lexer;
pub mod literal;
pub mod token;

pub use hideset::HideSet;
pub use lexer::{prepare_source, splice_backslash_newlines, tokenize};
pub use literal::{IntKind, NumLit};
pub use token::{match_punct, Token, TokenKind};
