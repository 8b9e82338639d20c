//! # cc_pp
//!
//! The preprocessor (§4.4): macro expansion with hideset discipline,
//! conditional inclusion, `#include` splicing, and final adjacent-string
//! concatenation. Takes tokens from `cc_lex`, hands tokens to `cc_parse`.
//!
//! The directive scan and macro expansion are interleaved in one pass
//! ([`directive::preprocess`]) so that `#define`/`#undef` visibility stays
//! strictly sequential in source order; [`expand::expand_tokens`] is the
//! simpler fixed-point expander used for directive-free sublists (macro
//! arguments, `#if`/`#elif` expressions).

pub mod builtin;
pub mod concat;
pub mod directive;
pub mod expand;
pub mod include;
pub mod macro_table;

pub use builtin::install_predefined;
pub use directive::preprocess;
pub use include::{IncludeKind, IncludeResolver, MapIncludeResolver};
pub use macro_table::{BuiltinKind, Macro, MacroTable};
