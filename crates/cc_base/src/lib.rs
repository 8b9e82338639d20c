//! # cc_base
//!
//! Foundational types shared by every stage of the occ pipeline:
//!
//! - [`Arena`]/[`StrArena`] — bump allocation for source text and interned spellings
//! - [`FileId`]/[`Span`] — source location tracking
//! - [`SourceMap`] — registry of every file read during one compilation
//! - [`SpannedError`]/[`Result`]/[`Diagnostics`] — errors with source positions and caret rendering
//!
//! This crate has no knowledge of C syntax or semantics. It provides only
//! generic, reusable infrastructure that the tokenizer, preprocessor,
//! parser, and code generator build upon (§2a).

pub mod arena;
pub mod diagnostics;
pub mod files;
pub mod span;

pub use arena::{Arena, StrArena};
pub use diagnostics::{Diagnostics, ErrorKind, Result, SpannedError};
pub use files::SourceMap;
pub use span::{FileId, Span};
