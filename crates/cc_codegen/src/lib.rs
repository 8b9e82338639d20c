//! # cc_codegen
//!
//! Walks a [`cc_parse::ParseOutput`] and emits GNU-syntax assembly text
//! (§4.6, §4.7) for one of two targets:
//!
//! ```text
//! ParseOutput { Program, NodeArena, TypeTable, VarArena }
//!         │
//!         ├── emit_x86_64 ──▶ x86-64 / System V assembly (primary target)
//!         └── emit_rv64   ──▶ RV64GC assembly (secondary target)
//! ```
//!
//! Both backends share the architecture-neutral pieces — the
//! [`machine::RegStack`] abstract machine, the stack-layout pass and label
//! generator in [`layout`], and `.data`/`.bss` emission in [`data`] — but
//! are otherwise independently coded in [`x86_64`] and [`rv64`] rather than
//! behind one generic walker; see [`backend`]'s module doc for why.

pub mod backend;
pub mod data;
pub mod layout;
pub mod machine;
pub mod rv64;
pub mod x86_64;

use cc_base::SourceMap;
use cc_parse::ParseOutput;

/// Emits x86-64 / System V assembly for `parse` (the primary target, §4.6).
pub fn emit_x86_64(parse: &mut ParseOutput, files: &SourceMap, pic: bool) -> String {
    x86_64::emit(parse, files, pic)
}

/// Emits RV64GC assembly for `parse` (the secondary target, §4.7).
pub fn emit_rv64(parse: &mut ParseOutput, files: &SourceMap, pic: bool) -> String {
    rv64::emit(parse, files, pic)
}
