//! # cc_parse
//!
//! The parser (§4.5): turns a macro-expanded [`cc_lex::Token`] sequence into
//! a typed [`Program`] over arena-allocated [`TypeTable`], [`NodeArena`], and
//! [`VarArena`] — types, expressions, and variables are referenced by index
//! ([`TypeId`], [`NodeId`], [`VarId`]) rather than through pointers, so the
//! arenas can be walked freely by later stages without borrow-checker fights
//! (§9 "Arena + indices replace pointer graphs").
//!
//! ```text
//! Vec<Token> ──parser::parse──▶ ParseOutput { Program, NodeArena, TypeTable, VarArena }
//! ```

pub mod const_eval;
pub mod node;
pub mod parser;
pub mod program;
pub mod scope;
pub mod ty;
pub mod var;

pub use const_eval::{eval_const, eval_float, eval_rval, ConstValue, EvalCtx};
pub use node::{BinOp, Initializer, Node, NodeArena, NodeId, NodeKind, UnaryOp};
pub use parser::{parse, eval_constant_expr_tokens, ParseOutput};
pub use program::{Function, Program};
pub use scope::{Scopes, VarScopeEntry};
pub use ty::{align_to, Member, Type, TypeId, TypeKind, TypeTable};
pub use var::{Relocation, Var, VarArena, VarId};
