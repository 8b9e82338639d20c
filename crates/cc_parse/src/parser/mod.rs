//! Recursive-descent parser (§4.5, §9 "Recursive descent is the concurrency
//! contract").
//!
//! Each production is a plain method that consumes tokens through `self.pos`
//! — the idiomatic-Rust equivalent of the "current token + rest pointer"
//! pair described by the data model: `&mut self` plays the role of the out
//! parameter, and lookahead is free (`self.peek(n)`) since nothing is
//! destroyed by looking ahead.

mod expr;
mod init;
mod stmt;
mod types;

use crate::const_eval::{eval_const, EvalCtx};
use crate::node::{NodeArena, NodeId, NodeKind};
use crate::program::{Function, Program};
use crate::scope::Scopes;
use crate::ty::{TypeId, TypeTable};
use crate::var::{Var, VarArena, VarId};
use cc_base::{ErrorKind, Result, SourceMap, SpannedError, Span};
use cc_lex::{Token, TokenKind};

pub use types::VarAttr;

/// Everything the parser accumulates; returned to the driver once `program`
/// completes so code generation can walk it without re-touching the parser.
pub struct ParseOutput {
    pub program: Program,
    pub nodes: NodeArena,
    pub types: TypeTable,
    pub vars: VarArena,
}

pub struct Parser<'t> {
    toks: &'t [Token],
    files: &'t SourceMap,
    pos: usize,
    nodes: NodeArena,
    types: TypeTable,
    vars: VarArena,
    scopes: Scopes,
    locals: Vec<VarId>,
    globals: Vec<VarId>,
    functions: Vec<Function>,
    switch_cases: Vec<Vec<NodeId>>,
    switch_defaults: Vec<Option<NodeId>>,
    breakable_depth: u32,
    continuable_depth: u32,
    anon_counter: u32,
}

/// Parses a complete translation unit's tokens (already macro-expanded by
/// `cc_pp`) into a typed [`Program`] plus its backing arenas.
///
/// `files` resolves each token's spelling via its own `Span.file`, so a
/// stream spliced from multiple files by `#include` expansion is handled
/// correctly — no single flat source buffer is assumed.
pub fn parse(toks: &[Token], files: &SourceMap) -> Result<ParseOutput> {
    let mut p = Parser::new(toks, files);
    p.program()?;
    Ok(ParseOutput {
        program: Program { globals: p.globals, functions: p.functions },
        nodes: p.nodes,
        types: p.types,
        vars: p.vars,
    })
}

/// Parses a single constant-expression token slice (the preprocessor's
/// `#if`/`#elif` use, per §9) and evaluates it to an integer.
pub fn eval_constant_expr_tokens(toks: &[Token], files: &SourceMap) -> Result<i64> {
    let mut p = Parser::new(toks, files);
    let node = p.conditional()?;
    let ctx = EvalCtx { nodes: &p.nodes, types: &p.types, vars: &p.vars };
    eval_const(&ctx, node)
}

impl<'t> Parser<'t> {
    fn new(toks: &'t [Token], files: &'t SourceMap) -> Self {
        Parser {
            toks,
            files,
            pos: 0,
            nodes: NodeArena::new(),
            types: TypeTable::new(),
            vars: VarArena::new(),
            scopes: Scopes::new(),
            locals: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            switch_cases: Vec::new(),
            switch_defaults: Vec::new(),
            breakable_depth: 0,
            continuable_depth: 0,
            anon_counter: 0,
        }
    }

    fn cur(&self) -> &Token {
        &self.toks[self.pos]
    }

    fn peek(&self, n: usize) -> &Token {
        &self.toks[(self.pos + n).min(self.toks.len() - 1)]
    }

    fn text(&self, tok: &Token) -> &'t str {
        tok.text_in(self.files)
    }

    fn cur_text(&self) -> &'t str {
        self.text(self.cur())
    }

    fn is_eof(&self) -> bool {
        self.cur().is_eof()
    }

    fn at(&self, s: &str) -> bool {
        self.cur().is_in(s, self.files)
    }

    fn advance(&mut self) -> &'t Token {
        let t = &self.toks[self.pos];
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn span(&self) -> Span {
        self.cur().span
    }

    /// Consumes `s` if present, returns whether it matched.
    fn consume(&mut self, s: &str) -> bool {
        if self.at(s) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        if !self.at(s) {
            return Err(self.err_here(format!("expected '{s}'")));
        }
        self.advance();
        Ok(())
    }

    fn expect_ident(&mut self) -> Result<String> {
        if !self.cur().is_ident() {
            return Err(self.err_here("expected an identifier"));
        }
        let name = self.cur_text().to_string();
        self.advance();
        Ok(name)
    }

    fn err_here(&self, msg: impl Into<String>) -> SpannedError {
        SpannedError::new(ErrorKind::Parse, msg.into(), self.span())
    }

    fn push_node(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.nodes.push(kind, span)
    }

    fn new_anon_name(&mut self, prefix: &str) -> String {
        self.anon_counter += 1;
        format!("{prefix}.{}", self.anon_counter)
    }

    fn eval_ctx(&self) -> EvalCtx<'_> {
        EvalCtx { nodes: &self.nodes, types: &self.types, vars: &self.vars }
    }

    fn eval_const_node(&self, id: NodeId) -> Result<i64> {
        eval_const(&self.eval_ctx(), id)
    }

    /// `add_type` (§4.2): memoized post-order typing. Called right after a
    /// node's children are already typed, so this only ever needs to look at
    /// the immediate children's `ty` fields, never recurse itself.
    fn add_type(&mut self, id: NodeId) -> Result<()> {
        if self.nodes.get(id).ty.is_some() {
            return Ok(());
        }
        let ty = self.infer_type(id)?;
        self.nodes.set_type(id, ty);
        Ok(())
    }

    fn new_lvar(&mut self, name: String, ty: TypeId) -> VarId {
        let align = self.types.align_of(ty);
        let id = self.vars.push(Var::new_local(name.clone(), ty, align));
        self.locals.push(id);
        self.scopes.push_var(name, crate::scope::VarScopeEntry::Var(id));
        id
    }

    fn new_gvar(&mut self, name: String, ty: TypeId, is_static: bool) -> VarId {
        let align = self.types.align_of(ty);
        let id = self.vars.push(Var::new_global(name.clone(), ty, align, is_static));
        self.globals.push(id);
        self.scopes.push_var(name, crate::scope::VarScopeEntry::Var(id));
        id
    }

    fn program(&mut self) -> Result<()> {
        while !self.is_eof() {
            let attr = self.typespec_attr()?;
            let base_ty = attr.base_ty;
            if self.consume(";") {
                continue;
            }
            // Distinguish a function definition from a global declaration by
            // peeking far enough: parse one declarator, then check for "{".
            let (name, ty) = self.declarator(base_ty)?;
            if self.consume("{") {
                self.function_definition(name, ty, &attr)?;
            } else {
                self.global_declaration(name, ty, &attr)?;
                while self.consume(",") {
                    let (name, ty) = self.declarator(base_ty)?;
                    self.global_declaration(name, ty, &attr)?;
                }
                self.expect(";")?;
            }
        }
        Ok(())
    }

    fn function_definition(&mut self, name: String, ty: TypeId, attr: &VarAttr) -> Result<()> {
        let (params, param_names, is_variadic) = match &self.types.get(ty).kind {
            crate::ty::TypeKind::Func { params, param_names, is_variadic, .. } => {
                (params.clone(), param_names.clone(), *is_variadic)
            }
            _ => return Err(self.err_here("function definition requires a function type")),
        };
        self.scopes.enter();
        self.locals = Vec::new();
        let mut param_ids = Vec::new();
        for (i, pty) in params.iter().enumerate() {
            let pname = param_names.get(i).filter(|n| !n.is_empty()).cloned()
                .unwrap_or_else(|| format!("__param{i}"));
            param_ids.push(self.new_lvar(pname, *pty));
        }
        let body = self.compound_stmt()?;
        self.scopes.leave();
        self.functions.push(Function {
            name,
            params: param_ids,
            locals: std::mem::take(&mut self.locals),
            body,
            stack_size: 0,
            is_static: attr.is_static,
            is_variadic,
            is_definition: true,
        });
        Ok(())
    }

    fn global_declaration(&mut self, name: String, ty: TypeId, attr: &VarAttr) -> Result<()> {
        if matches!(self.types.get(ty).kind, crate::ty::TypeKind::Func { .. }) {
            self.functions.push(Function {
                name,
                params: Vec::new(),
                locals: Vec::new(),
                body: self.nodes.push(NodeKind::Block(Vec::new()), self.span()),
                stack_size: 0,
                is_static: attr.is_static,
                is_variadic: false,
                is_definition: false,
            });
            return Ok(());
        }
        let vid = self.new_gvar(name, ty, attr.is_static);
        if self.consume("=") {
            self.global_initializer(vid, ty)?;
        }
        Ok(())
    }
}
