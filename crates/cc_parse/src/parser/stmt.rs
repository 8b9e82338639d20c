//! Statement grammar (§4.5 "Grammar summary"), including the scope-bracket
//! discipline (§4.5 "Scopes") and the `case`/`default` chain a `switch`
//! collects while its body is parsed.

use super::Parser;
use crate::node::{NodeId, NodeKind};
use cc_base::{Result, Span};

impl<'t> Parser<'t> {
    pub(super) fn compound_stmt(&mut self) -> Result<NodeId> {
        let span = self.span();
        self.expect("{")?;
        self.scopes.enter();
        let mut stmts = Vec::new();
        while !self.consume("}") {
            if self.is_declaration_start() {
                self.block_declaration(&mut stmts)?;
            } else {
                stmts.push(self.stmt()?);
            }
        }
        self.scopes.leave();
        Ok(self.push_node(NodeKind::Block(stmts), span))
    }

    fn is_declaration_start(&self) -> bool {
        const KEYWORDS: &[&str] = &[
            "void", "_Bool", "char", "short", "int", "long", "float", "double", "struct", "union",
            "enum", "typedef", "static", "extern", "const", "volatile", "register", "signed",
            "unsigned", "inline", "_Alignas", "_Noreturn", "_Thread_local",
        ];
        let text = self.cur_text();
        if KEYWORDS.contains(&text) {
            return true;
        }
        matches!(self.scopes.find_var(text), Some(crate::scope::VarScopeEntry::Typedef(_)))
    }

    /// Local declarations lower straight into the enclosing block's
    /// statement list as expression-statements (§4.5 "Locals: the tree is
    /// lowered to a comma-chained sequence of assignment expressions").
    fn block_declaration(&mut self, stmts: &mut Vec<NodeId>) -> Result<()> {
        let attr = self.typespec_attr()?;
        if self.consume(";") {
            return Ok(());
        }
        loop {
            let span = self.span();
            let (name, ty) = self.declarator(attr.base_ty)?;
            if attr.is_typedef {
                self.scopes.push_var(name, crate::scope::VarScopeEntry::Typedef(ty));
            } else if matches!(self.types.get(ty).kind, crate::ty::TypeKind::Func { .. }) {
                // A function prototype declared inside a block; no storage.
                self.scopes.push_var(name, crate::scope::VarScopeEntry::Var(self.vars_len_placeholder()));
            } else {
                let vid = if attr.is_static {
                    self.new_gvar(self.new_anon_name(&format!("__static.{name}")), ty, true)
                } else {
                    self.new_lvar(name, ty)
                };
                if self.consume("=") {
                    let var_node = self.push_node(NodeKind::Var(vid), span);
                    self.nodes.set_type(var_node, ty);
                    let expr = self.local_initializer(var_node, vid, ty, span)?;
                    let stmt = self.push_node(NodeKind::ExprStmt(expr), span);
                    stmts.push(stmt);
                }
            }
            if !self.consume(",") {
                break;
            }
        }
        self.expect(";")
    }

    /// Placeholder var id for block-scope function prototypes, which are
    /// never referenced as storage (only as a callable name lookup).
    fn vars_len_placeholder(&mut self) -> crate::var::VarId {
        self.vars.push(crate::var::Var::new_local(String::new(), self.types.void, 1))
    }

    fn stmt(&mut self) -> Result<NodeId> {
        let span = self.span();
        if self.at("{") {
            return self.compound_stmt();
        }
        if self.consume("return") {
            let value = if self.consume(";") {
                None
            } else {
                let e = self.expr()?;
                self.expect(";")?;
                Some(e)
            };
            return Ok(self.push_node(NodeKind::Return(value), span));
        }
        if self.consume("if") {
            return self.if_stmt(span);
        }
        if self.consume("for") {
            return self.for_stmt(span);
        }
        if self.consume("while") {
            return self.while_stmt(span);
        }
        if self.consume("do") {
            return self.do_stmt(span);
        }
        if self.consume("switch") {
            return self.switch_stmt(span);
        }
        if self.consume("case") {
            return self.case_stmt(span, false);
        }
        if self.consume("default") {
            return self.case_stmt(span, true);
        }
        if self.consume("break") {
            self.expect(";")?;
            if self.breakable_depth == 0 {
                return Err(self.err_here("'break' outside a loop or switch"));
            }
            return Ok(self.push_node(NodeKind::Break, span));
        }
        if self.consume("continue") {
            self.expect(";")?;
            if self.continuable_depth == 0 {
                return Err(self.err_here("'continue' outside a loop"));
            }
            return Ok(self.push_node(NodeKind::Continue, span));
        }
        if self.consume("goto") {
            let label = self.expect_ident()?;
            self.expect(";")?;
            return Ok(self.push_node(NodeKind::Goto(label), span));
        }
        if self.cur().is_ident() && self.peek(1).is_in(":", self.files) {
            let label = self.expect_ident()?;
            self.advance();
            let body = self.stmt()?;
            return Ok(self.push_node(NodeKind::Label { name: label, body }, span));
        }
        self.expr_stmt()
    }

    fn expr_stmt(&mut self) -> Result<NodeId> {
        let span = self.span();
        if self.consume(";") {
            return Ok(self.push_node(NodeKind::Block(Vec::new()), span));
        }
        let e = self.expr()?;
        self.expect(";")?;
        Ok(self.push_node(NodeKind::ExprStmt(e), span))
    }

    fn if_stmt(&mut self, span: Span) -> Result<NodeId> {
        self.expect("(")?;
        let cond = self.expr()?;
        self.expect(")")?;
        let then = self.stmt()?;
        let els = if self.consume("else") { Some(self.stmt()?) } else { None };
        Ok(self.push_node(NodeKind::If { cond, then, els }, span))
    }

    fn for_stmt(&mut self, span: Span) -> Result<NodeId> {
        self.scopes.enter();
        self.expect("(")?;
        let init = if self.is_declaration_start() {
            let mut stmts = Vec::new();
            self.block_declaration(&mut stmts)?;
            Some(self.push_node(NodeKind::Block(stmts), span))
        } else if !self.at(";") {
            let e = self.expr()?;
            self.expect(";")?;
            Some(self.push_node(NodeKind::ExprStmt(e), span))
        } else {
            self.expect(";")?;
            None
        };
        let cond = if !self.at(";") { Some(self.expr()?) } else { None };
        self.expect(";")?;
        let inc = if !self.at(")") { Some(self.expr()?) } else { None };
        self.expect(")")?;
        self.breakable_depth += 1;
        self.continuable_depth += 1;
        let body = self.stmt()?;
        self.breakable_depth -= 1;
        self.continuable_depth -= 1;
        self.scopes.leave();
        Ok(self.push_node(NodeKind::For { init, cond, inc, body }, span))
    }

    fn while_stmt(&mut self, span: Span) -> Result<NodeId> {
        self.expect("(")?;
        let cond = self.expr()?;
        self.expect(")")?;
        self.breakable_depth += 1;
        self.continuable_depth += 1;
        let body = self.stmt()?;
        self.breakable_depth -= 1;
        self.continuable_depth -= 1;
        Ok(self.push_node(NodeKind::For { init: None, cond: Some(cond), inc: None, body }, span))
    }

    fn do_stmt(&mut self, span: Span) -> Result<NodeId> {
        self.breakable_depth += 1;
        self.continuable_depth += 1;
        let body = self.stmt()?;
        self.breakable_depth -= 1;
        self.continuable_depth -= 1;
        self.expect("while")?;
        self.expect("(")?;
        let cond = self.expr()?;
        self.expect(")")?;
        self.expect(";")?;
        Ok(self.push_node(NodeKind::Do { body, cond }, span))
    }

    fn switch_stmt(&mut self, span: Span) -> Result<NodeId> {
        self.expect("(")?;
        let cond = self.expr()?;
        self.expect(")")?;
        self.switch_cases.push(Vec::new());
        self.switch_defaults.push(None);
        self.breakable_depth += 1;
        let body = self.stmt()?;
        self.breakable_depth -= 1;
        let cases = self.switch_cases.pop().unwrap();
        let default_case = self.switch_defaults.pop().unwrap();
        Ok(self.push_node(NodeKind::Switch { cond, body, cases, default_case }, span))
    }

    fn case_stmt(&mut self, span: Span, is_default: bool) -> Result<NodeId> {
        if self.switch_cases.is_empty() {
            return Err(self.err_here("'case'/'default' outside a switch"));
        }
        let val = if is_default {
            None
        } else {
            let e = self.conditional()?;
            self.add_type(e)?;
            Some(self.eval_const_node(e)?)
        };
        self.expect(":")?;
        let body = self.stmt()?;
        let id = self.push_node(NodeKind::Case { val, body }, span);
        let depth = self.switch_cases.len() - 1;
        self.switch_cases[depth].push(id);
        if is_default {
            self.switch_defaults[depth] = Some(id);
        }
        Ok(id)
    }
}
