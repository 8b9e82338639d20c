//! Expression grammar and the typing rules `add_type` realizes (§4.2, §4.5
//! "Grammar summary").
//!
//! `expr := assign ("," expr)?` down through `primary` is one precedence
//! chain, each level a method that falls through to the next when its own
//! operator isn't present — the standard recursive-descent encoding of an
//! operator-precedence grammar.

use super::Parser;
use crate::node::{BinOp, NodeId, NodeKind, UnaryOp};
use crate::scope::VarScopeEntry;
use crate::ty::TypeId;
use cc_lex::{NumLit, TokenKind};

impl<'t> Parser<'t> {
    pub(super) fn expr(&mut self) -> cc_base::Result<NodeId> {
        let node = self.assign()?;
        if self.consume(",") {
            let span = self.span();
            let rhs = self.expr()?;
            let id = self.push_node(NodeKind::Comma { lhs: node, rhs }, span);
            self.add_type(id)?;
            return Ok(id);
        }
        Ok(node)
    }

    pub(super) fn assign(&mut self) -> cc_base::Result<NodeId> {
        let lhs = self.conditional()?;
        let span = self.span();
        if self.consume("=") {
            let rhs = self.assign()?;
            return self.new_assign(lhs, rhs, span);
        }
        for (op_text, op) in COMPOUND_ASSIGN_OPS {
            if self.at(op_text) {
                self.advance();
                let rhs = self.assign()?;
                let computed = self.new_binary(*op, lhs, rhs, span)?;
                return self.new_assign(lhs, computed, span);
            }
        }
        Ok(lhs)
    }

    pub(super) fn new_assign(&mut self, lhs: NodeId, rhs: NodeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        self.add_type(lhs)?;
        let lhs_ty = self.nodes.get(lhs).ty.unwrap();
        let rhs = self.cast_to(rhs, lhs_ty)?;
        let id = self.push_node(NodeKind::Assign { lhs, rhs }, span);
        self.nodes.set_type(id, lhs_ty);
        Ok(id)
    }

    pub(super) fn conditional(&mut self) -> cc_base::Result<NodeId> {
        let cond = self.logor()?;
        if self.consume("?") {
            let span = self.span();
            let then = self.expr()?;
            self.expect(":")?;
            let els = self.conditional()?;
            self.add_type(then)?;
            self.add_type(els)?;
            let ty = self.common_type(self.nodes.get(then).ty.unwrap(), self.nodes.get(els).ty.unwrap());
            let then = self.cast_to(then, ty)?;
            let els = self.cast_to(els, ty)?;
            let id = self.push_node(NodeKind::Cond { cond, then, els }, span);
            self.nodes.set_type(id, ty);
            return Ok(id);
        }
        Ok(cond)
    }

    fn logor(&mut self) -> cc_base::Result<NodeId> {
        self.left_assoc(&["||"], Self::logand, |_| BinOp::LogOr)
    }
    fn logand(&mut self) -> cc_base::Result<NodeId> {
        self.left_assoc(&["&&"], Self::bitor, |_| BinOp::LogAnd)
    }
    fn bitor(&mut self) -> cc_base::Result<NodeId> {
        self.left_assoc(&["|"], Self::bitxor, |_| BinOp::BitOr)
    }
    fn bitxor(&mut self) -> cc_base::Result<NodeId> {
        self.left_assoc(&["^"], Self::bitand, |_| BinOp::BitXor)
    }
    fn bitand(&mut self) -> cc_base::Result<NodeId> {
        self.left_assoc(&["&"], Self::equality, |_| BinOp::BitAnd)
    }
    fn equality(&mut self) -> cc_base::Result<NodeId> {
        self.left_assoc_multi(&[("==", BinOp::Eq), ("!=", BinOp::Ne)], Self::relational)
    }
    /// `>` and `>=` have no dedicated [`BinOp`] variant — they're the
    /// standard operand-swap of `<`/`<=` (`a > b` ≡ `b < a`), matching how
    /// the data model lists "comparison" as a single kind.
    fn relational(&mut self) -> cc_base::Result<NodeId> {
        let mut node = self.shift()?;
        loop {
            let span = self.span();
            if self.consume("<=") {
                let rhs = self.shift()?;
                node = self.new_binary(BinOp::Le, node, rhs, span)?;
            } else if self.consume(">=") {
                let rhs = self.shift()?;
                node = self.new_binary(BinOp::Le, rhs, node, span)?;
            } else if self.consume("<") {
                let rhs = self.shift()?;
                node = self.new_binary(BinOp::Lt, node, rhs, span)?;
            } else if self.consume(">") {
                let rhs = self.shift()?;
                node = self.new_binary(BinOp::Lt, rhs, node, span)?;
            } else {
                return Ok(node);
            }
        }
    }
    fn shift(&mut self) -> cc_base::Result<NodeId> {
        self.left_assoc_multi(&[("<<", BinOp::Shl), (">>", BinOp::Shr)], Self::add)
    }

    fn add(&mut self) -> cc_base::Result<NodeId> {
        let mut node = self.mul()?;
        loop {
            let span = self.span();
            if self.consume("+") {
                let rhs = self.mul()?;
                node = self.new_add(node, rhs, span)?;
            } else if self.consume("-") {
                let rhs = self.mul()?;
                node = self.new_sub(node, rhs, span)?;
            } else {
                return Ok(node);
            }
        }
    }

    fn mul(&mut self) -> cc_base::Result<NodeId> {
        self.left_assoc_multi(&[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Mod)], Self::cast_expr)
    }

    /// Generic single-operator left-associative level.
    fn left_assoc(
        &mut self,
        ops: &[&str],
        mut next: impl FnMut(&mut Self) -> cc_base::Result<NodeId>,
        op_of: impl Fn(&str) -> BinOp,
    ) -> cc_base::Result<NodeId> {
        let mut node = next(self)?;
        loop {
            let span = self.span();
            let mut matched = None;
            for o in ops {
                if self.at(o) {
                    matched = Some(*o);
                    break;
                }
            }
            match matched {
                Some(o) => {
                    self.advance();
                    let rhs = next(self)?;
                    node = self.new_binary(op_of(o), node, rhs, span)?;
                }
                None => return Ok(node),
            }
        }
    }

    fn left_assoc_multi(
        &mut self,
        ops: &[(&str, BinOp)],
        mut next: impl FnMut(&mut Self) -> cc_base::Result<NodeId>,
    ) -> cc_base::Result<NodeId> {
        let mut node = next(self)?;
        'outer: loop {
            let span = self.span();
            for (text, op) in ops {
                if self.at(text) {
                    self.advance();
                    let rhs = next(self)?;
                    node = self.new_binary(*op, node, rhs, span)?;
                    continue 'outer;
                }
            }
            return Ok(node);
        }
    }

    fn cast_expr(&mut self) -> cc_base::Result<NodeId> {
        if self.at("(") && self.next_is_typename() {
            let span = self.span();
            self.advance();
            let (_, ty) = self.abstract_declarator_or_typename()?;
            self.expect(")")?;
            if self.at("{") {
                return self.compound_literal(ty, span);
            }
            let inner = self.cast_expr()?;
            return self.cast_to(inner, ty);
        }
        self.unary()
    }

    /// Lookahead to tell `(typename)` casts from `(expr)` groupings, since
    /// both start identically.
    fn next_is_typename(&self) -> bool {
        let saved = self.peek(1);
        let text = saved.text_in(self.files);
        const KEYWORDS: &[&str] = &[
            "void", "_Bool", "char", "short", "int", "long", "float", "double", "struct", "union",
            "enum", "const", "volatile", "signed", "unsigned",
        ];
        if KEYWORDS.contains(&text) {
            return true;
        }
        matches!(self.scopes.find_var(text), Some(VarScopeEntry::Typedef(_)))
    }

    fn unary(&mut self) -> cc_base::Result<NodeId> {
        let span = self.span();
        if self.consume("+") {
            return self.cast_expr();
        }
        if self.consume("-") {
            let operand = self.cast_expr()?;
            return self.new_unary(UnaryOp::Neg, operand, span);
        }
        if self.consume("&") {
            let operand = self.cast_expr()?;
            return self.new_unary(UnaryOp::Addr, operand, span);
        }
        if self.consume("*") {
            let operand = self.cast_expr()?;
            return self.new_unary(UnaryOp::Deref, operand, span);
        }
        if self.consume("!") {
            let operand = self.cast_expr()?;
            return self.new_unary(UnaryOp::LogNot, operand, span);
        }
        if self.consume("~") {
            let operand = self.cast_expr()?;
            return self.new_unary(UnaryOp::BitNot, operand, span);
        }
        if self.consume("++") {
            // `++x` desugars to `x += 1` (§4.5 "op-assign desugared via
            // address-capture").
            let operand = self.unary()?;
            let one = self.num_literal_int(1, span);
            let sum = self.new_add(operand, one, span)?;
            return self.new_assign(operand, sum, span);
        }
        if self.consume("--") {
            let operand = self.unary()?;
            let one = self.num_literal_int(1, span);
            let sum = self.new_sub(operand, one, span)?;
            return self.new_assign(operand, sum, span);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> cc_base::Result<NodeId> {
        let mut node = self.primary()?;
        loop {
            let span = self.span();
            if self.consume("[") {
                let idx = self.expr()?;
                self.expect("]")?;
                let deref_target = self.new_add(node, idx, span)?;
                node = self.new_unary(UnaryOp::Deref, deref_target, span)?;
            } else if self.consume(".") {
                let name = self.expect_ident()?;
                node = self.member_access(node, &name, span)?;
            } else if self.consume("->") {
                let name = self.expect_ident()?;
                let deref = self.new_unary(UnaryOp::Deref, node, span)?;
                node = self.member_access(deref, &name, span)?;
            } else if self.consume("++") {
                node = self.new_post_inc_dec(node, 1, span)?;
            } else if self.consume("--") {
                node = self.new_post_inc_dec(node, -1, span)?;
            } else {
                return Ok(node);
            }
        }
    }

    /// `x++`/`x--`: store `x + addend`, then subtract `addend` back off the
    /// *result* of that store so the expression's value is the pre-update
    /// one, without re-reading `x` (which could itself have side effects).
    fn new_post_inc_dec(&mut self, node: NodeId, addend: i64, span: cc_base::Span) -> cc_base::Result<NodeId> {
        self.add_type(node)?;
        let orig_ty = self.nodes.get(node).ty.unwrap();
        let delta = self.num_literal_int(addend, span);
        let bumped = self.new_add(node, delta, span)?;
        let assign = self.new_assign(node, bumped, span)?;
        let back_off = self.num_literal_int(-addend, span);
        let undone = self.new_add(assign, back_off, span)?;
        self.cast_to(undone, orig_ty)
    }

    pub(super) fn member_access(&mut self, base: NodeId, name: &str, span: cc_base::Span) -> cc_base::Result<NodeId> {
        self.add_type(base)?;
        let base_ty = self.nodes.get(base).ty.unwrap();
        let idx = match &self.types.get(base_ty).kind {
            crate::ty::TypeKind::Struct { members, .. } => members
                .iter()
                .position(|m| m.name_text.as_deref() == Some(name))
                .ok_or_else(|| self.err_here(format!("no member named '{name}'")))?,
            _ => return Err(self.err_here("member access on a non-struct/union type")),
        };
        let id = self.push_node(NodeKind::Member { base, member_index: idx }, span);
        self.add_type(id)?;
        Ok(id)
    }

    fn primary(&mut self) -> cc_base::Result<NodeId> {
        let span = self.span();
        if self.consume("(") {
            if self.at("{") {
                return self.stmt_expr(span);
            }
            let node = self.expr()?;
            self.expect(")")?;
            return Ok(node);
        }
        if self.at("sizeof") {
            return self.sizeof_expr();
        }
        if self.at("_Alignof") {
            return self.alignof_expr();
        }
        match &self.cur().kind.clone() {
            TokenKind::Num(lit) => {
                self.advance();
                Ok(self.num_literal_from(lit, span))
            }
            TokenKind::Str { bytes, elem_size } => {
                self.advance();
                self.string_literal(bytes.clone(), *elem_size, span)
            }
            TokenKind::Ident => {
                let name = self.cur_text().to_string();
                if self.peek(1).is_in("(", self.files) {
                    return self.funcall(name, span);
                }
                self.advance();
                self.ident_expr(&name, span)
            }
            _ => Err(self.err_here("expected an expression")),
        }
    }

    fn sizeof_expr(&mut self) -> cc_base::Result<NodeId> {
        let span = self.span();
        self.advance();
        let ty = if self.at("(") && self.next_is_typename() {
            self.advance();
            let (_, ty) = self.abstract_declarator_or_typename()?;
            self.expect(")")?;
            ty
        } else {
            let e = self.unary()?;
            self.add_type(e)?;
            self.nodes.get(e).ty.unwrap()
        };
        let size = self.types.size_of(ty) as i64;
        Ok(self.num_literal_ulong(size, span))
    }

    fn alignof_expr(&mut self) -> cc_base::Result<NodeId> {
        let span = self.span();
        self.advance();
        self.expect("(")?;
        let (_, ty) = self.abstract_declarator_or_typename()?;
        self.expect(")")?;
        let align = self.types.align_of(ty) as i64;
        Ok(self.num_literal_ulong(align, span))
    }

    fn stmt_expr(&mut self, span: cc_base::Span) -> cc_base::Result<NodeId> {
        // GNU `({ ... })`: the value is that of the final expression
        // statement in the block.
        self.scopes.enter();
        let body = self.compound_stmt()?;
        self.scopes.leave();
        self.expect(")")?;
        let id = self.push_node(NodeKind::StmtExpr(body), span);
        let ty = match &self.nodes.get(body).kind {
            NodeKind::Block(stmts) => stmts
                .last()
                .and_then(|last| match &self.nodes.get(*last).kind {
                    NodeKind::ExprStmt(e) => self.nodes.get(*e).ty,
                    _ => None,
                })
                .unwrap_or(self.types.void),
            _ => self.types.void,
        };
        self.nodes.set_type(id, ty);
        Ok(id)
    }

    fn funcall(&mut self, name: String, span: cc_base::Span) -> cc_base::Result<NodeId> {
        self.advance();
        self.expect("(")?;
        let mut args = Vec::new();
        if !self.at(")") {
            loop {
                let a = self.assign()?;
                self.add_type(a)?;
                args.push(a);
                if !self.consume(",") {
                    break;
                }
            }
        }
        self.expect(")")?;
        // Each argument is lowered to a fresh temp assignment so evaluation
        // order is explicit left-to-right (§4.5 "Function calls").
        let mut temp_assigns = Vec::new();
        let mut temp_refs = Vec::new();
        for a in &args {
            let aty = self.nodes.get(*a).ty.unwrap();
            let decayed = self.types.decay(aty);
            let tmp = self.new_lvar(self.new_anon_name("__arg"), decayed);
            let tmp_node = self.push_node(NodeKind::Var(tmp), span);
            self.nodes.set_type(tmp_node, decayed);
            let assign = self.new_assign(tmp_node, *a, span)?;
            temp_assigns.push(assign);
            let tmp_ref = self.push_node(NodeKind::Var(tmp), span);
            self.nodes.set_type(tmp_ref, decayed);
            temp_refs.push(tmp_ref);
        }
        let func_ty = match self.scopes.find_var(&name) {
            Some(VarScopeEntry::Var(vid)) => self.vars.get(*vid).ty,
            _ => {
                log::warn!("implicit declaration of function '{name}'");
                self.types.func_type(self.types.int, Vec::new(), Vec::new(), true)
            }
        };
        let return_ty = match &self.types.get(func_ty).kind {
            crate::ty::TypeKind::Func { return_ty, .. } => *return_ty,
            _ => self.types.int,
        };
        let call = self.push_node(NodeKind::Funcall { name, func_ty, args: temp_refs }, span);
        self.nodes.set_type(call, return_ty);
        let mut chain = call;
        for assign in temp_assigns.into_iter().rev() {
            chain = self.push_node(NodeKind::Comma { lhs: assign, rhs: chain }, span);
            self.nodes.set_type(chain, return_ty);
        }
        Ok(chain)
    }

    fn ident_expr(&mut self, name: &str, span: cc_base::Span) -> cc_base::Result<NodeId> {
        match self.scopes.find_var(name).cloned() {
            Some(VarScopeEntry::Var(vid)) => {
                let ty = self.vars.get(vid).ty;
                let id = self.push_node(NodeKind::Var(vid), span);
                self.nodes.set_type(id, ty);
                Ok(id)
            }
            Some(VarScopeEntry::EnumConst { ty, value }) => Ok(self.num_literal_typed(value, ty, span)),
            Some(VarScopeEntry::Typedef(_)) => Err(self.err_here(format!("'{name}' is a type, not a value"))),
            None => Err(self.err_here(format!("undeclared identifier '{name}'"))),
        }
    }

    fn compound_literal(&mut self, ty: TypeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        let is_global = self.scopes.is_global_scope();
        let name = self.new_anon_name(".compound");
        if is_global {
            let vid = self.new_gvar(name, ty, true);
            self.global_initializer(vid, ty)?;
            let id = self.push_node(NodeKind::Var(vid), span);
            self.nodes.set_type(id, ty);
            Ok(id)
        } else {
            let vid = self.new_lvar(name, ty);
            let var_node = self.push_node(NodeKind::Var(vid), span);
            self.nodes.set_type(var_node, ty);
            self.local_initializer(var_node, vid, ty, span)
        }
    }

    // --- literal construction helpers -------------------------------------

    fn num_literal_from(&mut self, lit: &NumLit, span: cc_base::Span) -> NodeId {
        match lit {
            NumLit::Int { value, kind } => {
                let ty = match kind {
                    cc_lex::IntKind::Int => self.types.int,
                    cc_lex::IntKind::UInt => self.types.uint,
                    cc_lex::IntKind::Long => self.types.long,
                    cc_lex::IntKind::ULong => self.types.ulong,
                };
                self.num_literal_typed(*value as i64, ty, span)
            }
            NumLit::Float { value, is_float } => {
                let ty = if *is_float { self.types.float } else { self.types.double };
                let id = self.push_node(NodeKind::Num { ival: 0, fval: *value }, span);
                self.nodes.set_type(id, ty);
                id
            }
        }
    }

    pub(super) fn num_literal_typed(&mut self, value: i64, ty: TypeId, span: cc_base::Span) -> NodeId {
        let id = self.push_node(NodeKind::Num { ival: value, fval: 0.0 }, span);
        self.nodes.set_type(id, ty);
        id
    }

    pub(super) fn num_literal_int(&mut self, value: i64, span: cc_base::Span) -> NodeId {
        self.num_literal_typed(value, self.types.int, span)
    }

    fn num_literal_ulong(&mut self, value: i64, span: cc_base::Span) -> NodeId {
        self.num_literal_typed(value, self.types.ulong, span)
    }

    fn string_literal(&mut self, bytes: Vec<u8>, elem_size: u8, span: cc_base::Span) -> cc_base::Result<NodeId> {
        let elem_ty = match elem_size {
            1 => self.types.char_,
            2 => self.types.short,
            4 => self.types.int,
            _ => self.types.char_,
        };
        let len = bytes.len() / elem_size.max(1) as usize + 1;
        let arr_ty = self.types.array_of(elem_ty, len);
        let name = self.new_anon_name(".str");
        let vid = self.new_gvar(name, arr_ty, true);
        let mut data = bytes;
        data.extend(std::iter::repeat(0u8).take(elem_size as usize));
        self.vars.get_mut(vid).init_data = Some(data);
        let id = self.push_node(NodeKind::Var(vid), span);
        self.nodes.set_type(id, arr_ty);
        Ok(id)
    }

    // --- typed node construction -------------------------------------------

    pub(super) fn new_unary(&mut self, op: UnaryOp, operand: NodeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        self.add_type(operand)?;
        let id = self.push_node(NodeKind::Unary { op, operand }, span);
        let operand_ty = self.nodes.get(operand).ty.unwrap();
        let ty = match op {
            UnaryOp::Neg | UnaryOp::BitNot => self.promote_int_or_float(operand_ty),
            UnaryOp::LogNot => self.types.int,
            UnaryOp::Addr => {
                let decayed = self.types.decay(operand_ty);
                self.types.pointer_to(decayed)
            }
            UnaryOp::Deref => {
                let decayed = self.types.decay(operand_ty);
                match self.types.base_of(decayed) {
                    Some(base) => {
                        if base == self.types.void {
                            return Err(self.err_here("cannot dereference a pointer to void"));
                        }
                        base
                    }
                    None => return Err(self.err_here("cannot dereference a non-pointer")),
                }
            }
        };
        self.nodes.set_type(id, ty);
        Ok(id)
    }

    pub(super) fn new_binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        match op {
            BinOp::Add => self.new_add(lhs, rhs, span),
            BinOp::Sub => self.new_sub(lhs, rhs, span),
            _ => {
                self.add_type(lhs)?;
                self.add_type(rhs)?;
                let lty = self.nodes.get(lhs).ty.unwrap();
                let rty = self.nodes.get(rhs).ty.unwrap();
                let result_ty = match op {
                    BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::LogAnd | BinOp::LogOr => self.types.int,
                    BinOp::Shl | BinOp::Shr => self.promote_int_or_float(lty),
                    _ => self.common_type(lty, rty),
                };
                let (lhs, rhs) = if matches!(op, BinOp::Shl | BinOp::Shr) {
                    (self.cast_to(lhs, result_ty)?, rhs)
                } else if matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le) {
                    let c = self.common_type(lty, rty);
                    (self.cast_to(lhs, c)?, self.cast_to(rhs, c)?)
                } else {
                    (self.cast_to(lhs, result_ty)?, self.cast_to(rhs, result_ty)?)
                };
                let id = self.push_node(NodeKind::Binary { op, lhs, rhs }, span);
                self.nodes.set_type(id, result_ty);
                Ok(id)
            }
        }
    }

    /// `ptr + int`, `int + ptr`, or numeric add; pointer arithmetic scales
    /// the integer side by the pointee's size (§1 "pointer arithmetic
    /// scaling").
    pub(super) fn new_add(&mut self, lhs: NodeId, rhs: NodeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        self.add_type(lhs)?;
        self.add_type(rhs)?;
        let lty = self.nodes.get(lhs).ty.unwrap();
        let rty = self.nodes.get(rhs).ty.unwrap();
        if self.types.is_numeric(lty) && self.types.is_numeric(rty) {
            return self.new_numeric_binary(BinOp::Add, lhs, rhs, span);
        }
        if self.types.is_pointer(lty) || self.types.is_array(lty) {
            if self.types.is_pointer(rty) || self.types.is_array(rty) {
                return Err(self.err_here("cannot add two pointers"));
            }
            return self.new_pointer_add(lhs, rhs, span);
        }
        if self.types.is_pointer(rty) || self.types.is_array(rty) {
            return self.new_pointer_add(rhs, lhs, span);
        }
        Err(self.err_here("invalid operands to binary +"))
    }

    fn new_sub(&mut self, lhs: NodeId, rhs: NodeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        self.add_type(lhs)?;
        self.add_type(rhs)?;
        let lty = self.nodes.get(lhs).ty.unwrap();
        let rty = self.nodes.get(rhs).ty.unwrap();
        if self.types.is_numeric(lty) && self.types.is_numeric(rty) {
            return self.new_numeric_binary(BinOp::Sub, lhs, rhs, span);
        }
        let lhs_is_ptr = self.types.is_pointer(lty) || self.types.is_array(lty);
        if lhs_is_ptr && self.types.is_numeric(rty) {
            return self.new_pointer_sub_int(lhs, rhs, span);
        }
        let rhs_is_ptr = self.types.is_pointer(rty) || self.types.is_array(rty);
        if lhs_is_ptr && rhs_is_ptr {
            let lhs_decayed_ty = self.types.decay(lty);
            let elem_size = self.types.base_of(lhs_decayed_ty).map(|b| self.types.size_of(b)).unwrap_or(1) as i64;
            let lhs = self.cast_to(lhs, self.types.long)?;
            let rhs = self.cast_to(rhs, self.types.long)?;
            let diff = self.push_node(NodeKind::Binary { op: BinOp::Sub, lhs, rhs }, span);
            self.nodes.set_type(diff, self.types.long);
            let size_node = self.num_literal_typed(elem_size, self.types.long, span);
            let id = self.push_node(NodeKind::Binary { op: BinOp::Div, lhs: diff, rhs: size_node }, span);
            self.nodes.set_type(id, self.types.long);
            return Ok(id);
        }
        Err(self.err_here("invalid operands to binary -"))
    }

    fn new_pointer_add(&mut self, ptr: NodeId, int: NodeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        let pty = self.nodes.get(ptr).ty.unwrap();
        let decayed = self.types.decay(pty);
        let elem_size = self.types.base_of(decayed).map(|b| self.types.size_of(b)).unwrap_or(1) as i64;
        let int = self.cast_to(int, self.types.long)?;
        let scaled = if elem_size == 1 {
            int
        } else {
            let size_node = self.num_literal_typed(elem_size, self.types.long, span);
            let id = self.push_node(NodeKind::Binary { op: BinOp::Mul, lhs: int, rhs: size_node }, span);
            self.nodes.set_type(id, self.types.long);
            id
        };
        let ptr = self.cast_to(ptr, decayed)?;
        let id = self.push_node(NodeKind::Binary { op: BinOp::Add, lhs: ptr, rhs: scaled }, span);
        self.nodes.set_type(id, decayed);
        Ok(id)
    }

    fn new_pointer_sub_int(&mut self, ptr: NodeId, int: NodeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        let pty = self.nodes.get(ptr).ty.unwrap();
        let decayed = self.types.decay(pty);
        let elem_size = self.types.base_of(decayed).map(|b| self.types.size_of(b)).unwrap_or(1) as i64;
        let int = self.cast_to(int, self.types.long)?;
        let scaled = if elem_size == 1 {
            int
        } else {
            let size_node = self.num_literal_typed(elem_size, self.types.long, span);
            let id = self.push_node(NodeKind::Binary { op: BinOp::Mul, lhs: int, rhs: size_node }, span);
            self.nodes.set_type(id, self.types.long);
            id
        };
        let ptr = self.cast_to(ptr, decayed)?;
        let id = self.push_node(NodeKind::Binary { op: BinOp::Sub, lhs: ptr, rhs: scaled }, span);
        self.nodes.set_type(id, decayed);
        Ok(id)
    }

    fn new_numeric_binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId, span: cc_base::Span) -> cc_base::Result<NodeId> {
        let lty = self.nodes.get(lhs).ty.unwrap();
        let rty = self.nodes.get(rhs).ty.unwrap();
        let ty = self.common_type(lty, rty);
        let lhs = self.cast_to(lhs, ty)?;
        let rhs = self.cast_to(rhs, ty)?;
        let id = self.push_node(NodeKind::Binary { op, lhs, rhs }, span);
        self.nodes.set_type(id, ty);
        Ok(id)
    }

    pub(super) fn cast_to(&mut self, node: NodeId, ty: TypeId) -> cc_base::Result<NodeId> {
        self.add_type(node)?;
        let from = self.nodes.get(node).ty.unwrap();
        if from == ty {
            return Ok(node);
        }
        let span = self.nodes.get(node).span;
        let id = self.push_node(NodeKind::Cast(node), span);
        self.nodes.set_type(id, ty);
        Ok(id)
    }

    /// Any integer narrower than `int` promotes to `int`; floats pass
    /// through (§4.2 "Usual arithmetic conversion").
    fn promote_int_or_float(&self, ty: TypeId) -> TypeId {
        if self.types.is_flonum(ty) {
            return ty;
        }
        if self.types.size_of(ty) < 4 {
            self.types.int
        } else {
            ty
        }
    }

    /// The common type of a binary arithmetic operator's two operands
    /// (§4.2 "Usual arithmetic conversion").
    pub(super) fn common_type(&self, a: TypeId, b: TypeId) -> TypeId {
        if a == self.types.double || b == self.types.double {
            return self.types.double;
        }
        if a == self.types.float || b == self.types.float {
            return self.types.float;
        }
        let a = self.promote_int_or_float(a);
        let b = self.promote_int_or_float(b);
        let sa = self.types.size_of(a);
        let sb = self.types.size_of(b);
        if sa != sb {
            return if sa > sb { a } else { b };
        }
        if self.types.is_unsigned(a) {
            a
        } else {
            b
        }
    }

    /// `add_type`'s per-kind rule table (§4.2). Children are already typed
    /// by the time their parent node is constructed, so this never
    /// recurses — the memoization in [`Parser::add_type`] is what makes the
    /// overall walk post-order.
    pub(super) fn infer_type(&mut self, id: NodeId) -> cc_base::Result<TypeId> {
        let kind = self.nodes.get(id).kind.clone();
        Ok(match kind {
            NodeKind::Num { .. } => self.types.int,
            NodeKind::Var(vid) => self.vars.get(vid).ty,
            NodeKind::Cast(inner) => self.nodes.get(inner).ty.unwrap_or(self.types.int),
            NodeKind::NullExpr => self.types.void,
            NodeKind::Assign { lhs, .. } => self.nodes.get(lhs).ty.unwrap_or(self.types.int),
            NodeKind::Comma { rhs, .. } => self.nodes.get(rhs).ty.unwrap_or(self.types.int),
            NodeKind::Member { base, member_index } => {
                let base_ty = self.nodes.get(base).ty.unwrap();
                match &self.types.get(base_ty).kind {
                    crate::ty::TypeKind::Struct { members, .. } => members[member_index].ty,
                    _ => self.types.int,
                }
            }
            NodeKind::Funcall { func_ty, .. } => match &self.types.get(func_ty).kind {
                crate::ty::TypeKind::Func { return_ty, .. } => *return_ty,
                _ => self.types.int,
            },
            _ => self.types.int,
        })
    }
}

const COMPOUND_ASSIGN_OPS: &[(&str, BinOp)] = &[
    ("+=", BinOp::Add),
    ("-=", BinOp::Sub),
    ("*=", BinOp::Mul),
    ("/=", BinOp::Div),
    ("%=", BinOp::Mod),
    ("&=", BinOp::BitAnd),
    ("|=", BinOp::BitOr),
    ("^=", BinOp::BitXor),
    ("<<=", BinOp::Shl),
    (">>=", BinOp::Shr),
];
