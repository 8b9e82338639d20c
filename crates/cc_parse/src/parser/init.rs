//! Initializer parsing and lowering (§4.5 "Initializers").
//!
//! One [`Initializer`] tree is built per declaration, shaped like the type
//! being initialized (a `List` per brace level, a `Leaf` per scalar). Globals
//! lower the tree straight to a byte buffer plus a relocation chain; locals
//! lower it to a comma-chained sequence of assignment expressions seeded by
//! a `NullExpr` so the whole chain carries the declared type.

use super::Parser;
use crate::const_eval::{eval_const, eval_rval, ConstValue};
use crate::node::{Initializer, NodeId, NodeKind, UnaryOp};
use crate::ty::{Member, TypeId, TypeKind};
use crate::var::{Relocation, VarId};
use cc_base::{Result, Span};
use cc_lex::TokenKind;

impl<'t> Parser<'t> {
    /// Parses one initializer against `ty`, returning the tree and the
    /// (possibly now-concrete) type — an array declared `[]` comes back with
    /// its length filled in from the brace-list or string length.
    fn initializer(&mut self, ty: TypeId) -> Result<(Initializer, TypeId)> {
        if let TypeKind::Array { base, len } = self.types.get(ty).kind.clone() {
            if let TokenKind::Str { elem_size, .. } = &self.cur().kind {
                if self.types.is_integer(base) && self.types.size_of(base) as u8 == *elem_size {
                    return self.string_array_initializer(base, len);
                }
            }
            return self.array_initializer(base, len);
        }
        if let TypeKind::Struct { members, is_union } = self.types.get(ty).kind.clone() {
            return self.struct_initializer(ty, members, is_union);
        }
        self.scalar_initializer(ty)
    }

    fn string_array_initializer(&mut self, base: TypeId, len: usize) -> Result<(Initializer, TypeId)> {
        let span = self.span();
        let TokenKind::Str { bytes, elem_size } = self.cur().kind.clone() else { unreachable!() };
        self.advance();
        let unit = elem_size as usize;
        let count = bytes.len() / unit;
        let mut items = Vec::with_capacity(count.max(len));
        for i in 0..count {
            let mut v: i64 = 0;
            for b in 0..unit {
                v |= (bytes[i * unit + b] as i64) << (8 * b);
            }
            let node = self.num_literal_typed(v, base, span);
            items.push(Initializer::Leaf(Some(node)));
        }
        let final_len = if len == 0 { count } else { len };
        while items.len() < final_len {
            items.push(Initializer::Leaf(None));
        }
        items.truncate(final_len);
        let final_ty = self.types.array_of(base, final_len);
        Ok((Initializer::List(items), final_ty))
    }

    fn array_initializer(&mut self, base: TypeId, len: usize) -> Result<(Initializer, TypeId)> {
        self.expect("{")?;
        let mut items = Vec::new();
        while !self.at("}") {
            let (item, _) = self.initializer(base)?;
            items.push(item);
            if !self.consume(",") {
                break;
            }
        }
        self.expect("}")?;
        let final_len = if len == 0 { items.len() } else { len };
        while items.len() < final_len {
            items.push(Initializer::Leaf(None));
        }
        items.truncate(final_len);
        let final_ty = self.types.array_of(base, final_len);
        Ok((Initializer::List(items), final_ty))
    }

    fn struct_initializer(
        &mut self,
        ty: TypeId,
        members: Vec<Member>,
        is_union: bool,
    ) -> Result<(Initializer, TypeId)> {
        self.expect("{")?;
        let mut items = Vec::new();
        // A union's brace initializer sets only its first member (§4.5
        // "Struct members are consumed in declaration order").
        let take = if is_union { members.len().min(1) } else { members.len() };
        for m in members.iter().take(take) {
            if self.at("}") {
                break;
            }
            let (item, _) = self.initializer(m.ty)?;
            items.push(item);
            if !self.consume(",") {
                break;
            }
        }
        while !self.consume("}") {
            // Excess initializers beyond the member count are skipped rather
            // than rejected, matching the brace-elision tolerance of the
            // rest of this grammar.
            self.assign()?;
            if !self.consume(",") {
                self.expect("}")?;
                break;
            }
        }
        while items.len() < take {
            items.push(Initializer::Leaf(None));
        }
        Ok((Initializer::List(items), ty))
    }

    fn scalar_initializer(&mut self, ty: TypeId) -> Result<(Initializer, TypeId)> {
        if self.consume("{") {
            let (inner, _) = self.initializer(ty)?;
            self.expect("}")?;
            return Ok((inner, ty));
        }
        let span = self.span();
        let e = self.assign()?;
        self.add_type(e)?;
        let e = self.cast_to(e, ty)?;
        let _ = span;
        Ok((Initializer::Leaf(Some(e)), ty))
    }

    fn zero_literal(&mut self, ty: TypeId, span: Span) -> NodeId {
        if self.types.is_flonum(ty) {
            let node = self.nodes.push(NodeKind::Num { ival: 0, fval: 0.0 }, span);
            self.nodes.set_type(node, ty);
            node
        } else {
            self.num_literal_typed(0, ty, span)
        }
    }

    // --- globals: tree -> byte buffer + relocations -----------------------

    pub(super) fn global_initializer(&mut self, vid: VarId, ty: TypeId) -> Result<()> {
        let (tree, final_ty) = self.initializer(ty)?;
        if final_ty != ty {
            self.vars.get_mut(vid).ty = final_ty;
        }
        let size = self.types.size_of(final_ty);
        let mut buf = vec![0u8; size];
        let mut relocs = Vec::new();
        self.write_init(&tree, final_ty, &mut buf, 0, &mut relocs)?;
        let v = self.vars.get_mut(vid);
        v.init_data = Some(buf);
        v.relocations = relocs;
        Ok(())
    }

    fn write_init(
        &self,
        init: &Initializer,
        ty: TypeId,
        buf: &mut [u8],
        offset: usize,
        relocs: &mut Vec<Relocation>,
    ) -> Result<()> {
        match init {
            Initializer::Leaf(None) => Ok(()),
            Initializer::Leaf(Some(node)) => {
                let ctx = self.eval_ctx();
                let value = eval_rval(&ctx, *node)?;
                self.write_scalar(buf, offset, ty, value, relocs);
                Ok(())
            }
            Initializer::List(items) => match self.types.get(ty).kind.clone() {
                TypeKind::Array { base, .. } => {
                    let esz = self.types.size_of(base);
                    for (i, item) in items.iter().enumerate() {
                        self.write_init(item, base, buf, offset + i * esz, relocs)?;
                    }
                    Ok(())
                }
                TypeKind::Struct { members, .. } => {
                    for (i, item) in items.iter().enumerate() {
                        let m = &members[i];
                        if m.is_bitfield {
                            if let Initializer::Leaf(Some(node)) = item {
                                let v = eval_const(&self.eval_ctx(), *node)?;
                                self.write_bitfield(buf, offset + m.offset, m, v);
                            }
                        } else {
                            self.write_init(item, m.ty, buf, offset + m.offset, relocs)?;
                        }
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
        }
    }

    fn write_scalar(&self, buf: &mut [u8], offset: usize, ty: TypeId, value: ConstValue, relocs: &mut Vec<Relocation>) {
        let size = self.types.size_of(ty);
        match value {
            ConstValue::Addr { var, offset: addend } => {
                relocs.push(Relocation { offset, label: self.vars.get(var).name.clone(), addend });
            }
            ConstValue::Int(v) => {
                let bytes = v.to_le_bytes();
                buf[offset..offset + size].copy_from_slice(&bytes[..size]);
            }
            ConstValue::Float(f) => {
                if size == 4 {
                    buf[offset..offset + 4].copy_from_slice(&(f as f32).to_le_bytes());
                } else {
                    buf[offset..offset + 8].copy_from_slice(&f.to_le_bytes());
                }
            }
        }
    }

    fn write_bitfield(&self, buf: &mut [u8], offset: usize, m: &Member, value: i64) {
        let unit = self.types.size_of(m.ty);
        let mut cur: u64 = 0;
        for i in 0..unit {
            cur |= (buf[offset + i] as u64) << (8 * i);
        }
        let mask: u64 = if m.bit_width >= 64 { u64::MAX } else { (1u64 << m.bit_width) - 1 };
        cur |= ((value as u64) & mask) << m.bit_offset;
        for i in 0..unit {
            buf[offset + i] = ((cur >> (8 * i)) & 0xff) as u8;
        }
    }

    // --- locals: tree -> comma-chained assignment expression ---------------

    pub(super) fn local_initializer(
        &mut self,
        var_node: NodeId,
        vid: VarId,
        ty: TypeId,
        span: Span,
    ) -> Result<NodeId> {
        let (tree, final_ty) = self.initializer(ty)?;
        if final_ty != ty {
            self.vars.get_mut(vid).ty = final_ty;
            self.nodes.set_type(var_node, final_ty);
        }
        let null = self.push_node(NodeKind::NullExpr, span);
        self.nodes.set_type(null, final_ty);
        let mut chain = null;
        self.lower_local_init(&tree, var_node, final_ty, span, &mut chain)?;
        Ok(chain)
    }

    fn lower_local_init(
        &mut self,
        init: &Initializer,
        target: NodeId,
        ty: TypeId,
        span: Span,
        chain: &mut NodeId,
    ) -> Result<()> {
        match init {
            Initializer::Leaf(expr) => {
                let value = expr.unwrap_or_else(|| self.zero_literal(ty, span));
                self.add_type(target)?;
                let assign = self.new_assign(target, value, span)?;
                *chain = self.push_node(NodeKind::Comma { lhs: *chain, rhs: assign }, span);
                self.nodes.set_type(*chain, ty);
                Ok(())
            }
            Initializer::List(items) => match self.types.get(ty).kind.clone() {
                TypeKind::Array { base, .. } => {
                    for (i, item) in items.iter().enumerate() {
                        let idx = self.num_literal_int(i as i64, span);
                        let elem_ptr = self.new_add(target, idx, span)?;
                        let elem = self.new_unary(UnaryOp::Deref, elem_ptr, span)?;
                        self.lower_local_init(item, elem, base, span, chain)?;
                    }
                    Ok(())
                }
                TypeKind::Struct { members, .. } => {
                    for (i, item) in items.iter().enumerate() {
                        let member_ty = members[i].ty;
                        let member_node = self.push_node(NodeKind::Member { base: target, member_index: i }, span);
                        self.add_type(member_node)?;
                        self.lower_local_init(item, member_node, member_ty, span, chain)?;
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
        }
    }
}
