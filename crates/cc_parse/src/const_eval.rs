//! The constant-expression evaluator shared between the parser, the
//! preprocessor's `#if`/`#elif`, and the global-initializer serializer (§4.5
//! "Constant expression", §9 "Preprocessor-parser shared evaluator").
//!
//! Kept as a single function over [`Node`](crate::node::Node), not `Token`:
//! the preprocessor rebuilds a token list for its conditional expression,
//! feeds it through the parser's `conditional` production, and then calls
//! here — so one evaluator reads both integer- and float-typed constants.

use crate::node::{BinOp, Node, NodeArena, NodeId, NodeKind, UnaryOp};
use crate::ty::TypeTable;
use crate::var::{VarArena, VarId};
use cc_base::{ErrorKind, Result, SpannedError};

pub struct EvalCtx<'a> {
    pub nodes: &'a NodeArena,
    pub types: &'a TypeTable,
    pub vars: &'a VarArena,
}

/// The result of `eval_rval`/`eval_addr`: either a plain number or a
/// `{var, offset}` pair for a relocatable address (§3 "Relocation").
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Addr { var: VarId, offset: i64 },
}

fn fatal(node: &Node, msg: impl Into<String>) -> SpannedError {
    SpannedError::new(ErrorKind::Parse, msg.into(), node.span)
}

/// Evaluates a node that must reduce to a plain integer — `#if`/`#elif`
/// conditions, `case` labels, `_Alignas` operands, bitfield widths, enum
/// values.
pub fn eval_const(ctx: &EvalCtx, id: NodeId) -> Result<i64> {
    match eval_rval(ctx, id)? {
        ConstValue::Int(v) => Ok(v),
        ConstValue::Float(f) => Ok(f as i64),
        ConstValue::Addr { .. } => {
            Err(fatal(ctx.nodes.get(id), "address constant is not valid in an integer constant expression"))
        }
    }
}

pub fn eval_float(ctx: &EvalCtx, id: NodeId) -> Result<f64> {
    match eval_rval(ctx, id)? {
        ConstValue::Int(v) => Ok(v as f64),
        ConstValue::Float(f) => Ok(f),
        ConstValue::Addr { .. } => {
            Err(fatal(ctx.nodes.get(id), "address constant is not valid in a floating constant expression"))
        }
    }
}

/// Evaluates any constant expression, including address-of-static forms
/// used by global initializers.
pub fn eval_rval(ctx: &EvalCtx, id: NodeId) -> Result<ConstValue> {
    let node = ctx.nodes.get(id);
    match &node.kind {
        NodeKind::Num { ival, fval } => {
            if node_is_flonum(ctx, id) {
                Ok(ConstValue::Float(*fval))
            } else {
                Ok(ConstValue::Int(*ival))
            }
        }
        NodeKind::Cast(inner) => eval_cast(ctx, id, *inner),
        NodeKind::Unary { op: UnaryOp::Addr, operand } => eval_addr(ctx, *operand),
        NodeKind::Unary { op, operand } => eval_unary(ctx, node, *op, *operand),
        NodeKind::Binary { op, lhs, rhs } => eval_binary(ctx, node, *op, *lhs, *rhs),
        NodeKind::Cond { cond, then, els } => {
            if eval_const(ctx, *cond)? != 0 {
                eval_rval(ctx, *then)
            } else {
                eval_rval(ctx, *els)
            }
        }
        NodeKind::Comma { rhs, .. } => eval_rval(ctx, *rhs),
        _ => Err(fatal(node, "expression is not constant")),
    }
}

/// Address expressions of statics: `&var`, `&arr[i]`, `&s.member`, or
/// pointer arithmetic on a prior address (§4.5 "eval_addr/eval_rval").
pub fn eval_addr(ctx: &EvalCtx, id: NodeId) -> Result<ConstValue> {
    let node = ctx.nodes.get(id);
    match &node.kind {
        NodeKind::Var(var_id) => {
            if ctx.vars.get(*var_id).is_local {
                return Err(fatal(node, "address of a local variable is not a constant expression"));
            }
            Ok(ConstValue::Addr { var: *var_id, offset: 0 })
        }
        NodeKind::Unary { op: UnaryOp::Deref, operand } => eval_rval(ctx, *operand),
        NodeKind::Member { base, member_index } => {
            let base_addr = eval_addr(ctx, *base)?;
            let member_offset = member_offset_of(ctx, *base, *member_index)?;
            add_offset(node, base_addr, member_offset as i64)
        }
        NodeKind::Binary { op: BinOp::Add, lhs, rhs } => eval_addr_arith(ctx, node, *lhs, *rhs, 1),
        NodeKind::Binary { op: BinOp::Sub, lhs, rhs } => eval_addr_arith(ctx, node, *lhs, *rhs, -1),
        _ => Err(fatal(node, "not an address constant expression")),
    }
}

fn eval_addr_arith(ctx: &EvalCtx, node: &Node, lhs: NodeId, rhs: NodeId, sign: i64) -> Result<ConstValue> {
    let elem_size = pointee_size(ctx, lhs).unwrap_or(1) as i64;
    if let Ok(addr) = eval_addr(ctx, lhs) {
        let delta = eval_const(ctx, rhs)?;
        return add_offset(node, addr, sign * delta * elem_size);
    }
    let addr = eval_addr(ctx, rhs)?;
    let delta = eval_const(ctx, lhs)?;
    add_offset(node, addr, sign * delta * elem_size)
}

fn add_offset(node: &Node, addr: ConstValue, delta: i64) -> Result<ConstValue> {
    match addr {
        ConstValue::Addr { var, offset } => Ok(ConstValue::Addr { var, offset: offset + delta }),
        _ => Err(fatal(node, "expected an address constant")),
    }
}

fn pointee_size(ctx: &EvalCtx, id: NodeId) -> Option<usize> {
    let ty = ctx.nodes.get(id).ty?;
    ctx.types.base_of(ty).map(|b| ctx.types.size_of(b))
}

fn member_offset_of(ctx: &EvalCtx, base: NodeId, member_index: usize) -> Result<usize> {
    let base_ty = ctx.nodes.get(base).ty.ok_or_else(|| fatal(ctx.nodes.get(base), "member base has no type"))?;
    match &ctx.types.get(base_ty).kind {
        crate::ty::TypeKind::Struct { members, .. } => members
            .get(member_index)
            .map(|m| m.offset)
            .ok_or_else(|| fatal(ctx.nodes.get(base), "member index out of range")),
        _ => Err(fatal(ctx.nodes.get(base), "member access on non-struct type")),
    }
}

fn eval_cast(ctx: &EvalCtx, cast_id: NodeId, inner: NodeId) -> Result<ConstValue> {
    let ty = ctx.nodes.get(cast_id).ty;
    let value = eval_rval(ctx, inner)?;
    let Some(ty) = ty else { return Ok(value) };
    if ctx.types.is_pointer(ty) {
        return Ok(value);
    }
    match value {
        ConstValue::Addr { .. } => Ok(value),
        ConstValue::Int(v) => {
            if ctx.types.is_flonum(ty) {
                Ok(ConstValue::Float(v as f64))
            } else {
                Ok(ConstValue::Int(truncate_int(v, ctx.types.size_of(ty), ctx.types.is_unsigned(ty))))
            }
        }
        ConstValue::Float(f) => {
            if ctx.types.is_flonum(ty) {
                if ctx.types.size_of(ty) == 4 {
                    Ok(ConstValue::Float(f as f32 as f64))
                } else {
                    Ok(ConstValue::Float(f))
                }
            } else {
                // C truncates toward zero on float-to-int (§9 "cvtt* vs cvt*").
                Ok(ConstValue::Int(truncate_int(f as i64, ctx.types.size_of(ty), ctx.types.is_unsigned(ty))))
            }
        }
    }
}

/// Target-size truncation semantics used by both constant folding and
/// codegen's cast table (§8 "Constant folding commutativity").
pub fn truncate_int(v: i64, size: usize, is_unsigned: bool) -> i64 {
    match size {
        1 => {
            if is_unsigned {
                (v as u8) as i64
            } else {
                (v as i8) as i64
            }
        }
        2 => {
            if is_unsigned {
                (v as u16) as i64
            } else {
                (v as i16) as i64
            }
        }
        4 => {
            if is_unsigned {
                (v as u32) as i64
            } else {
                (v as i32) as i64
            }
        }
        _ => v,
    }
}

fn eval_unary(ctx: &EvalCtx, node: &Node, op: UnaryOp, operand: NodeId) -> Result<ConstValue> {
    match op {
        UnaryOp::Neg => match eval_rval(ctx, operand)? {
            ConstValue::Int(v) => Ok(ConstValue::Int(-v)),
            ConstValue::Float(f) => Ok(ConstValue::Float(-f)),
            ConstValue::Addr { .. } => Err(fatal(node, "cannot negate an address constant")),
        },
        UnaryOp::BitNot => Ok(ConstValue::Int(!eval_const(ctx, operand)?)),
        UnaryOp::LogNot => Ok(ConstValue::Int(if eval_const(ctx, operand)? == 0 { 1 } else { 0 })),
        UnaryOp::Deref => eval_rval(ctx, operand),
        UnaryOp::Addr => eval_addr(ctx, operand),
    }
}

fn eval_binary(ctx: &EvalCtx, node: &Node, op: BinOp, lhs: NodeId, rhs: NodeId) -> Result<ConstValue> {
    if matches!(op, BinOp::Add | BinOp::Sub) {
        if let Ok(l) = eval_rval(ctx, lhs) {
            if matches!(l, ConstValue::Addr { .. }) {
                let sign = if op == BinOp::Add { 1 } else { -1 };
                let elem_size = pointee_size(ctx, lhs).unwrap_or(1) as i64;
                let delta = eval_const(ctx, rhs)?;
                return add_offset(node, l, sign * delta * elem_size);
            }
        }
        if op == BinOp::Add {
            if let Ok(r) = eval_rval(ctx, rhs) {
                if matches!(r, ConstValue::Addr { .. }) {
                    let elem_size = pointee_size(ctx, rhs).unwrap_or(1) as i64;
                    let delta = eval_const(ctx, lhs)?;
                    return add_offset(node, r, delta * elem_size);
                }
            }
        }
    }
    let l = eval_rval(ctx, lhs)?;
    let r = eval_rval(ctx, rhs)?;
    eval_numeric_binary(node, op, l, r)
}

fn eval_numeric_binary(node: &Node, op: BinOp, l: ConstValue, r: ConstValue) -> Result<ConstValue> {
    let as_float = matches!(l, ConstValue::Float(_)) || matches!(r, ConstValue::Float(_));
    if as_float {
        let lf = match l {
            ConstValue::Int(v) => v as f64,
            ConstValue::Float(f) => f,
            ConstValue::Addr { .. } => return Err(fatal(node, "address used in floating arithmetic")),
        };
        let rf = match r {
            ConstValue::Int(v) => v as f64,
            ConstValue::Float(f) => f,
            ConstValue::Addr { .. } => return Err(fatal(node, "address used in floating arithmetic")),
        };
        let result = match op {
            BinOp::Add => lf + rf,
            BinOp::Sub => lf - rf,
            BinOp::Mul => lf * rf,
            BinOp::Div => lf / rf,
            BinOp::Eq => return Ok(ConstValue::Int((lf == rf) as i64)),
            BinOp::Ne => return Ok(ConstValue::Int((lf != rf) as i64)),
            BinOp::Lt => return Ok(ConstValue::Int((lf < rf) as i64)),
            BinOp::Le => return Ok(ConstValue::Int((lf <= rf) as i64)),
            _ => return Err(fatal(node, "operator not valid on floating constants")),
        };
        return Ok(ConstValue::Float(result));
    }
    let (ConstValue::Int(lv), ConstValue::Int(rv)) = (l, r) else {
        return Err(fatal(node, "expected integer constants"));
    };
    let v = match op {
        BinOp::Add => lv.wrapping_add(rv),
        BinOp::Sub => lv.wrapping_sub(rv),
        BinOp::Mul => lv.wrapping_mul(rv),
        BinOp::Div => {
            if rv == 0 {
                return Err(fatal(node, "division by zero in constant expression"));
            }
            lv.wrapping_div(rv)
        }
        BinOp::Mod => {
            if rv == 0 {
                return Err(fatal(node, "division by zero in constant expression"));
            }
            lv.wrapping_rem(rv)
        }
        BinOp::BitAnd => lv & rv,
        BinOp::BitOr => lv | rv,
        BinOp::BitXor => lv ^ rv,
        BinOp::Shl => lv.wrapping_shl(rv as u32),
        BinOp::Shr => lv.wrapping_shr(rv as u32),
        BinOp::Eq => (lv == rv) as i64,
        BinOp::Ne => (lv != rv) as i64,
        BinOp::Lt => (lv < rv) as i64,
        BinOp::Le => (lv <= rv) as i64,
        BinOp::LogAnd => ((lv != 0) && (rv != 0)) as i64,
        BinOp::LogOr => ((lv != 0) || (rv != 0)) as i64,
    };
    Ok(ConstValue::Int(v))
}

fn node_is_flonum(ctx: &EvalCtx, id: NodeId) -> bool {
    ctx.nodes.get(id).ty.map(|t| ctx.types.is_flonum(t)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::VarArena;
    use cc_base::{FileId, Span};

    fn sp() -> Span {
        Span::new(FileId(0), 0, 0)
    }

    #[test]
    fn folds_integer_arithmetic() {
        let mut nodes = NodeArena::new();
        let types = TypeTable::new();
        let vars = VarArena::new();
        let two = nodes.push(NodeKind::Num { ival: 2, fval: 0.0 }, sp());
        let three = nodes.push(NodeKind::Num { ival: 3, fval: 0.0 }, sp());
        let mul = nodes.push(NodeKind::Binary { op: BinOp::Mul, lhs: two, rhs: three }, sp());
        let one = nodes.push(NodeKind::Num { ival: 1, fval: 0.0 }, sp());
        let add = nodes.push(NodeKind::Binary { op: BinOp::Add, lhs: one, rhs: mul }, sp());
        let ctx = EvalCtx { nodes: &nodes, types: &types, vars: &vars };
        assert_eq!(eval_const(&ctx, add).unwrap(), 7);
    }

    #[test]
    fn conditional_picks_the_taken_branch() {
        let mut nodes = NodeArena::new();
        let types = TypeTable::new();
        let vars = VarArena::new();
        let cond = nodes.push(NodeKind::Num { ival: 0, fval: 0.0 }, sp());
        let then = nodes.push(NodeKind::Num { ival: 10, fval: 0.0 }, sp());
        let els = nodes.push(NodeKind::Num { ival: 20, fval: 0.0 }, sp());
        let c = nodes.push(NodeKind::Cond { cond, then, els }, sp());
        let ctx = EvalCtx { nodes: &nodes, types: &types, vars: &vars };
        assert_eq!(eval_const(&ctx, c).unwrap(), 20);
    }

    #[test]
    fn address_of_global_yields_var_and_zero_offset() {
        let mut nodes = NodeArena::new();
        let types = TypeTable::new();
        let mut vars = VarArena::new();
        let vid = vars.push(crate::var::Var::new_global("g".into(), types.int, 4, false));
        let v = nodes.push(NodeKind::Var(vid), sp());
        let addr = nodes.push(NodeKind::Unary { op: UnaryOp::Addr, operand: v }, sp());
        let ctx = EvalCtx { nodes: &nodes, types: &types, vars: &vars };
        assert_eq!(eval_rval(&ctx, addr).unwrap(), ConstValue::Addr { var: vid, offset: 0 });
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let mut nodes = NodeArena::new();
        let types = TypeTable::new();
        let vars = VarArena::new();
        let one = nodes.push(NodeKind::Num { ival: 1, fval: 0.0 }, sp());
        let zero = nodes.push(NodeKind::Num { ival: 0, fval: 0.0 }, sp());
        let div = nodes.push(NodeKind::Binary { op: BinOp::Div, lhs: one, rhs: zero }, sp());
        let ctx = EvalCtx { nodes: &nodes, types: &types, vars: &vars };
        assert!(eval_const(&ctx, div).is_err());
    }

    #[test]
    fn truncate_int_wraps_to_target_width() {
        assert_eq!(truncate_int(300, 1, false), 44);
        assert_eq!(truncate_int(-1, 4, true), (u32::MAX) as i64);
    }
}
