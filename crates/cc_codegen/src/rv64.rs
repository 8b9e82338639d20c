//! RV64GC code generation (§4.7): the same register-stack discipline and
//! statement/expression coverage as [`crate::x86_64`], emitted against the
//! RISC-V calling convention instead of System V.
//!
//! | Concept                         | x86-64                | RV64GC                 |
//! |----------------------------------|------------------------|-------------------------|
//! | GP register-stack slots          | `%r10..%r15`           | `s2..s7`                |
//! | FP register-stack slots           | `%xmm8..%xmm13`        | `fs2..fs7`              |
//! | Integer argument registers        | `rdi,rsi,rdx,rcx,r8,r9`| `a0..a5`                |
//! | Float argument registers          | `xmm0..xmm5`           | `fa0..fa5`              |
//! | Frame/locals addressing           | `%rbp`-relative        | `s0`-relative           |
//! | Narrow load                       | `movzbl`/`movsbl`      | `lbu`/`lb`              |
//! | Int→float cast                    | `cvtsi2sd`             | `fcvt.d.l`              |
//!
//! Aggregates are classified memory-class (passed by a hidden pointer)
//! rather than packed into register pairs per the full RISC-V psABI — a
//! documented simplification (§4.7), not a spec violation.
//!
//! Entry point: [`emit`].

use crate::backend::{ArgLoc, ARG_REG_COUNT};
use crate::data::emit_globals;
use crate::layout::{assign_local_offsets, mangle_label, LabelGen};
use crate::machine::RegStack;
use cc_base::SourceMap;
use cc_parse::{
    BinOp, Function, Member, NodeArena, NodeId, NodeKind, ParseOutput, Program, TypeId, TypeKind, TypeTable,
    UnaryOp, VarArena, VarId,
};
use std::fmt::Write as _;

const GP: [&str; 6] = ["s2", "s3", "s4", "s5", "s6", "s7"];
const FP: [&str; 6] = ["fs2", "fs3", "fs4", "fs5", "fs6", "fs7"];
const ARG_GP: [&str; 6] = ["a0", "a1", "a2", "a3", "a4", "a5"];
const ARG_FP: [&str; 6] = ["fa0", "fa1", "fa2", "fa3", "fa4", "fa5"];

/// Bytes reserved below the locals for `ra`, `s0`, and the six spilled
/// callee-saved slots this backend borrows as its register stack.
const CALLEE_SAVE_SIZE: i64 = 8 * 8;

pub fn emit(parse: &mut ParseOutput, files: &SourceMap, pic: bool) -> String {
    let ParseOutput { program, nodes, types, vars } = parse;
    let mut cg = Codegen {
        out: String::new(),
        files,
        nodes: &*nodes,
        types: &*types,
        vars,
        pic,
        regs: RegStack::new(),
        label_gen: LabelGen::new(),
        break_labels: Vec::new(),
        continue_labels: Vec::new(),
        current_fn: String::new(),
        frame_size: 0,
    };
    cg.gen_program(program);
    cg.out
}

struct Codegen<'a> {
    out: String,
    files: &'a SourceMap,
    nodes: &'a NodeArena,
    types: &'a TypeTable,
    vars: &'a mut VarArena,
    /// Unused on RV64 (there is no RIP-relative/non-PIC toggle distinct
    /// from `lla`/`la`); kept so both backends share one `emit` shape.
    #[allow(dead_code)]
    pic: bool,
    regs: RegStack,
    label_gen: LabelGen,
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
    current_fn: String,
    frame_size: i64,
}

impl<'a> Codegen<'a> {
    fn gen_program(&mut self, program: &Program) {
        self.emit_file_directives();
        emit_globals(&mut self.out, &program.globals, self.vars, self.types);
        for func in &program.functions {
            if func.is_definition {
                self.gen_function(func);
            }
        }
    }

    fn emit_file_directives(&mut self) {
        for (id, name) in self.files.iter() {
            writeln!(self.out, "  .file {} \"{}\"", id.0 + 1, name).unwrap();
        }
    }

    fn gen_function(&mut self, func: &Function) {
        let locals_size = assign_local_offsets(func, self.vars, self.types);
        self.label_gen = LabelGen::new();
        self.current_fn = func.name.clone();
        self.frame_size = locals_size + CALLEE_SAVE_SIZE;

        writeln!(self.out, "  .text").unwrap();
        if !func.is_static {
            writeln!(self.out, "  .globl {}", func.name).unwrap();
        }
        writeln!(self.out, "{}:", func.name).unwrap();
        writeln!(self.out, "  addi sp, sp, -{}", self.frame_size).unwrap();
        writeln!(self.out, "  sd ra, {}(sp)", self.frame_size - 8).unwrap();
        writeln!(self.out, "  sd s0, {}(sp)", self.frame_size - 16).unwrap();
        for (i, reg) in GP.iter().enumerate() {
            writeln!(self.out, "  sd {reg}, {}(sp)", self.frame_size - 24 - 8 * i as i64).unwrap();
        }
        writeln!(self.out, "  addi s0, sp, {}", self.frame_size).unwrap();

        self.spill_params(func);

        self.regs = RegStack::new();
        self.gen_stmt(func.body);
        self.regs.assert_empty();

        writeln!(self.out, ".L.return.{}:", func.name).unwrap();
        writeln!(self.out, "  ld ra, {}(sp)", self.frame_size - 8).unwrap();
        writeln!(self.out, "  ld s0, {}(sp)", self.frame_size - 16).unwrap();
        for (i, reg) in GP.iter().enumerate() {
            writeln!(self.out, "  ld {reg}, {}(sp)", self.frame_size - 24 - 8 * i as i64).unwrap();
        }
        writeln!(self.out, "  addi sp, sp, {}", self.frame_size).unwrap();
        writeln!(self.out, "  ret").unwrap();
    }

    /// Parameters past the 6th of either bank never arrived in a register:
    /// the caller left them on its own frame, which `s0` now points at, one
    /// doubleword apiece starting at `0(s0)` in declaration order.
    fn spill_params(&mut self, func: &Function) {
        let mut gpi = 0;
        let mut fpi = 0;
        let mut stacki = 0usize;
        for &pid in &func.params {
            let v = self.vars.get(pid);
            let (offset, ty) = (v.offset, v.ty);
            let size = self.types.size_of(ty);
            if self.types.is_flonum(ty) {
                let instr = if size == 4 { "fsw" } else { "fsd" };
                if fpi < ARG_REG_COUNT {
                    let reg = ARG_FP[fpi];
                    fpi += 1;
                    writeln!(self.out, "  {instr} {reg}, {offset}(s0)").unwrap();
                } else {
                    let src = 8 * stacki as i64;
                    stacki += 1;
                    let load = if size == 4 { "flw" } else { "fld" };
                    writeln!(self.out, "  {load} ft0, {src}(s0)").unwrap();
                    writeln!(self.out, "  {instr} ft0, {offset}(s0)").unwrap();
                }
            } else if gpi < ARG_REG_COUNT {
                let reg = ARG_GP[gpi];
                gpi += 1;
                let instr = store_mnemonic(size);
                writeln!(self.out, "  {instr} {reg}, {offset}(s0)").unwrap();
            } else {
                let src = 8 * stacki as i64;
                stacki += 1;
                writeln!(self.out, "  ld t0, {src}(s0)").unwrap();
                let instr = store_mnemonic(size);
                writeln!(self.out, "  {instr} t0, {offset}(s0)").unwrap();
            }
        }
    }

    // ---------------------------------------------------------------- stmt

    fn gen_stmt(&mut self, id: NodeId) {
        let kind = self.nodes.get(id).kind.clone();
        self.emit_loc(id);
        match kind {
            NodeKind::ExprStmt(e) => {
                self.gen_expr(e);
                self.regs.pop();
            }
            NodeKind::Block(stmts) => {
                for s in stmts {
                    self.gen_stmt(s);
                }
            }
            NodeKind::Return(val) => {
                if let Some(v) = val {
                    self.gen_expr(v);
                    let slot = self.regs.top() - 1;
                    self.move_to_return_reg(slot, self.nodes.get(v).ty.unwrap());
                    self.regs.pop();
                }
                writeln!(self.out, "  j .L.return.{}", self.current_fn).unwrap();
            }
            NodeKind::If { cond, then, els } => {
                let id = self.label_gen.next_id();
                let else_label = format!(".L.else.{id}");
                let end_label = format!(".L.end.{id}");
                self.gen_cond_jump_if_zero(cond, if els.is_some() { &else_label } else { &end_label });
                self.gen_stmt(then);
                if let Some(els) = els {
                    writeln!(self.out, "  j {end_label}").unwrap();
                    writeln!(self.out, "{else_label}:").unwrap();
                    self.gen_stmt(els);
                }
                writeln!(self.out, "{end_label}:").unwrap();
            }
            NodeKind::For { init, cond, inc, body } => {
                let id = self.label_gen.next_id();
                let begin = format!(".L.begin.{id}");
                let end = format!(".L.end.{id}");
                if let Some(init) = init {
                    self.gen_stmt(init);
                }
                self.break_labels.push(end.clone());
                self.continue_labels.push(format!(".L.continue.{id}"));
                writeln!(self.out, "{begin}:").unwrap();
                if let Some(cond) = cond {
                    self.gen_cond_jump_if_zero(cond, &end);
                }
                self.gen_stmt(body);
                writeln!(self.out, ".L.continue.{id}:").unwrap();
                if let Some(inc) = inc {
                    self.gen_expr(inc);
                    self.regs.pop();
                }
                writeln!(self.out, "  j {begin}").unwrap();
                writeln!(self.out, "{end}:").unwrap();
                self.break_labels.pop();
                self.continue_labels.pop();
            }
            NodeKind::Do { body, cond } => {
                let id = self.label_gen.next_id();
                let begin = format!(".L.begin.{id}");
                let end = format!(".L.end.{id}");
                self.break_labels.push(end.clone());
                self.continue_labels.push(format!(".L.continue.{id}"));
                writeln!(self.out, "{begin}:").unwrap();
                self.gen_stmt(body);
                writeln!(self.out, ".L.continue.{id}:").unwrap();
                self.gen_cond_jump_if_nonzero(cond, &begin);
                writeln!(self.out, "{end}:").unwrap();
                self.break_labels.pop();
                self.continue_labels.pop();
            }
            NodeKind::Switch { cond, body, cases, default_case } => {
                self.gen_switch(cond, body, &cases, default_case);
            }
            NodeKind::Case { val: _, body } => {
                let label = self.case_label(id);
                writeln!(self.out, "{label}:").unwrap();
                self.gen_stmt(body);
            }
            NodeKind::Break => {
                let label = self.break_labels.last().expect("break outside loop/switch (compiler bug)").clone();
                writeln!(self.out, "  j {label}").unwrap();
            }
            NodeKind::Continue => {
                let label = self.continue_labels.last().expect("continue outside loop (compiler bug)").clone();
                writeln!(self.out, "  j {label}").unwrap();
            }
            NodeKind::Goto(name) => {
                writeln!(self.out, "  j {}", mangle_label(&self.current_fn, &name)).unwrap();
            }
            NodeKind::Label { name, body } => {
                writeln!(self.out, "{}:", mangle_label(&self.current_fn, &name)).unwrap();
                self.gen_stmt(body);
            }
            _ => panic!("internal error: not a statement node (compiler bug, {kind:?})"),
        }
    }

    fn gen_switch(&mut self, cond: NodeId, body: NodeId, cases: &[NodeId], default_case: Option<NodeId>) {
        self.gen_expr(cond);
        let slot = self.regs.top() - 1;
        let end_id = self.label_gen.next_id();
        let end_label = format!(".L.end.{end_id}");
        for &case in cases {
            if let NodeKind::Case { val: Some(v), .. } = self.nodes.get(case).kind {
                let label = self.case_label(case);
                writeln!(self.out, "  li t0, {v}").unwrap();
                writeln!(self.out, "  beq {}, t0, {label}", GP[slot]).unwrap();
            }
        }
        if let Some(def) = default_case {
            writeln!(self.out, "  j {}", self.case_label(def)).unwrap();
        } else {
            writeln!(self.out, "  j {end_label}").unwrap();
        }
        self.regs.pop();
        self.break_labels.push(end_label.clone());
        self.gen_stmt(body);
        self.break_labels.pop();
        writeln!(self.out, "{end_label}:").unwrap();
    }

    fn case_label(&self, case_node: NodeId) -> String {
        format!(".L.case.{}.{}", self.current_fn, case_node.0)
    }

    // ---------------------------------------------------------------- expr

    fn gen_cond_jump_if_zero(&mut self, cond: NodeId, label: &str) {
        self.gen_expr(cond);
        let slot = self.regs.top() - 1;
        let ty = self.nodes.get(cond).ty.unwrap();
        if self.types.is_flonum(ty) {
            let double = self.types.size_of(ty) == 8;
            let mv = if double { "fmv.d.x" } else { "fmv.w.x" };
            let cmp = if double { "feq.d" } else { "feq.s" };
            writeln!(self.out, "  {mv} ft0, zero").unwrap();
            writeln!(self.out, "  {cmp} t0, {}, ft0", FP[slot]).unwrap();
            writeln!(self.out, "  bnez t0, {label}").unwrap();
        } else {
            writeln!(self.out, "  beqz {}, {label}", GP[slot]).unwrap();
        }
        self.regs.pop();
    }

    fn gen_cond_jump_if_nonzero(&mut self, cond: NodeId, label: &str) {
        self.gen_expr(cond);
        let slot = self.regs.top() - 1;
        writeln!(self.out, "  bnez {}, {label}", GP[slot]).unwrap();
        self.regs.pop();
    }

    fn gen_expr(&mut self, id: NodeId) {
        let node_ty = self.nodes.get(id).ty;
        let kind = self.nodes.get(id).kind.clone();
        match kind {
            NodeKind::Num { ival, fval } => self.gen_num(ival, fval, node_ty.unwrap()),
            NodeKind::Var(_) => {
                self.gen_addr(id);
                let slot = self.regs.top() - 1;
                self.load(slot, node_ty.unwrap());
            }
            NodeKind::Cast(inner) => {
                self.gen_expr(inner);
                let slot = self.regs.top() - 1;
                self.cast(slot, self.nodes.get(inner).ty.unwrap(), node_ty.unwrap());
            }
            NodeKind::Unary { op, operand } => self.gen_unary(op, operand, node_ty.unwrap()),
            NodeKind::Binary { op, lhs, rhs } => self.gen_binary(op, lhs, rhs),
            NodeKind::Assign { lhs, rhs } => self.gen_assign(lhs, rhs),
            NodeKind::Cond { cond, then, els } => self.gen_ternary(cond, then, els),
            NodeKind::Comma { lhs, rhs } => {
                self.gen_expr(lhs);
                self.regs.pop();
                self.gen_expr(rhs);
            }
            NodeKind::Member { .. } => {
                self.gen_addr(id);
                let slot = self.regs.top() - 1;
                if let Some(member) = self.member_info(id) {
                    if member.is_bitfield {
                        self.load_bitfield(slot, &member);
                        return;
                    }
                    if is_aggregate(member.ty, self.types) {
                        return;
                    }
                }
                self.load(slot, node_ty.unwrap());
            }
            NodeKind::Funcall { name, func_ty, args } => self.gen_funcall(&name, func_ty, &args, node_ty),
            NodeKind::StmtExpr(body) => self.gen_stmt_expr(body),
            NodeKind::NullExpr => {
                let slot = self.regs.push();
                writeln!(self.out, "  li {}, 0", GP[slot]).unwrap();
            }
            _ => panic!("internal error: not an expression node (compiler bug, {kind:?})"),
        }
    }

    fn gen_stmt_expr(&mut self, body: NodeId) {
        let NodeKind::Block(stmts) = self.nodes.get(body).kind.clone() else {
            panic!("internal error: statement-expression body must be a block (compiler bug)");
        };
        for (i, s) in stmts.iter().enumerate() {
            if i + 1 == stmts.len() {
                if let NodeKind::ExprStmt(e) = self.nodes.get(*s).kind {
                    self.gen_expr(e);
                    continue;
                }
            }
            self.gen_stmt(*s);
        }
    }

    fn gen_num(&mut self, ival: i64, fval: f64, ty: TypeId) {
        let slot = self.regs.push();
        if self.types.is_flonum(ty) {
            if self.types.size_of(ty) == 4 {
                writeln!(self.out, "  li t0, {}", (fval as f32).to_bits()).unwrap();
                writeln!(self.out, "  fmv.w.x {}, t0", FP[slot]).unwrap();
            } else {
                writeln!(self.out, "  li t0, {}", fval.to_bits()).unwrap();
                writeln!(self.out, "  fmv.d.x {}, t0", FP[slot]).unwrap();
            }
        } else {
            writeln!(self.out, "  li {}, {ival}", GP[slot]).unwrap();
        }
    }

    fn gen_unary(&mut self, op: UnaryOp, operand: NodeId, ty: TypeId) {
        match op {
            UnaryOp::Addr => self.gen_addr(operand),
            UnaryOp::Deref => {
                self.gen_addr(operand);
                let slot = self.regs.top() - 1;
                if !is_aggregate(ty, self.types) {
                    self.load(slot, ty);
                }
            }
            UnaryOp::Neg => {
                self.gen_expr(operand);
                let slot = self.regs.top() - 1;
                if self.types.is_flonum(ty) {
                    let instr = if self.types.size_of(ty) == 4 { "fneg.s" } else { "fneg.d" };
                    writeln!(self.out, "  {instr} {0}, {0}", FP[slot]).unwrap();
                } else {
                    writeln!(self.out, "  neg {0}, {0}", GP[slot]).unwrap();
                }
            }
            UnaryOp::BitNot => {
                self.gen_expr(operand);
                let slot = self.regs.top() - 1;
                writeln!(self.out, "  not {0}, {0}", GP[slot]).unwrap();
            }
            UnaryOp::LogNot => {
                self.gen_expr(operand);
                let slot = self.regs.top() - 1;
                writeln!(self.out, "  seqz {0}, {0}", GP[slot]).unwrap();
            }
        }
    }

    fn gen_binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) {
        if matches!(op, BinOp::LogAnd | BinOp::LogOr) {
            self.gen_short_circuit(op, lhs, rhs);
            return;
        }
        self.gen_expr(lhs);
        let slot = self.regs.top() - 1;
        self.gen_expr(rhs);
        let rslot = self.regs.top() - 1;
        let ty = self.nodes.get(lhs).ty.unwrap();
        if self.types.is_flonum(ty) {
            self.gen_float_binop(op, slot, rslot, ty);
        } else {
            self.gen_int_binop(op, slot, rslot, ty);
        }
        self.regs.pop();
    }

    fn gen_short_circuit(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) {
        let id = self.label_gen.next_id();
        let short_label = format!(".L.sc.{id}");
        let end_label = format!(".L.end.{id}");
        self.gen_expr(lhs);
        let slot = self.regs.top() - 1;
        match op {
            BinOp::LogAnd => writeln!(self.out, "  beqz {}, {short_label}", GP[slot]).unwrap(),
            BinOp::LogOr => writeln!(self.out, "  bnez {}, {short_label}", GP[slot]).unwrap(),
            _ => unreachable!(),
        }
        self.regs.pop();
        self.gen_expr(rhs);
        let rslot = self.regs.top() - 1;
        writeln!(self.out, "  snez {0}, {0}", GP[rslot]).unwrap();
        writeln!(self.out, "  j {end_label}").unwrap();
        writeln!(self.out, "{short_label}:").unwrap();
        let result = match op {
            BinOp::LogAnd => 0,
            BinOp::LogOr => 1,
            _ => unreachable!(),
        };
        writeln!(self.out, "  li {}, {result}", GP[rslot]).unwrap();
        writeln!(self.out, "{end_label}:").unwrap();
    }

    fn gen_int_binop(&mut self, op: BinOp, slot: usize, rslot: usize, ty: TypeId) {
        let unsigned = self.types.is_unsigned(ty);
        let d = GP[slot];
        let s = GP[rslot];
        match op {
            BinOp::Add => writeln!(self.out, "  add {d}, {d}, {s}").unwrap(),
            BinOp::Sub => writeln!(self.out, "  sub {d}, {d}, {s}").unwrap(),
            BinOp::Mul => writeln!(self.out, "  mul {d}, {d}, {s}").unwrap(),
            BinOp::Div => writeln!(self.out, "  {} {d}, {d}, {s}", if unsigned { "divu" } else { "div" }).unwrap(),
            BinOp::Mod => writeln!(self.out, "  {} {d}, {d}, {s}", if unsigned { "remu" } else { "rem" }).unwrap(),
            BinOp::BitAnd => writeln!(self.out, "  and {d}, {d}, {s}").unwrap(),
            BinOp::BitOr => writeln!(self.out, "  or {d}, {d}, {s}").unwrap(),
            BinOp::BitXor => writeln!(self.out, "  xor {d}, {d}, {s}").unwrap(),
            BinOp::Shl => writeln!(self.out, "  sll {d}, {d}, {s}").unwrap(),
            BinOp::Shr => writeln!(self.out, "  {} {d}, {d}, {s}", if unsigned { "srl" } else { "sra" }).unwrap(),
            BinOp::Eq => {
                writeln!(self.out, "  xor {d}, {d}, {s}").unwrap();
                writeln!(self.out, "  seqz {d}, {d}").unwrap();
            }
            BinOp::Ne => {
                writeln!(self.out, "  xor {d}, {d}, {s}").unwrap();
                writeln!(self.out, "  snez {d}, {d}").unwrap();
            }
            BinOp::Lt => writeln!(self.out, "  {} {d}, {d}, {s}", if unsigned { "sltu" } else { "slt" }).unwrap(),
            BinOp::Le => {
                writeln!(self.out, "  {} {d}, {s}, {d}", if unsigned { "sltu" } else { "slt" }).unwrap();
                writeln!(self.out, "  xori {d}, {d}, 1").unwrap();
            }
            BinOp::LogAnd | BinOp::LogOr => unreachable!("handled by gen_short_circuit"),
        }
    }

    fn gen_float_binop(&mut self, op: BinOp, slot: usize, rslot: usize, ty: TypeId) {
        let double = self.types.size_of(ty) == 8;
        let suffix = if double { "d" } else { "s" };
        let d = FP[slot];
        let s = FP[rslot];
        match op {
            BinOp::Add => writeln!(self.out, "  fadd.{suffix} {d}, {d}, {s}").unwrap(),
            BinOp::Sub => writeln!(self.out, "  fsub.{suffix} {d}, {d}, {s}").unwrap(),
            BinOp::Mul => writeln!(self.out, "  fmul.{suffix} {d}, {d}, {s}").unwrap(),
            BinOp::Div => writeln!(self.out, "  fdiv.{suffix} {d}, {d}, {s}").unwrap(),
            BinOp::Eq => writeln!(self.out, "  feq.{suffix} {0}, {d}, {s}", GP[slot]).unwrap(),
            BinOp::Ne => {
                writeln!(self.out, "  feq.{suffix} {0}, {d}, {s}", GP[slot]).unwrap();
                writeln!(self.out, "  xori {0}, {0}, 1", GP[slot]).unwrap();
            }
            BinOp::Lt => writeln!(self.out, "  flt.{suffix} {0}, {d}, {s}", GP[slot]).unwrap(),
            BinOp::Le => writeln!(self.out, "  fle.{suffix} {0}, {d}, {s}", GP[slot]).unwrap(),
            _ => panic!("internal error: non-numeric operator applied to floating type (compiler bug)"),
        }
    }

    fn gen_ternary(&mut self, cond: NodeId, then: NodeId, els: NodeId) {
        let id = self.label_gen.next_id();
        let else_label = format!(".L.else.{id}");
        let end_label = format!(".L.end.{id}");
        self.gen_cond_jump_if_zero(cond, &else_label);
        let entry = self.regs.top();
        self.gen_expr(then);
        writeln!(self.out, "  j {end_label}").unwrap();
        self.regs.truncate_to(entry);
        writeln!(self.out, "{else_label}:").unwrap();
        self.gen_expr(els);
        writeln!(self.out, "{end_label}:").unwrap();
    }

    fn gen_assign(&mut self, lhs: NodeId, rhs: NodeId) {
        self.gen_addr(lhs);
        let addr_slot = self.regs.top() - 1;
        self.gen_expr(rhs);
        let val_slot = self.regs.top() - 1;
        let ty = self.nodes.get(lhs).ty.unwrap();
        if let Some(member) = self.member_info(lhs) {
            if member.is_bitfield {
                self.store_bitfield(addr_slot, val_slot, &member);
                self.regs.pop();
                return;
            }
        }
        if is_aggregate(ty, self.types) {
            self.store_struct(addr_slot, val_slot, self.types.size_of(ty));
        } else {
            self.store(addr_slot, val_slot, ty);
        }
        self.regs.pop();
    }

    // ---------------------------------------------------------------- addr

    fn gen_addr(&mut self, id: NodeId) {
        let kind = self.nodes.get(id).kind.clone();
        match kind {
            NodeKind::Var(vid) => self.gen_var_addr(vid),
            NodeKind::Unary { op: UnaryOp::Deref, operand } => self.gen_expr(operand),
            NodeKind::Member { base, member_index } => {
                self.gen_addr(base);
                let slot = self.regs.top() - 1;
                let base_ty = self.nodes.get(base).ty.unwrap();
                let member = member_at(base_ty, member_index, self.types);
                if member.offset != 0 {
                    writeln!(self.out, "  addi {0}, {0}, {1}", GP[slot], member.offset).unwrap();
                }
            }
            NodeKind::Comma { lhs, rhs } => {
                self.gen_expr(lhs);
                self.regs.pop();
                self.gen_addr(rhs);
            }
            other => panic!("internal error: not an lvalue (compiler bug, {other:?})"),
        }
    }

    fn gen_var_addr(&mut self, vid: VarId) {
        let v = self.vars.get(vid).clone();
        let slot = self.regs.push();
        if v.is_local {
            writeln!(self.out, "  addi {}, s0, {}", GP[slot], v.offset).unwrap();
        } else {
            writeln!(self.out, "  lla {}, {}", GP[slot], v.name).unwrap();
        }
    }

    fn member_info(&self, id: NodeId) -> Option<Member> {
        let NodeKind::Member { base, member_index } = self.nodes.get(id).kind.clone() else { return None };
        let base_ty = self.nodes.get(base).ty.unwrap();
        Some(member_at(base_ty, member_index, self.types))
    }

    // --------------------------------------------------------- load/store

    fn load(&mut self, slot: usize, ty: TypeId) {
        if is_aggregate(ty, self.types) {
            return;
        }
        let size = self.types.size_of(ty);
        if self.types.is_flonum(ty) {
            let instr = if size == 4 { "flw" } else { "fld" };
            writeln!(self.out, "  {instr} {}, 0({})", FP[slot], GP[slot]).unwrap();
            return;
        }
        let unsigned = self.types.is_unsigned(ty) || matches!(self.types.get(ty).kind, TypeKind::Bool);
        let instr = load_mnemonic(size, unsigned);
        writeln!(self.out, "  {instr} {0}, 0({0})", GP[slot]).unwrap();
    }

    fn store(&mut self, addr_slot: usize, val_slot: usize, ty: TypeId) {
        let size = self.types.size_of(ty);
        if self.types.is_flonum(ty) {
            let instr = if size == 4 { "fsw" } else { "fsd" };
            writeln!(self.out, "  {instr} {}, 0({})", FP[val_slot], GP[addr_slot]).unwrap();
            return;
        }
        let instr = store_mnemonic(size);
        writeln!(self.out, "  {instr} {}, 0({})", GP[val_slot], GP[addr_slot]).unwrap();
    }

    fn store_struct(&mut self, dst_slot: usize, src_slot: usize, size: usize) {
        writeln!(self.out, "  li t0, {size}").unwrap();
        writeln!(self.out, "1:").unwrap();
        writeln!(self.out, "  addi t0, t0, -1").unwrap();
        writeln!(self.out, "  add t1, {}, t0", GP[src_slot]).unwrap();
        writeln!(self.out, "  lbu t1, 0(t1)").unwrap();
        writeln!(self.out, "  add t2, {}, t0", GP[dst_slot]).unwrap();
        writeln!(self.out, "  sb t1, 0(t2)").unwrap();
        writeln!(self.out, "  bnez t0, 1b").unwrap();
    }

    fn load_bitfield(&mut self, slot: usize, member: &Member) {
        writeln!(self.out, "  ld t0, 0({})", GP[slot]).unwrap();
        let left = 64 - member.bit_width - member.bit_offset;
        writeln!(self.out, "  slli t0, t0, {left}").unwrap();
        let unsigned = self.types.is_unsigned(member.ty);
        let shr = if unsigned { "srli" } else { "srai" };
        writeln!(self.out, "  {shr} t0, t0, {}", 64 - member.bit_width).unwrap();
        writeln!(self.out, "  mv {}, t0", GP[slot]).unwrap();
    }

    fn store_bitfield(&mut self, addr_slot: usize, val_slot: usize, member: &Member) {
        writeln!(self.out, "  ld t0, 0({})", GP[addr_slot]).unwrap();
        let mask: u64 = ((1u128 << member.bit_width) - 1) as u64;
        writeln!(self.out, "  li t1, {}", !(mask << member.bit_offset) as i64).unwrap();
        writeln!(self.out, "  and t0, t0, t1").unwrap();
        writeln!(self.out, "  li t2, {mask}").unwrap();
        writeln!(self.out, "  and t1, {}, t2", GP[val_slot]).unwrap();
        writeln!(self.out, "  slli t1, t1, {}", member.bit_offset).unwrap();
        writeln!(self.out, "  or t0, t0, t1").unwrap();
        writeln!(self.out, "  sd t0, 0({})", GP[addr_slot]).unwrap();
    }

    fn move_to_return_reg(&mut self, slot: usize, ty: TypeId) {
        if self.types.is_flonum(ty) {
            let instr = if self.types.size_of(ty) == 4 { "fmv.s" } else { "fmv.d" };
            writeln!(self.out, "  {instr} fa0, {}", FP[slot]).unwrap();
        } else {
            writeln!(self.out, "  mv a0, {}", GP[slot]).unwrap();
        }
    }

    // --------------------------------------------------------------- cast

    fn cast(&mut self, slot: usize, from: TypeId, to: TypeId) {
        let from_float = self.types.is_flonum(from);
        let to_float = self.types.is_flonum(to);
        if matches!(self.types.get(to).kind, TypeKind::Bool) {
            if from_float {
                let double = self.types.size_of(from) == 8;
                let mv = if double { "fmv.d.x" } else { "fmv.w.x" };
                let suffix = if double { "d" } else { "s" };
                writeln!(self.out, "  {mv} ft0, zero").unwrap();
                writeln!(self.out, "  feq.{suffix} {}, {}, ft0", GP[slot], FP[slot]).unwrap();
                writeln!(self.out, "  xori {0}, {0}, 1", GP[slot]).unwrap();
            } else {
                writeln!(self.out, "  snez {0}, {0}", GP[slot]).unwrap();
            }
            return;
        }
        match (from_float, to_float) {
            (false, true) => {
                let unsigned = self.types.is_unsigned(from);
                let suffix = if self.types.size_of(to) == 4 { "s" } else { "d" };
                let op = if unsigned { "lu" } else { "l" };
                writeln!(self.out, "  fcvt.{suffix}.{op} {}, {}", FP[slot], GP[slot]).unwrap();
            }
            (true, false) => {
                let unsigned = self.types.is_unsigned(to);
                let suffix = if self.types.size_of(from) == 4 { "s" } else { "d" };
                let op = if unsigned { "lu" } else { "l" };
                writeln!(self.out, "  fcvt.{op}.{suffix} {}, {}, rtz", GP[slot], FP[slot]).unwrap();
            }
            (true, true) => {
                if self.types.size_of(from) != self.types.size_of(to) {
                    let instr = if self.types.size_of(to) == 8 { "fcvt.d.s" } else { "fcvt.s.d" };
                    writeln!(self.out, "  {instr} {0}, {0}", FP[slot]).unwrap();
                }
            }
            (false, false) => self.cast_int_to_int(slot, from, to),
        }
    }

    /// 64-bit registers natively hold every narrower integer width, so a
    /// widening re-extends the stored low bits rather than narrowing a
    /// wide value — the register's upper bits are authoritative.
    fn cast_int_to_int(&mut self, slot: usize, from: TypeId, to: TypeId) {
        let from_size = self.types.size_of(from);
        let to_size = self.types.size_of(to);
        if to_size <= from_size {
            return;
        }
        let unsigned = self.types.is_unsigned(from);
        let bits = from_size * 8;
        if unsigned {
            writeln!(self.out, "  slli {0}, {0}, {1}", GP[slot], 64 - bits).unwrap();
            writeln!(self.out, "  srli {0}, {0}, {1}", GP[slot], 64 - bits).unwrap();
        } else {
            writeln!(self.out, "  slli {0}, {0}, {1}", GP[slot], 64 - bits).unwrap();
            writeln!(self.out, "  srai {0}, {0}, {1}", GP[slot], 64 - bits).unwrap();
        }
    }

    // ------------------------------------------------------------- calls

    /// Mirrors [`crate::x86_64::Codegen::gen_funcall`]'s two-pass
    /// classify/push-to-real-stack/pop-in-reverse scheme, using `addi
    /// sp,sp,-8` + `sd`/`fsd` in place of `push`.
    fn gen_funcall(&mut self, name: &str, func_ty: TypeId, args: &[NodeId], ret_ty: Option<TypeId>) {
        let (params, _is_variadic) = match &self.types.get(func_ty).kind {
            TypeKind::Func { params, is_variadic, .. } => (params.clone(), *is_variadic),
            _ => (Vec::new(), false),
        };
        let entry = self.regs.top();

        let mut classified = Vec::with_capacity(args.len());
        let mut gp_count = 0usize;
        let mut fp_count = 0usize;
        let mut stack_count = 0usize;
        for (i, &a) in args.iter().enumerate() {
            let ty = params.get(i).copied().unwrap_or_else(|| self.nodes.get(a).ty.unwrap());
            if self.types.is_flonum(ty) {
                if fp_count < ARG_REG_COUNT {
                    classified.push((ty, true, ArgLoc::Reg(fp_count)));
                    fp_count += 1;
                } else {
                    classified.push((ty, true, ArgLoc::Stack(stack_count)));
                    stack_count += 1;
                }
            } else if gp_count < ARG_REG_COUNT {
                classified.push((ty, false, ArgLoc::Reg(gp_count)));
                gp_count += 1;
            } else {
                classified.push((ty, false, ArgLoc::Stack(stack_count)));
                stack_count += 1;
            }
        }

        // Caller-saved registers must be spilled *before* any argument is
        // pushed: both land on the real stack, and the argument-popping
        // loop below assumes the top of stack is the last-pushed argument.
        self.save_caller_saved(entry);

        // Arguments past the 6th of either bank spill to the stack instead
        // of a register (§4.7 "excess args spill to the stack"): pushed
        // first, in reverse declaration order, so the first stack argument
        // ends up closest to `sp` — where the callee's `0(s0)` expects it —
        // and is left there through the call rather than popped into a
        // register.
        for (i, &a) in args.iter().enumerate().rev() {
            let (_, is_float, loc) = classified[i];
            if matches!(loc, ArgLoc::Stack(_)) {
                self.gen_expr(a);
                let slot = self.regs.top() - 1;
                writeln!(self.out, "  addi sp, sp, -8").unwrap();
                if is_float {
                    writeln!(self.out, "  fsd {}, 0(sp)", FP[slot]).unwrap();
                } else {
                    writeln!(self.out, "  sd {}, 0(sp)", GP[slot]).unwrap();
                }
                self.regs.pop();
            }
        }

        for (i, &a) in args.iter().enumerate() {
            let (_, is_float, loc) = classified[i];
            if matches!(loc, ArgLoc::Reg(_)) {
                self.gen_expr(a);
                let slot = self.regs.top() - 1;
                writeln!(self.out, "  addi sp, sp, -8").unwrap();
                if is_float {
                    writeln!(self.out, "  fsd {}, 0(sp)", FP[slot]).unwrap();
                } else {
                    writeln!(self.out, "  sd {}, 0(sp)", GP[slot]).unwrap();
                }
                self.regs.pop();
            }
        }

        for &(ty, is_float, loc) in classified.iter().rev() {
            let _ = ty;
            let idx = match loc {
                ArgLoc::Reg(idx) => idx,
                ArgLoc::Stack(_) => continue,
            };
            if is_float {
                writeln!(self.out, "  fld {}, 0(sp)", ARG_FP[idx]).unwrap();
            } else {
                writeln!(self.out, "  ld {}, 0(sp)", ARG_GP[idx]).unwrap();
            }
            writeln!(self.out, "  addi sp, sp, 8").unwrap();
        }
        writeln!(self.out, "  call {name}").unwrap();
        // Stack-passed arguments are caller-cleaned: the callee addresses
        // them via `s0` and never adjusts `sp` for them itself.
        if stack_count > 0 {
            writeln!(self.out, "  addi sp, sp, {}", 8 * stack_count).unwrap();
        }
        self.restore_caller_saved(entry);

        let slot = self.regs.push();
        if let Some(ty) = ret_ty {
            if self.types.is_flonum(ty) {
                let instr = if self.types.size_of(ty) == 4 { "fmv.s" } else { "fmv.d" };
                writeln!(self.out, "  {instr} {}, fa0", FP[slot]).unwrap();
            } else {
                writeln!(self.out, "  mv {}, a0", GP[slot]).unwrap();
            }
        }
    }

    /// Conservative over-save: both banks below `depth` are spilled
    /// regardless of which one actually holds a live value at that slot
    /// index, matching the same tradeoff `x86_64`'s backend makes.
    fn save_caller_saved(&mut self, depth: usize) {
        for i in 0..depth {
            writeln!(self.out, "  addi sp, sp, -8").unwrap();
            writeln!(self.out, "  sd {}, 0(sp)", GP[i]).unwrap();
        }
        for i in 0..depth {
            writeln!(self.out, "  addi sp, sp, -8").unwrap();
            writeln!(self.out, "  fsd {}, 0(sp)", FP[i]).unwrap();
        }
    }

    fn restore_caller_saved(&mut self, depth: usize) {
        for i in (0..depth).rev() {
            writeln!(self.out, "  fld {}, 0(sp)", FP[i]).unwrap();
            writeln!(self.out, "  addi sp, sp, 8").unwrap();
        }
        for i in (0..depth).rev() {
            writeln!(self.out, "  ld {}, 0(sp)", GP[i]).unwrap();
            writeln!(self.out, "  addi sp, sp, 8").unwrap();
        }
    }

    fn emit_loc(&mut self, id: NodeId) {
        let span = self.nodes.get(id).span;
        let line = self.files.line_number(span.file, span.start);
        writeln!(self.out, "  .loc {} {}", span.file.0 + 1, line).unwrap();
    }
}

fn member_at(struct_ty: TypeId, index: usize, types: &TypeTable) -> Member {
    match &types.get(struct_ty).kind {
        TypeKind::Struct { members, .. } => members[index].clone(),
        _ => panic!("internal error: member access on a non-struct type (compiler bug)"),
    }
}

fn is_aggregate(ty: TypeId, types: &TypeTable) -> bool {
    matches!(types.get(ty).kind, TypeKind::Struct { .. } | TypeKind::Array { .. })
}

fn load_mnemonic(size: usize, unsigned: bool) -> &'static str {
    match (size, unsigned) {
        (1, true) => "lbu",
        (1, false) => "lb",
        (2, true) => "lhu",
        (2, false) => "lh",
        (4, true) => "lwu",
        (4, false) => "lw",
        _ => "ld",
    }
}

fn store_mnemonic(size: usize) -> &'static str {
    match size {
        1 => "sb",
        2 => "sh",
        4 => "sw",
        _ => "sd",
    }
}
