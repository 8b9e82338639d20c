//! x86-64 / System V code generation (§4.6).
//!
//! ```text
//! ParseOutput { Program, NodeArena, TypeTable, VarArena }
//!         │
//!         ▼
//!   gen_program ── .file directives ── emit_globals (.data/.bss)
//!         │
//!         ▼
//!   one gen_function per Function:
//!     stack layout (locals/params → rbp-relative offsets)
//!     prologue (push rbp; mov rsp,rbp; sub frame_size,rsp; save callee regs;
//!               spill incoming args to their stack slots)
//!     gen_stmt(body)                ◀── register-stack discipline (RegStack)
//!     epilogue (restore callee regs; leave; ret)
//! ```
//!
//! | Source construct               | Emitted x86-64                              |
//! |---------------------------------|---------------------------------------------|
//! | `a + b` (int)                   | `add %rN, %rM`                              |
//! | `a + b` (double)                | `addsd %xmmN, %xmmM`                        |
//! | `a[i]`                          | `lea`/scaled add, then sized load            |
//! | `f(a, b)`                       | classify args into `rdi,rsi,...`/`xmm0..5`, `call f` |
//! | `(int)d`                        | `cvttsd2si %xmmN, %reg`                     |
//! | `s.field` (bitfield)            | load, shift left to drop high bits, shift right (signed/unsigned) to drop low bits |
//! | `goto L` / `L:`                 | function-name-mangled `.L.label.f.L`        |
//!
//! Key features:
//! - Six abstract register-stack slots (`%r10..%r15` / `%xmm8..%xmm13`),
//!   shared by every expression via [`crate::machine::RegStack`].
//! - PIC (`lea sym(%rip), reg`) and non-PIC (`movq $sym, reg`) addressing,
//!   selected once per compilation.
//! - Struct/union values are never loaded into a register: loads are a
//!   no-op (the address stays put) and assignment copies byte-by-byte.
//! - Function-call arguments are marshaled through the real machine stack
//!   (computed into a slot, `push`ed, later `pop`ped into its ABI
//!   register), not through the six named slots, so argument count isn't
//!   bounded by the expression-nesting limit.
//!
//! Entry point: [`emit`].

use crate::backend::{ArgLoc, ARG_REG_COUNT};
use crate::data::emit_globals;
use crate::layout::{assign_local_offsets, mangle_label, LabelGen};
use crate::machine::RegStack;
use cc_base::SourceMap;
use cc_parse::{
    BinOp, Function, Member, NodeArena, NodeId, NodeKind, ParseOutput, Program, TypeId, TypeKind, TypeTable, UnaryOp,
    VarArena, VarId,
};
use std::fmt::Write as _;

const GP64: [&str; 6] = ["%r10", "%r11", "%r12", "%r13", "%r14", "%r15"];
const GP32: [&str; 6] = ["%r10d", "%r11d", "%r12d", "%r13d", "%r14d", "%r15d"];
const GP16: [&str; 6] = ["%r10w", "%r11w", "%r12w", "%r13w", "%r14w", "%r15w"];
const GP8: [&str; 6] = ["%r10b", "%r11b", "%r12b", "%r13b", "%r14b", "%r15b"];
const XMM: [&str; 6] = ["%xmm8", "%xmm9", "%xmm10", "%xmm11", "%xmm12", "%xmm13"];

const ARG_GP64: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];
const ARG_GP32: [&str; 6] = ["%edi", "%esi", "%edx", "%ecx", "%r8d", "%r9d"];
const ARG_XMM: [&str; 6] = ["%xmm0", "%xmm1", "%xmm2", "%xmm3", "%xmm4", "%xmm5"];

/// Offsets of the variadic register-save area, relative to `%rbp`: six
/// quadwords for `rdi..r9` followed by eight octwords for `xmm0..xmm7`
/// (§9 "variadic register-save area").
const VA_GP_SAVE_BASE: i64 = -128;
const VA_FP_SAVE_BASE: i64 = -48;

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
    pic: bool,
    regs: RegStack,
    label_gen: LabelGen,
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
    current_fn: String,
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
        let frame_size = assign_local_offsets(func, self.vars, self.types);
        self.label_gen = LabelGen::new();
        self.current_fn = func.name.clone();

        writeln!(self.out, "  .text").unwrap();
        if !func.is_static {
            writeln!(self.out, "  .globl {}", func.name).unwrap();
        }
        writeln!(self.out, "{}:", func.name).unwrap();
        writeln!(self.out, "  push %rbp").unwrap();
        writeln!(self.out, "  mov %rsp, %rbp").unwrap();
        writeln!(self.out, "  sub ${}, %rsp", frame_size + 192).unwrap();
        writeln!(self.out, "  mov %r12, -8(%rbp)").unwrap();
        writeln!(self.out, "  mov %r13, -16(%rbp)").unwrap();
        writeln!(self.out, "  mov %r14, -24(%rbp)").unwrap();
        writeln!(self.out, "  mov %r15, -32(%rbp)").unwrap();

        if func.is_variadic {
            self.spill_variadic_save_area();
        }
        self.spill_params(func);

        self.regs = RegStack::new();
        self.gen_stmt(func.body);
        self.regs.assert_empty();

        writeln!(self.out, ".L.return.{}:", func.name).unwrap();
        writeln!(self.out, "  mov -8(%rbp), %r12").unwrap();
        writeln!(self.out, "  mov -16(%rbp), %r13").unwrap();
        writeln!(self.out, "  mov -24(%rbp), %r14").unwrap();
        writeln!(self.out, "  mov -32(%rbp), %r15").unwrap();
        writeln!(self.out, "  leave").unwrap();
        writeln!(self.out, "  ret").unwrap();
    }

    /// Copies each incoming argument register into its parameter's stack
    /// slot (§4.6 "spill incoming args"). Parameters past the 6th of
    /// either bank never arrived in a register at all — the caller left
    /// them on the stack at `16(%rbp)` onward, one quadword apiece in
    /// declaration order, so those are copied from there instead.
    fn spill_params(&mut self, func: &Function) {
        let mut gpi = 0;
        let mut fpi = 0;
        let mut stacki = 0usize;
        for &pid in &func.params {
            let v = self.vars.get(pid);
            let (offset, ty) = (v.offset, v.ty);
            let size = self.types.size_of(ty);
            if self.types.is_flonum(ty) {
                let instr = if size == 4 { "movss" } else { "movsd" };
                if fpi < ARG_REG_COUNT {
                    let reg = ARG_XMM[fpi];
                    fpi += 1;
                    writeln!(self.out, "  {instr} {reg}, {offset}(%rbp)").unwrap();
                } else {
                    let src = 16 + 8 * stacki as i64;
                    stacki += 1;
                    writeln!(self.out, "  {instr} {src}(%rbp), %xmm0").unwrap();
                    writeln!(self.out, "  {instr} %xmm0, {offset}(%rbp)").unwrap();
                }
            } else if gpi < ARG_REG_COUNT {
                let reg = if size == 8 { ARG_GP64[gpi] } else { ARG_GP32[gpi] };
                gpi += 1;
                let instr = store_mnemonic(size);
                writeln!(self.out, "  {instr} {reg}, {offset}(%rbp)").unwrap();
            } else {
                let src = 16 + 8 * stacki as i64;
                stacki += 1;
                writeln!(self.out, "  mov {src}(%rbp), %rax").unwrap();
                let instr = store_mnemonic(size);
                writeln!(self.out, "  {instr} {}, {offset}(%rbp)", int_scratch(size)).unwrap();
            }
        }
    }

    /// `rdi..r9` and `xmm0..xmm7` all land in the save area regardless of
    /// how many named parameters preceded `...`, so a future `va_start`/
    /// `va_arg` consumer can walk it uniformly.
    fn spill_variadic_save_area(&mut self) {
        for (i, reg) in ARG_GP64.iter().enumerate() {
            writeln!(self.out, "  mov {reg}, {}(%rbp)", VA_GP_SAVE_BASE + 8 * i as i64).unwrap();
        }
        writeln!(self.out, "  test %al, %al").unwrap();
        let skip = format!(".L.va_skip.{}", self.label_gen.next_id());
        writeln!(self.out, "  je {skip}").unwrap();
        for (i, reg) in ARG_XMM.iter().enumerate() {
            writeln!(self.out, "  movsd {reg}, {}(%rbp)", VA_FP_SAVE_BASE - 8 - 16 * i as i64).unwrap();
        }
        writeln!(self.out, "{skip}:").unwrap();
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
                writeln!(self.out, "  jmp .L.return.{}", self.current_fn).unwrap();
            }
            NodeKind::If { cond, then, els } => {
                let id = self.label_gen.next_id();
                let else_label = format!(".L.else.{id}");
                let end_label = format!(".L.end.{id}");
                self.gen_cond_jump_if_zero(cond, if els.is_some() { &else_label } else { &end_label });
                self.gen_stmt(then);
                if let Some(els) = els {
                    writeln!(self.out, "  jmp {end_label}").unwrap();
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
                writeln!(self.out, "  jmp {begin}").unwrap();
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
                writeln!(self.out, "  jmp {label}").unwrap();
            }
            NodeKind::Continue => {
                let label = self.continue_labels.last().expect("continue outside loop (compiler bug)").clone();
                writeln!(self.out, "  jmp {label}").unwrap();
            }
            NodeKind::Goto(name) => {
                writeln!(self.out, "  jmp {}", mangle_label(&self.current_fn, &name)).unwrap();
            }
            NodeKind::Label { name, body } => {
                writeln!(self.out, "{}:", mangle_label(&self.current_fn, &name)).unwrap();
                self.gen_stmt(body);
            }
            _ => panic!("internal error: not a statement node (compiler bug, {kind:?})"),
        }
    }

    /// `Switch.cases`/`default_case` are dispatched with a linear compare
    /// chain against uniquified `.L.case.<fn>.<node>` labels (§4.6
    /// "switch").
    fn gen_switch(&mut self, cond: NodeId, body: NodeId, cases: &[NodeId], default_case: Option<NodeId>) {
        self.gen_expr(cond);
        let slot = self.regs.top() - 1;
        let ty = self.nodes.get(cond).ty.unwrap();
        let width = reg_for(self.types.size_of(ty).max(4), slot);
        let end_id = self.label_gen.next_id();
        let end_label = format!(".L.end.{end_id}");
        for &case in cases {
            if let NodeKind::Case { val: Some(v), .. } = self.nodes.get(case).kind {
                let label = self.case_label(case);
                writeln!(self.out, "  cmp ${v}, {width}").unwrap();
                writeln!(self.out, "  je {label}").unwrap();
            }
        }
        if let Some(def) = default_case {
            writeln!(self.out, "  jmp {}", self.case_label(def)).unwrap();
        } else {
            writeln!(self.out, "  jmp {end_label}").unwrap();
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

    /// Computes `cond`, branches to `label` if it is zero, and restores
    /// `top` either way — used by `if`/`for`/`while`'s guard.
    fn gen_cond_jump_if_zero(&mut self, cond: NodeId, label: &str) {
        self.gen_expr(cond);
        let slot = self.regs.top() - 1;
        let ty = self.nodes.get(cond).ty.unwrap();
        if self.types.is_flonum(ty) {
            let cmp = if self.types.size_of(ty) == 4 { "ucomiss" } else { "ucomisd" };
            writeln!(self.out, "  xorps %xmm14, %xmm14").unwrap();
            writeln!(self.out, "  {cmp} %xmm14, {}", XMM[slot]).unwrap();
        } else {
            writeln!(self.out, "  cmp $0, {}", GP64[slot]).unwrap();
        }
        writeln!(self.out, "  je {label}").unwrap();
        self.regs.pop();
    }

    fn gen_cond_jump_if_nonzero(&mut self, cond: NodeId, label: &str) {
        self.gen_expr(cond);
        let slot = self.regs.top() - 1;
        writeln!(self.out, "  cmp $0, {}", GP64[slot]).unwrap();
        writeln!(self.out, "  jne {label}").unwrap();
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
                writeln!(self.out, "  mov $0, {}", GP64[slot]).unwrap();
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
            let bits: u64 = if self.types.size_of(ty) == 4 { (fval as f32).to_bits() as u64 } else { fval.to_bits() };
            writeln!(self.out, "  movabs ${bits}, %rax").unwrap();
            let instr = if self.types.size_of(ty) == 4 { "movd" } else { "movq" };
            writeln!(self.out, "  {instr} %rax, {}", XMM[slot]).unwrap();
        } else {
            writeln!(self.out, "  movabs ${ival}, {}", GP64[slot]).unwrap();
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
                    writeln!(self.out, "  movabs $0x8000000000000000, %rax").unwrap();
                    writeln!(self.out, "  movq %rax, %xmm14").unwrap();
                    let instr = if self.types.size_of(ty) == 4 { "xorps" } else { "xorpd" };
                    writeln!(self.out, "  {instr} %xmm14, {}", XMM[slot]).unwrap();
                } else {
                    writeln!(self.out, "  neg {}", GP64[slot]).unwrap();
                }
            }
            UnaryOp::BitNot => {
                self.gen_expr(operand);
                let slot = self.regs.top() - 1;
                writeln!(self.out, "  not {}", GP64[slot]).unwrap();
            }
            UnaryOp::LogNot => {
                self.gen_expr(operand);
                let slot = self.regs.top() - 1;
                writeln!(self.out, "  cmp $0, {}", GP64[slot]).unwrap();
                writeln!(self.out, "  sete %al").unwrap();
                writeln!(self.out, "  movzbl %al, {}", GP32[slot]).unwrap();
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

    /// `&&`/`||` must not evaluate their right operand unless the left
    /// leaves the outcome undetermined (short-circuit evaluation); the
    /// parser types both as a plain `Binary` node, so codegen special-
    /// cases these two operators into branches instead of an eager op.
    fn gen_short_circuit(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) {
        let id = self.label_gen.next_id();
        let short_label = format!(".L.sc.{id}");
        let end_label = format!(".L.end.{id}");
        self.gen_expr(lhs);
        let slot = self.regs.top() - 1;
        writeln!(self.out, "  cmp $0, {}", GP64[slot]).unwrap();
        match op {
            BinOp::LogAnd => writeln!(self.out, "  je {short_label}").unwrap(),
            BinOp::LogOr => writeln!(self.out, "  jne {short_label}").unwrap(),
            _ => unreachable!(),
        }
        self.regs.pop();
        self.gen_expr(rhs);
        let rslot = self.regs.top() - 1;
        writeln!(self.out, "  cmp $0, {}", GP64[rslot]).unwrap();
        writeln!(self.out, "  setne %al").unwrap();
        writeln!(self.out, "  movzbl %al, {}", GP32[rslot]).unwrap();
        writeln!(self.out, "  jmp {end_label}").unwrap();
        writeln!(self.out, "{short_label}:").unwrap();
        let result = match op {
            BinOp::LogAnd => 0,
            BinOp::LogOr => 1,
            _ => unreachable!(),
        };
        writeln!(self.out, "  mov ${result}, {}", GP32[rslot]).unwrap();
        writeln!(self.out, "{end_label}:").unwrap();
    }

    fn gen_int_binop(&mut self, op: BinOp, slot: usize, rslot: usize, ty: TypeId) {
        let size = self.types.size_of(ty);
        let unsigned = self.types.is_unsigned(ty);
        let d = reg_for(size.max(4), slot);
        let s = reg_for(size.max(4), rslot);
        match op {
            BinOp::Add => writeln!(self.out, "  add {s}, {d}").unwrap(),
            BinOp::Sub => writeln!(self.out, "  sub {s}, {d}").unwrap(),
            BinOp::Mul => writeln!(self.out, "  imul {s}, {d}").unwrap(),
            BinOp::Div | BinOp::Mod => self.gen_div_mod(op, slot, rslot, size, unsigned),
            BinOp::BitAnd => writeln!(self.out, "  and {s}, {d}").unwrap(),
            BinOp::BitOr => writeln!(self.out, "  or {s}, {d}").unwrap(),
            BinOp::BitXor => writeln!(self.out, "  xor {s}, {d}").unwrap(),
            BinOp::Shl | BinOp::Shr => self.gen_shift(op, slot, rslot, size, unsigned),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le => self.gen_compare(op, slot, rslot, size, unsigned),
            BinOp::LogAnd | BinOp::LogOr => unreachable!("handled by gen_short_circuit"),
        }
    }

    fn gen_div_mod(&mut self, op: BinOp, slot: usize, rslot: usize, size: usize, unsigned: bool) {
        let wide = size == 8;
        let acc = if wide { "%rax" } else { "%eax" };
        let rem = if wide { "%rdx" } else { "%edx" };
        let ext = if unsigned { "xor %edx, %edx".to_string() } else if wide { "cqto".to_string() } else { "cltd".to_string() };
        let src = if wide { GP64[slot] } else { GP32[slot] };
        let divr = if wide { GP64[rslot] } else { GP32[rslot] };
        writeln!(self.out, "  mov {src}, {acc}").unwrap();
        writeln!(self.out, "  {ext}").unwrap();
        let instr = if unsigned { "div" } else { "idiv" };
        writeln!(self.out, "  {instr} {divr}").unwrap();
        let dst = if wide { GP64[slot] } else { GP32[slot] };
        let result = if matches!(op, BinOp::Div) { acc } else { rem };
        writeln!(self.out, "  mov {result}, {dst}").unwrap();
    }

    fn gen_shift(&mut self, op: BinOp, slot: usize, rslot: usize, size: usize, unsigned: bool) {
        writeln!(self.out, "  mov {}, %rcx", GP64[rslot]).unwrap();
        let d = reg_for(size.max(4), slot);
        let mnemonic = match (op, unsigned) {
            (BinOp::Shl, _) => "shl",
            (BinOp::Shr, true) => "shr",
            (BinOp::Shr, false) => "sar",
            _ => unreachable!(),
        };
        writeln!(self.out, "  {mnemonic} %cl, {d}").unwrap();
    }

    fn gen_compare(&mut self, op: BinOp, slot: usize, rslot: usize, size: usize, unsigned: bool) {
        let s = reg_for(size.max(4), rslot);
        let d = reg_for(size.max(4), slot);
        writeln!(self.out, "  cmp {s}, {d}").unwrap();
        let setcc = match (op, unsigned) {
            (BinOp::Eq, _) => "sete",
            (BinOp::Ne, _) => "setne",
            (BinOp::Lt, true) => "setb",
            (BinOp::Lt, false) => "setl",
            (BinOp::Le, true) => "setbe",
            (BinOp::Le, false) => "setle",
            _ => unreachable!(),
        };
        writeln!(self.out, "  {setcc} %al").unwrap();
        writeln!(self.out, "  movzbl %al, {}", GP32[slot]).unwrap();
    }

    fn gen_float_binop(&mut self, op: BinOp, slot: usize, rslot: usize, ty: TypeId) {
        let double = self.types.size_of(ty) == 8;
        let d = XMM[slot];
        let s = XMM[rslot];
        match op {
            BinOp::Add => writeln!(self.out, "  {} {s}, {d}", if double { "addsd" } else { "addss" }).unwrap(),
            BinOp::Sub => writeln!(self.out, "  {} {s}, {d}", if double { "subsd" } else { "subss" }).unwrap(),
            BinOp::Mul => writeln!(self.out, "  {} {s}, {d}", if double { "mulsd" } else { "mulss" }).unwrap(),
            BinOp::Div => writeln!(self.out, "  {} {s}, {d}", if double { "divsd" } else { "divss" }).unwrap(),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le => {
                writeln!(self.out, "  {} {s}, {d}", if double { "ucomisd" } else { "ucomiss" }).unwrap();
                let setcc = match op {
                    BinOp::Eq => "sete",
                    BinOp::Ne => "setne",
                    BinOp::Lt => "setb",
                    BinOp::Le => "setbe",
                    _ => unreachable!(),
                };
                writeln!(self.out, "  {setcc} %al").unwrap();
                writeln!(self.out, "  movzbl %al, {}", GP32[slot]).unwrap();
            }
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
        writeln!(self.out, "  jmp {end_label}").unwrap();
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
                    writeln!(self.out, "  add ${}, {}", member.offset, GP64[slot]).unwrap();
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
            writeln!(self.out, "  lea {}(%rbp), {}", v.offset, GP64[slot]).unwrap();
        } else if self.pic {
            writeln!(self.out, "  lea {}(%rip), {}", v.name, GP64[slot]).unwrap();
        } else {
            writeln!(self.out, "  movq ${}, {}", v.name, GP64[slot]).unwrap();
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
            let instr = if size == 4 { "movss" } else { "movsd" };
            writeln!(self.out, "  {instr} ({}), {}", GP64[slot], XMM[slot]).unwrap();
            return;
        }
        let unsigned = self.types.is_unsigned(ty) || matches!(self.types.get(ty).kind, TypeKind::Bool);
        let instr = load_mnemonic(size, unsigned);
        let dst = reg_for(size.max(4), slot);
        writeln!(self.out, "  {instr} ({}), {}", GP64[slot], dst).unwrap();
    }

    fn store(&mut self, addr_slot: usize, val_slot: usize, ty: TypeId) {
        let size = self.types.size_of(ty);
        if self.types.is_flonum(ty) {
            let instr = if size == 4 { "movss" } else { "movsd" };
            writeln!(self.out, "  {instr} {}, ({})", XMM[val_slot], GP64[addr_slot]).unwrap();
            return;
        }
        let instr = store_mnemonic(size);
        let src = reg_for(size, val_slot);
        writeln!(self.out, "  {instr} {src}, ({})", GP64[addr_slot]).unwrap();
    }

    /// Byte-at-a-time copy for struct/union assignment (§4.6 "struct
    /// stores byte-copy in a loop"); `1:`/`1b` are GNU as local labels and
    /// may be reused by every copy loop in the function.
    fn store_struct(&mut self, dst_slot: usize, src_slot: usize, size: usize) {
        writeln!(self.out, "  mov ${size}, %rcx").unwrap();
        writeln!(self.out, "1:").unwrap();
        writeln!(self.out, "  dec %rcx").unwrap();
        writeln!(self.out, "  movzbl ({},%rcx), %eax", GP64[src_slot]).unwrap();
        writeln!(self.out, "  movb %al, ({},%rcx)", GP64[dst_slot]).unwrap();
        writeln!(self.out, "  test %rcx, %rcx").unwrap();
        writeln!(self.out, "  jnz 1b").unwrap();
    }

    /// Bitfield read: load the containing 8-byte unit, shift left to
    /// discard the higher bits, then shift right (arithmetic if signed,
    /// logical if unsigned) to discard the lower bits and place the field
    /// at bit 0 (§4.6 "bitfield read").
    fn load_bitfield(&mut self, slot: usize, member: &Member) {
        writeln!(self.out, "  mov ({}), %rax", GP64[slot]).unwrap();
        let left = 64 - member.bit_width - member.bit_offset;
        writeln!(self.out, "  shl ${left}, %rax").unwrap();
        let unsigned = self.types.is_unsigned(member.ty);
        let shr = if unsigned { "shr" } else { "sar" };
        writeln!(self.out, "  {shr} ${}, %rax", 64 - member.bit_width).unwrap();
        writeln!(self.out, "  mov %rax, {}", GP64[slot]).unwrap();
    }

    /// Bitfield write: load the unit, mask out the field's bits, OR in
    /// the shifted new value, store back (§4.6 "bitfield write").
    fn store_bitfield(&mut self, addr_slot: usize, val_slot: usize, member: &Member) {
        writeln!(self.out, "  mov ({}), %rax", GP64[addr_slot]).unwrap();
        let mask: u64 = ((1u128 << member.bit_width) - 1) as u64;
        writeln!(self.out, "  movabs ${}, %rcx", !(mask << member.bit_offset)).unwrap();
        writeln!(self.out, "  and %rcx, %rax").unwrap();
        writeln!(self.out, "  mov {}, %rcx", GP64[val_slot]).unwrap();
        writeln!(self.out, "  movabs ${mask}, %rdx").unwrap();
        writeln!(self.out, "  and %rdx, %rcx").unwrap();
        writeln!(self.out, "  shl ${}, %rcx", member.bit_offset).unwrap();
        writeln!(self.out, "  or %rcx, %rax").unwrap();
        writeln!(self.out, "  mov %rax, ({})", GP64[addr_slot]).unwrap();
    }

    fn move_to_return_reg(&mut self, slot: usize, ty: TypeId) {
        if self.types.is_flonum(ty) {
            let instr = if self.types.size_of(ty) == 4 { "movss" } else { "movsd" };
            writeln!(self.out, "  {instr} {}, %xmm0", XMM[slot]).unwrap();
        } else if matches!(self.types.get(ty).kind, TypeKind::Bool) {
            writeln!(self.out, "  movzbl {}, %eax", GP8[slot]).unwrap();
        } else {
            writeln!(self.out, "  mov {}, %rax", GP64[slot]).unwrap();
        }
    }

    // --------------------------------------------------------------- cast

    fn cast(&mut self, slot: usize, from: TypeId, to: TypeId) {
        let from_float = self.types.is_flonum(from);
        let to_float = self.types.is_flonum(to);
        if matches!(self.types.get(to).kind, TypeKind::Bool) {
            if from_float {
                writeln!(self.out, "  xorps %xmm14, %xmm14").unwrap();
                let cmp = if self.types.size_of(from) == 4 { "ucomiss" } else { "ucomisd" };
                writeln!(self.out, "  {cmp} %xmm14, {}", XMM[slot]).unwrap();
            } else {
                writeln!(self.out, "  cmp $0, {}", GP64[slot]).unwrap();
            }
            writeln!(self.out, "  setne %al").unwrap();
            writeln!(self.out, "  movzbl %al, {}", GP32[slot]).unwrap();
            return;
        }
        match (from_float, to_float) {
            (false, true) => {
                let src = if self.types.size_of(from) == 8 { GP64[slot] } else { GP32[slot] };
                let instr = if self.types.size_of(to) == 4 { "cvtsi2ss" } else { "cvtsi2sd" };
                writeln!(self.out, "  {instr} {src}, {}", XMM[slot]).unwrap();
            }
            (true, false) => {
                let dst = if self.types.size_of(to) == 8 { GP64[slot] } else { GP32[slot] };
                let instr = if self.types.size_of(from) == 4 { "cvttss2si" } else { "cvttsd2si" };
                writeln!(self.out, "  {instr} {}, {dst}", XMM[slot]).unwrap();
            }
            (true, true) => {
                if self.types.size_of(from) != self.types.size_of(to) {
                    let instr = if self.types.size_of(to) == 8 { "cvtss2sd" } else { "cvtsd2ss" };
                    writeln!(self.out, "  {instr} {}, {}", XMM[slot], XMM[slot]).unwrap();
                }
            }
            (false, false) => self.cast_int_to_int(slot, from, to),
        }
    }

    fn cast_int_to_int(&mut self, slot: usize, from: TypeId, to: TypeId) {
        let from_size = self.types.size_of(from);
        let to_size = self.types.size_of(to);
        if to_size <= from_size {
            return;
        }
        let unsigned = self.types.is_unsigned(from);
        match from_size {
            1 => {
                let instr = if unsigned { "movzbl" } else { "movsbl" };
                writeln!(self.out, "  {instr} {}, {}", GP8[slot], GP32[slot]).unwrap();
            }
            2 => {
                let instr = if unsigned { "movzwl" } else { "movswl" };
                writeln!(self.out, "  {instr} {}, {}", GP16[slot], GP32[slot]).unwrap();
            }
            _ => {}
        }
        if to_size == 8 {
            if unsigned {
                writeln!(self.out, "  mov {}, {}", GP32[slot], GP32[slot]).unwrap();
            } else {
                writeln!(self.out, "  movslq {}, {}", GP32[slot], GP64[slot]).unwrap();
            }
        }
    }

    // ------------------------------------------------------------- calls

    /// Arguments are computed one at a time and immediately pushed onto
    /// the real machine stack (not the six named slots), so argument
    /// count isn't bounded by the expression-nesting limit; they're
    /// popped back off in reverse order into their classified ABI
    /// register once every argument has been evaluated.
    fn gen_funcall(&mut self, name: &str, func_ty: TypeId, args: &[NodeId], ret_ty: Option<TypeId>) {
        let (params, is_variadic) = match &self.types.get(func_ty).kind {
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
        // Spilling after the argument pushes would put the save area on
        // top instead, handing the pop loop saved-register garbage.
        self.save_caller_saved(entry);

        // Arguments that overflow the six register-class slots of either
        // bank (§4.6 "excess args spill to the stack") are pushed first,
        // in reverse declaration order, so the first stack argument ends
        // up closest to `%rsp` — exactly where the callee's `16(%rbp)`
        // expects to find it — and stay there through the call instead of
        // being popped back into a register.
        for (i, &a) in args.iter().enumerate().rev() {
            let (_, is_float, loc) = classified[i];
            if matches!(loc, ArgLoc::Stack(_)) {
                self.gen_expr(a);
                let slot = self.regs.top() - 1;
                if is_float {
                    writeln!(self.out, "  sub $8, %rsp").unwrap();
                    writeln!(self.out, "  movsd {}, (%rsp)", XMM[slot]).unwrap();
                } else {
                    writeln!(self.out, "  push {}", GP64[slot]).unwrap();
                }
                self.regs.pop();
            }
        }

        for (i, &a) in args.iter().enumerate() {
            let (_, is_float, loc) = classified[i];
            if matches!(loc, ArgLoc::Reg(_)) {
                self.gen_expr(a);
                let slot = self.regs.top() - 1;
                if is_float {
                    writeln!(self.out, "  sub $8, %rsp").unwrap();
                    writeln!(self.out, "  movsd {}, (%rsp)", XMM[slot]).unwrap();
                } else {
                    writeln!(self.out, "  push {}", GP64[slot]).unwrap();
                }
                self.regs.pop();
            }
        }

        for &(ty, is_float, loc) in classified.iter().rev() {
            let idx = match loc {
                ArgLoc::Reg(idx) => idx,
                ArgLoc::Stack(_) => continue,
            };
            if is_float {
                writeln!(self.out, "  movsd (%rsp), {}", ARG_XMM[idx]).unwrap();
                writeln!(self.out, "  add $8, %rsp").unwrap();
            } else if self.types.size_of(ty) == 8 {
                writeln!(self.out, "  pop {}", ARG_GP64[idx]).unwrap();
            } else {
                writeln!(self.out, "  pop %rax").unwrap();
                writeln!(self.out, "  mov %eax, {}", ARG_GP32[idx]).unwrap();
            }
        }
        if is_variadic {
            writeln!(self.out, "  mov ${fp_count}, %al").unwrap();
        } else {
            writeln!(self.out, "  mov $0, %rax").unwrap();
        }
        writeln!(self.out, "  call {name}").unwrap();
        // Stack-passed arguments are caller-cleaned: the callee addresses
        // them via `%rbp` and never adjusts `%rsp` for them itself.
        if stack_count > 0 {
            writeln!(self.out, "  add ${}, %rsp", 8 * stack_count).unwrap();
        }
        self.restore_caller_saved(entry);

        let slot = self.regs.push();
        if let Some(ty) = ret_ty {
            if self.types.is_flonum(ty) {
                writeln!(self.out, "  movsd %xmm0, {}", XMM[slot]).unwrap();
            } else if matches!(self.types.get(ty).kind, TypeKind::Bool) {
                writeln!(self.out, "  movzbl %al, {}", GP32[slot]).unwrap();
            } else {
                writeln!(self.out, "  mov %rax, {}", GP64[slot]).unwrap();
            }
        }
    }

    /// Pushes every live caller-saved slot below `depth` so it survives
    /// the call (§4.6 "caller-saved registers are pushed/popped around
    /// the call"): `r10,r11` of the GP bank, and `xmm8..xmm13`. Slots are
    /// saved from both banks regardless of which one a given depth is
    /// actually holding a value in — a conservative over-save that costs
    /// a few redundant instructions but never a correctness bug.
    fn save_caller_saved(&mut self, depth: usize) {
        for i in 0..depth.min(2) {
            writeln!(self.out, "  push {}", GP64[i]).unwrap();
        }
        for i in 0..depth {
            writeln!(self.out, "  sub $8, %rsp").unwrap();
            writeln!(self.out, "  movsd {}, (%rsp)", XMM[i]).unwrap();
        }
    }

    fn restore_caller_saved(&mut self, depth: usize) {
        for i in (0..depth).rev() {
            writeln!(self.out, "  movsd (%rsp), {}", XMM[i]).unwrap();
            writeln!(self.out, "  add $8, %rsp").unwrap();
        }
        for i in (0..depth.min(2)).rev() {
            writeln!(self.out, "  pop {}", GP64[i]).unwrap();
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

fn reg_for(size: usize, slot: usize) -> &'static str {
    match size {
        1 => GP8[slot],
        2 => GP16[slot],
        4 => GP32[slot],
        _ => GP64[slot],
    }
}

fn load_mnemonic(size: usize, unsigned: bool) -> &'static str {
    match (size, unsigned) {
        (1, true) => "movzbl",
        (1, false) => "movsbl",
        (2, true) => "movzwl",
        (2, false) => "movswl",
        (4, _) => "movl",
        _ => "movq",
    }
}

fn store_mnemonic(size: usize) -> &'static str {
    match size {
        1 => "movb",
        2 => "movw",
        4 => "movl",
        _ => "movq",
    }
}

/// `%rax`'s sub-register view at `size` bytes, for the scratch moves that
/// copy a stack-passed argument/parameter through a fixed register instead
/// of one of the six named register-stack slots.
fn int_scratch(size: usize) -> &'static str {
    match size {
        1 => "%al",
        2 => "%ax",
        4 => "%eax",
        _ => "%rax",
    }
}
