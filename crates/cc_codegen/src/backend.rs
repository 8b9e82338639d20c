//! The per-target register names, calling-convention registers, and
//! instruction mnemonics a backend contributes to code generation (§4.6,
//! §4.7).
//!
//! The register-stack discipline, `top` invariant, and node-walking order
//! live in [`crate::x86_64`] and [`crate::rv64`] directly rather than
//! behind one generic walker: the two targets diverge enough in addressing
//! modes (RIP-relative vs `s0`-relative), argument classification
//! (register-pair vs memory-class aggregates), and cast sequences that a
//! single generic walk would mostly be per-arch special cases wearing a
//! trait. Both backends are written to the same statement/expression
//! coverage and the same `RegStack` discipline so they stay structurally
//! parallel; see `DESIGN.md` for the tradeoff.

/// Number of integer and floating-point argument registers the System V
/// and RISC-V calling conventions both happen to make available (§4.6,
/// §4.7 "argument registers"). A call's classification loop spills the
/// 7th and later argument of either bank to the stack instead of
/// indexing past this bound.
pub const ARG_REG_COUNT: usize = 6;

/// Where a call's argument classification placed one operand: in the
/// `n`th register of its bank, or at the `n`th caller-pushed stack slot
/// once that bank's six registers are exhausted (§4.6, §4.7 "excess
/// integer/float args beyond the 6th go to the stack").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLoc {
    Reg(usize),
    Stack(usize),
}
