//! The parse result (§3 "Program").

use crate::node::NodeId;
use crate::var::VarId;

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<VarId>,
    pub locals: Vec<VarId>,
    pub body: NodeId,
    /// Filled in by the code generator's stack-layout pass; `0` until then.
    pub stack_size: i64,
    pub is_static: bool,
    pub is_variadic: bool,
    pub is_definition: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub globals: Vec<VarId>,
    pub functions: Vec<Function>,
}
