//! Architecture-neutral pieces of code generation: the stack-layout pass
//! (§3 "Var.offset", §3 "Function.stack_size") and the monotonic label
//! generators used by control-flow lowering (§4.6 "Control flow").

use cc_parse::{align_to, Function, TypeTable, VarArena};

/// Assigns every local in `func.locals` (which already includes the
/// parameters, per the parser's `new_lvar` bookkeeping) a negative byte
/// offset from the frame pointer, and returns the 16-byte-aligned frame
/// size a backend's prologue should reserve.
pub fn assign_local_offsets(func: &Function, vars: &mut VarArena, types: &TypeTable) -> i64 {
    let mut offset: usize = 0;
    for &vid in &func.locals {
        let ty = vars.get(vid).ty;
        let size = types.size_of(ty);
        let align = vars.get(vid).align;
        offset = align_to(offset + size, align);
        vars.get_mut(vid).offset = -(offset as i64);
    }
    align_to(offset, 16) as i64
}

/// Per-function monotonic counters for uniquified control-flow labels
/// (`.L.else.3`, `.L.begin.7`, …). A fresh one is built per function so
/// label numbers stay small and readable in the emitted assembly.
#[derive(Default)]
pub struct LabelGen {
    next: u32,
}

impl LabelGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Mangles a `goto`/label name with its enclosing function so two
/// functions' identically spelled labels can never collide (§4.6
/// "goto/label mangle the function name").
pub fn mangle_label(func_name: &str, label: &str) -> String {
    format!(".L.label.{func_name}.{label}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_parse::{Function, NodeId, Var, VarArena};

    #[test]
    fn offsets_accumulate_downward_and_respect_alignment() {
        let types = TypeTable::new();
        let mut vars = VarArena::new();
        let a = vars.push(Var::new_local("a".into(), types.char_, 1));
        let b = vars.push(Var::new_local("b".into(), types.int, 4));
        let func = Function {
            name: "f".into(),
            params: vec![],
            locals: vec![a, b],
            body: NodeId(0),
            stack_size: 0,
            is_static: false,
            is_variadic: false,
            is_definition: true,
        };
        let size = assign_local_offsets(&func, &mut vars, &types);
        assert_eq!(vars.get(a).offset, -1);
        assert_eq!(vars.get(b).offset, -8);
        assert_eq!(size, 16);
    }

    #[test]
    fn mangled_labels_are_unique_per_function() {
        assert_ne!(mangle_label("f", "done"), mangle_label("g", "done"));
    }
}
