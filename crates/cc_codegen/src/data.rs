//! `.data`/`.bss` emission for global variables (§4.6 "Data emission").
//!
//! The GNU assembler directives for raw bytes, strings, and quad-word
//! relocations don't vary across the `x86_64-` and `riscv64-` targets this
//! crate emits for, so both backends share this one pass; only the
//! instruction-level code in a function body differs per backend.

use cc_parse::{TypeKind, TypeTable, Var, VarArena, VarId};
use std::fmt::Write as _;

/// Emits every defined global in `globals`, skipping `extern` declarations
/// that never received a definition.
pub fn emit_globals(out: &mut String, globals: &[VarId], vars: &VarArena, types: &TypeTable) {
    for &vid in globals {
        let v = vars.get(vid);
        if !v.is_definition {
            continue;
        }
        match &v.init_data {
            None => emit_bss(out, v, types),
            Some(bytes) => emit_data(out, v, bytes, types),
        }
    }
}

fn emit_bss(out: &mut String, v: &Var, types: &TypeTable) {
    writeln!(out, "  .bss").unwrap();
    if !v.is_static {
        writeln!(out, "  .globl {}", v.name).unwrap();
    }
    writeln!(out, "  .align {}", v.align).unwrap();
    writeln!(out, "{}:", v.name).unwrap();
    writeln!(out, "  .zero {}", types.size_of(v.ty)).unwrap();
}

fn emit_data(out: &mut String, v: &Var, bytes: &[u8], types: &TypeTable) {
    writeln!(out, "  .data").unwrap();
    if !v.is_static {
        writeln!(out, "  .globl {}", v.name).unwrap();
    }
    writeln!(out, "  .align {}", v.align).unwrap();
    writeln!(out, "{}:", v.name).unwrap();
    if v.relocations.is_empty() && is_char_array(v.ty, types) {
        writeln!(out, "  .string \"{}\"", escape_c_string(trim_one_trailing_nul(bytes))).unwrap();
        return;
    }
    let mut i = 0;
    while i < bytes.len() {
        if let Some(reloc) = v.relocations.iter().find(|r| r.offset == i) {
            if reloc.addend == 0 {
                writeln!(out, "  .quad {}", reloc.label).unwrap();
            } else {
                writeln!(out, "  .quad {}+{}", reloc.label, reloc.addend).unwrap();
            }
            i += 8;
        } else {
            writeln!(out, "  .byte {}", bytes[i]).unwrap();
            i += 1;
        }
    }
}

fn is_char_array(ty: cc_parse::TypeId, types: &TypeTable) -> bool {
    matches!(&types.get(ty).kind, TypeKind::Array { base, .. } if matches!(types.get(*base).kind, TypeKind::Char))
}

/// String initializers' byte buffer carries the trailing NUL the
/// initializer appended; `.string` supplies its own.
fn trim_one_trailing_nul(bytes: &[u8]) -> &[u8] {
    if bytes.last() == Some(&0) {
        &bytes[..bytes.len() - 1]
    } else {
        bytes
    }
}

fn escape_c_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' => s.push_str("\\\""),
            b'\\' => s.push_str("\\\\"),
            b'\n' => s.push_str("\\n"),
            b'\t' => s.push_str("\\t"),
            0x20..=0x7e => s.push(b as char),
            _ => s.push_str(&format!("\\{b:03o}")),
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_parse::Relocation;

    #[test]
    fn zero_initialized_global_goes_to_bss() {
        let types = TypeTable::new();
        let v = Var::new_global("g".into(), types.int, 4, false);
        let mut out = String::new();
        emit_bss(&mut out, &v, &types);
        assert!(out.contains(".bss"));
        assert!(out.contains(".zero 4"));
    }

    #[test]
    fn emit_globals_skips_non_definitions() {
        let types = TypeTable::new();
        let mut vars = VarArena::new();
        let mut v = Var::new_global("extern_only".into(), types.int, 4, false);
        v.is_definition = false;
        let id = vars.push(v);
        let mut out = String::new();
        emit_globals(&mut out, &[id], &vars, &types);
        assert!(out.is_empty());
    }

    #[test]
    fn char_array_initializer_becomes_a_string_directive() {
        let mut types = TypeTable::new();
        let arr = types.array_of(types.char_, 4);
        let mut v = Var::new_global("s".into(), arr, 1, false);
        v.init_data = Some(b"hi\0".to_vec());
        let mut out = String::new();
        emit_data(&mut out, &v, v.init_data.as_ref().unwrap(), &types);
        assert!(out.contains(".string \"hi\""));
    }

    #[test]
    fn pointer_initializer_emits_quad_relocation() {
        let mut types = TypeTable::new();
        let ptr = types.pointer_to(types.int);
        let mut v = Var::new_global("p".into(), ptr, 8, false);
        v.init_data = Some(vec![0; 8]);
        v.relocations.push(Relocation { offset: 0, label: "target".into(), addend: 4 });
        let mut out = String::new();
        emit_data(&mut out, &v, v.init_data.as_ref().unwrap(), &types);
        assert!(out.contains(".quad target+4"));
    }
}
