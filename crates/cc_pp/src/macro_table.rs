//! Macro table (§4.4 "Macro table").
//!
//! `#define` of an already-defined name simply replaces the table entry —
//! expansion only ever looks at the current binding, so there is no
//! observable difference from chaining a new entry in front of the old one.
//! `#undef` removes the entry outright rather than merely flagging it
//! deleted, for the same reason.

use cc_lex::Token;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// `__FILE__` — expands to the invocation site's file name.
    File,
    /// `__LINE__` — expands to the invocation site's line number.
    Line,
}

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub is_objlike: bool,
    pub params: Vec<String>,
    pub is_variadic: bool,
    pub body: Vec<Token>,
    /// Set for `__FILE__`/`__LINE__`; when present, `body` is empty and
    /// ignored, and expansion instead calls `builtin::expand_builtin`.
    pub builtin: Option<BuiltinKind>,
}

#[derive(Default)]
pub struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_objlike(&mut self, name: impl Into<String>, body: Vec<Token>) {
        let name = name.into();
        self.macros.insert(
            name.clone(),
            Macro { name, is_objlike: true, params: Vec::new(), is_variadic: false, body, builtin: None },
        );
    }

    pub fn define_funclike(&mut self, name: impl Into<String>, params: Vec<String>, is_variadic: bool, body: Vec<Token>) {
        let name = name.into();
        self.macros.insert(
            name.clone(),
            Macro { name, is_objlike: false, params, is_variadic, body, builtin: None },
        );
    }

    pub fn define_builtin(&mut self, name: impl Into<String>, kind: BuiltinKind) {
        let name = name.into();
        self.macros.insert(
            name.clone(),
            Macro { name, is_objlike: true, params: Vec::new(), is_variadic: false, body: Vec::new(), builtin: Some(kind) },
        );
    }

    pub fn undef(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redefinition_replaces_prior_binding() {
        let mut t = MacroTable::new();
        t.define_objlike("N", Vec::new());
        assert!(t.is_defined("N"));
        t.undef("N");
        assert!(!t.is_defined("N"));
    }

    #[test]
    fn builtin_macro_has_no_body() {
        let mut t = MacroTable::new();
        t.define_builtin("__LINE__", BuiltinKind::Line);
        let m = t.get("__LINE__").unwrap();
        assert!(m.body.is_empty());
        assert_eq!(m.builtin, Some(BuiltinKind::Line));
    }
}
