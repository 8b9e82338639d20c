//! Variable/typedef/enum-constant and tag scope stacks (§3 "Scopes", §4.5
//! "Scopes").
//!
//! Both stacks are flat `Vec`s tagged with the `scope_depth` they were
//! pushed at rather than linked lists of per-block frames; `leave` pops
//! every entry whose depth matches the block being exited. Lookup walks
//! from the end so shadowing resolves to the innermost binding.

use crate::ty::TypeId;
use crate::var::VarId;

#[derive(Debug, Clone)]
pub enum VarScopeEntry {
    Var(VarId),
    Typedef(TypeId),
    EnumConst { ty: TypeId, value: i64 },
}

struct VarScope {
    name: String,
    depth: u32,
    entry: VarScopeEntry,
}

struct TagScope {
    name: String,
    depth: u32,
    ty: TypeId,
}

#[derive(Default)]
pub struct Scopes {
    var_scopes: Vec<VarScope>,
    tag_scopes: Vec<TagScope>,
    depth: u32,
}

impl Scopes {
    pub fn new() -> Self {
        Self { var_scopes: Vec::new(), tag_scopes: Vec::new(), depth: 0 }
    }

    pub fn enter(&mut self) {
        self.depth += 1;
    }

    /// Pops every entry pushed since the matching `enter`.
    pub fn leave(&mut self) {
        let leaving_depth = self.depth;
        self.depth -= 1;
        self.var_scopes.retain(|s| s.depth < leaving_depth);
        self.tag_scopes.retain(|s| s.depth < leaving_depth);
    }

    pub fn push_var(&mut self, name: String, entry: VarScopeEntry) {
        self.var_scopes.push(VarScope { name, depth: self.depth, entry });
    }

    pub fn push_tag(&mut self, name: String, ty: TypeId) {
        self.tag_scopes.push(TagScope { name, depth: self.depth, ty });
    }

    pub fn find_var(&self, name: &str) -> Option<&VarScopeEntry> {
        self.var_scopes.iter().rev().find(|s| s.name == name).map(|s| &s.entry)
    }

    pub fn find_tag(&self, name: &str) -> Option<TypeId> {
        self.tag_scopes.iter().rev().find(|s| s.name == name).map(|s| s.ty)
    }

    /// True only for bindings in the *innermost* scope, used to reject
    /// redeclaration within a single block (§7 "redefinition").
    pub fn is_bound_in_current_scope(&self, name: &str) -> bool {
        self.var_scopes.iter().rev().take_while(|s| s.depth == self.depth).any(|s| s.name == name)
    }

    pub fn is_global_scope(&self) -> bool {
        self.depth == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_binding_shadows_outer() {
        let mut s = Scopes::new();
        s.push_var("x".into(), VarScopeEntry::Var(VarId(0)));
        s.enter();
        s.push_var("x".into(), VarScopeEntry::Var(VarId(1)));
        match s.find_var("x").unwrap() {
            VarScopeEntry::Var(id) => assert_eq!(*id, VarId(1)),
            _ => panic!("expected var entry"),
        }
        s.leave();
        match s.find_var("x").unwrap() {
            VarScopeEntry::Var(id) => assert_eq!(*id, VarId(0)),
            _ => panic!("expected var entry"),
        }
    }

    #[test]
    fn leave_only_pops_current_depth_entries() {
        let mut s = Scopes::new();
        s.push_var("outer".into(), VarScopeEntry::Var(VarId(0)));
        s.enter();
        s.push_var("inner".into(), VarScopeEntry::Var(VarId(1)));
        s.leave();
        assert!(s.find_var("outer").is_some());
        assert!(s.find_var("inner").is_none());
    }

    #[test]
    fn redeclaration_in_same_scope_is_detected() {
        let mut s = Scopes::new();
        s.push_var("x".into(), VarScopeEntry::Var(VarId(0)));
        assert!(s.is_bound_in_current_scope("x"));
        s.enter();
        assert!(!s.is_bound_in_current_scope("x"));
    }

    #[test]
    fn tag_scope_follows_same_depth_rules() {
        let mut s = Scopes::new();
        let ty = TypeId(7);
        s.enter();
        s.push_tag("S".into(), ty);
        assert_eq!(s.find_tag("S"), Some(ty));
        s.leave();
        assert_eq!(s.find_tag("S"), None);
    }
}
