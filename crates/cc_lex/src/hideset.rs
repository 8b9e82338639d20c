//! Hideset: the set of macro names already expanded to produce a token.
//!
//! Attached to every token so the preprocessor can apply Prosser's rule
//! (§4.4): an identifier already in its own hideset is not expanded again,
//! which stops recursive macros (`#define T T`) at a single expansion.
//!
//! Hidesets are cheap to clone (an [`Rc`]) and persistent: every mutating
//! operation returns a new `HideSet` rather than mutating in place, because
//! many tokens typically share the same hideset value.

use std::collections::BTreeSet;
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HideSet(Rc<BTreeSet<String>>);

impl HideSet {
    pub fn empty() -> Self {
        Self(Rc::new(BTreeSet::new()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Returns a new hideset with `name` added.
    pub fn inserted(&self, name: &str) -> Self {
        if self.0.contains(name) {
            return self.clone();
        }
        let mut set = (*self.0).clone();
        set.insert(name.to_string());
        Self(Rc::new(set))
    }

    /// `self ∩ other`, used to compute a function-like macro expansion's
    /// result hideset from the macro name token and the closing paren.
    pub fn intersection(&self, other: &HideSet) -> Self {
        Self(Rc::new(self.0.intersection(&other.0).cloned().collect()))
    }

    /// `self ∪ other`, used for object-like macro expansion.
    pub fn union(&self, other: &HideSet) -> Self {
        if Rc::ptr_eq(&self.0, &other.0) {
            return self.clone();
        }
        Self(Rc::new(self.0.union(&other.0).cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_name_is_contained() {
        let hs = HideSet::empty().inserted("FOO");
        assert!(hs.contains("FOO"));
        assert!(!hs.contains("BAR"));
    }

    #[test]
    fn intersection_keeps_only_shared_names() {
        let a = HideSet::empty().inserted("FOO").inserted("BAR");
        let b = HideSet::empty().inserted("BAR").inserted("BAZ");
        let i = a.intersection(&b);
        assert!(i.contains("BAR"));
        assert!(!i.contains("FOO"));
        assert!(!i.contains("BAZ"));
    }

    #[test]
    fn union_combines_both() {
        let a = HideSet::empty().inserted("FOO");
        let b = HideSet::empty().inserted("BAR");
        let u = a.union(&b);
        assert!(u.contains("FOO"));
        assert!(u.contains("BAR"));
    }

    #[test]
    fn recursive_macro_single_expansion() {
        // Models `#define T T`: expanding T once adds T to the hideset, so
        // a second attempted expansion of the identifier spelled "T" must
        // see it already hidden.
        let hs = HideSet::empty().inserted("T");
        assert!(hs.contains("T"));
    }
}
