//! The reserved-word set consulted by `convert_keywords` (§4.3).
//!
//! Identifiers whose spelling matches one of these are retargeted from
//! `TokenKind::Ident` to `TokenKind::Reserved` by a post-pass over the
//! whole token sequence, after the scanner has already classified runs of
//! `[A-Za-z_][A-Za-z0-9_]*` as identifiers.

const KEYWORDS: &[&str] = &[
    "void", "_Bool", "char", "short", "int", "long", "float", "double",
    "struct", "union", "enum", "typedef", "static", "extern", "const",
    "volatile", "register", "signed", "unsigned", "inline", "_Alignas",
    "_Alignof", "_Noreturn", "_Thread_local",
    "if", "else", "switch", "case", "default", "for", "while", "do",
    "return", "break", "continue", "goto",
    "sizeof",
];

pub fn is_keyword(spelling: &str) -> bool {
    KEYWORDS.contains(&spelling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_control_flow_and_type_keywords() {
        assert!(is_keyword("return"));
        assert!(is_keyword("struct"));
        assert!(is_keyword("_Bool"));
    }

    #[test]
    fn plain_identifiers_are_not_keywords() {
        assert!(!is_keyword("main"));
        assert!(!is_keyword("x"));
    }
}
