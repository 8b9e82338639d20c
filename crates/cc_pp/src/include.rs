//! `#include` resolution contract.
//!
//! The on-disk header-search paths are an external collaborator (the
//! driver's job, not this crate's): this module only defines the interface
//! the directive dispatcher calls into, plus a fixed in-memory resolver for
//! tests that would otherwise need a real filesystem.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `#include "foo.h"` — tried relative to the including file first.
    Quoted,
    /// `#include <foo.h>` — searched only along configured include paths.
    Angled,
}

/// Implemented by whatever owns the filesystem (the driver, or a test
/// harness) to turn an `#include` target into file contents. The
/// preprocessor itself never opens a file.
pub trait IncludeResolver {
    /// Returns `(display_name, contents)` for `name`, or an error message to
    /// report at the `#include` directive's span. `current_file` is the
    /// display name of the file containing the directive.
    fn resolve(&mut self, name: &str, kind: IncludeKind, current_file: &str) -> Result<(String, String), String>;
}

/// A fixed name → contents table, for unit tests and other in-memory
/// harnesses that don't want to touch a real filesystem.
#[derive(Default)]
pub struct MapIncludeResolver(HashMap<String, String>);

impl MapIncludeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, contents: impl Into<String>) -> &mut Self {
        self.0.insert(name.into(), contents.into());
        self
    }
}

impl IncludeResolver for MapIncludeResolver {
    fn resolve(&mut self, name: &str, _kind: IncludeKind, _current_file: &str) -> Result<(String, String), String> {
        self.0
            .get(name)
            .cloned()
            .map(|c| (name.to_string(), c))
            .ok_or_else(|| "not registered in MapIncludeResolver".to_string())
    }
}
