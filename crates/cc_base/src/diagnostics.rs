//! Source-anchored errors and the diagnostic renderer (§4.1, §7).
//!
//! Every fallible pass returns [`Result<T>`]; the first error terminates
//! compilation (no error recovery is attempted, per §7). Warnings share the
//! same caret-pointing formatter but do not stop the pipeline.

use crate::files::SourceMap;
use crate::span::Span;
use std::fmt;

/// Which stage raised the error, matching the taxonomy in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Preprocess,
    Parse,
    Type,
    /// Compiler-internal invariant violation; never caused by user input.
    Codegen,
}

/// An error annotated with its source location and stage.
#[derive(Debug, Clone)]
pub struct SpannedError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
}

impl SpannedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lex, message, span)
    }

    pub fn preprocess(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Preprocess, message, span)
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Parse, message, span)
    }

    pub fn ty(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Type, message, span)
    }
}

impl fmt::Display for SpannedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for SpannedError {}

/// Alias for `std::result::Result<T, SpannedError>`.
pub type Result<T> = std::result::Result<T, SpannedError>;

/// Renders diagnostics against a [`SourceMap`]: the enclosing line, a caret
/// under the offending column, then the message.
pub struct Diagnostics<'a> {
    files: &'a SourceMap,
}

impl<'a> Diagnostics<'a> {
    pub fn new(files: &'a SourceMap) -> Self {
        Self { files }
    }

    fn render(&self, span: Span, message: &str) -> String {
        let (line, column) = self.files.line_text_and_column(span.file, span.start);
        let line_no = self.files.line_number(span.file, span.start);
        let name = self.files.name(span.file);
        let location = format!("{}:{}: ", name, line_no);
        let caret_pad = " ".repeat(location.len() + column as usize);
        format!("{location}{line}\n{caret_pad}^ {message}")
    }

    /// Renders `err` and returns the formatted text. The caller (the
    /// driver) is responsible for printing it to stderr and exiting with a
    /// nonzero status; passes never exit the process directly (§7a).
    pub fn fatal(&self, err: &SpannedError) -> String {
        self.render(err.span, &err.message)
    }

    /// Renders a warning. Compilation continues after a warning (§7):
    /// excess initializer elements, implicit function declarations, extra
    /// tokens after a directive.
    pub fn warn(&self, span: Span, message: &str) -> String {
        format!("warning: {}", self.render(span, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn fatal_points_caret_at_column() {
        let mut files = SourceMap::new();
        let f = files.add_file("t.c", "int x = y;\n\0".to_string());
        let diags = Diagnostics::new(&files);
        let err = SpannedError::parse("undefined identifier 'y'", Span::new(f, 8, 9));
        let rendered = diags.fatal(&err);
        assert!(rendered.contains("t.c:1:"));
        assert!(rendered.contains("int x = y;"));
        assert!(rendered.ends_with("^ undefined identifier 'y'"));
    }

    #[test]
    fn warn_prefixes_warning() {
        let mut files = SourceMap::new();
        let f = files.add_file("t.c", "int a[2] = {1,2,3};\n\0".to_string());
        let diags = Diagnostics::new(&files);
        let rendered = diags.warn(Span::new(f, 17, 18), "excess elements in initializer");
        assert!(rendered.starts_with("warning: "));
    }

    #[test]
    fn error_kind_round_trips() {
        let f = FileId(0);
        let err = SpannedError::lex("unclosed comment", Span::new(f, 0, 1));
        assert_eq!(err.kind, ErrorKind::Lex);
    }
}
