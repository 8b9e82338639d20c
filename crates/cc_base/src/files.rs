//! Registry of every file read during one compilation.
//!
//! Each call to [`SourceMap::add_file`] assigns the next [`FileId`] in
//! registration order, matching the `.file N "path"` directives the code
//! generator must emit for the main input and every header it transitively
//! `#include`s (§6).

use crate::span::FileId;

struct FileEntry {
    name: String,
    /// Contents with the tokenizer's trailing `\n\0` already appended (§4.3).
    contents: String,
    /// Byte offset of the start of each line, for caret rendering.
    line_starts: Vec<u32>,
}

fn compute_line_starts(contents: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in contents.bytes().enumerate() {
        if b == b'\n' {
            starts.push((i + 1) as u32);
        }
    }
    starts
}

/// Owns every source file's text for the lifetime of one compilation.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<FileEntry>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Registers a file's contents and returns its stable [`FileId`].
    ///
    /// `contents` must already carry the guaranteed trailing newline + NUL
    /// (§4.3); this function does not append one, so that it can also be
    /// used for the synthesized single-line buffers the preprocessor
    /// re-tokenizes (stringize, paste, string concatenation).
    pub fn add_file(&mut self, name: impl Into<String>, contents: String) -> FileId {
        let id = FileId(self.files.len() as u32);
        let line_starts = compute_line_starts(&contents);
        self.files.push(FileEntry {
            name: name.into(),
            contents,
            line_starts,
        });
        id
    }

    pub fn name(&self, file: FileId) -> &str {
        &self.files[file.0 as usize].name
    }

    pub fn contents(&self, file: FileId) -> &str {
        &self.files[file.0 as usize].contents
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates over `(FileId, name)` in registration order, for emitting
    /// one `.file N "path"` directive per file (§6).
    pub fn iter(&self) -> impl Iterator<Item = (FileId, &str)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f.name.as_str()))
    }

    /// Returns the 1-based line number containing byte offset `pos`.
    pub fn line_number(&self, file: FileId, pos: u32) -> u32 {
        let starts = &self.files[file.0 as usize].line_starts;
        match starts.binary_search(&pos) {
            Ok(i) => (i + 1) as u32,
            Err(i) => i as u32,
        }
    }

    /// Returns the full text of the line containing byte offset `pos`,
    /// and the 0-based column of `pos` within that line.
    pub fn line_text_and_column(&self, file: FileId, pos: u32) -> (&str, u32) {
        let entry = &self.files[file.0 as usize];
        let line_no = self.line_number(file, pos) as usize;
        let start = entry.line_starts[line_no - 1] as usize;
        let end = entry
            .line_starts
            .get(line_no)
            .map(|&e| e as usize)
            .unwrap_or(entry.contents.len());
        let line = entry.contents[start..end].trim_end_matches(['\n', '\0']);
        let column = pos.saturating_sub(start as u32);
        (line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_file_assigns_sequential_ids() {
        let mut sm = SourceMap::new();
        let a = sm.add_file("a.c", "int x;\n\0".to_string());
        let b = sm.add_file("b.c", "int y;\n\0".to_string());
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
        assert_eq!(sm.name(a), "a.c");
        assert_eq!(sm.name(b), "b.c");
    }

    #[test]
    fn line_number_and_text_track_newlines() {
        let mut sm = SourceMap::new();
        let f = sm.add_file("t.c", "int a;\nint b;\nint c;\n\0".to_string());
        assert_eq!(sm.line_number(f, 0), 1);
        assert_eq!(sm.line_number(f, 7), 2);
        assert_eq!(sm.line_number(f, 14), 3);
        let (line, col) = sm.line_text_and_column(f, 11);
        assert_eq!(line, "int b;");
        assert_eq!(col, 4);
    }
}
