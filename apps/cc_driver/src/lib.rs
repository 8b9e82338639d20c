//! `occ` — the command-line driver wiring together `cc_lex` → `cc_pp` →
//! `cc_parse` → `cc_codegen` into a single-translation-unit compiler.
//!
//! Every pass returns a source-anchored error; this crate's only job is to
//! run them in order, own the things none of them can own themselves (the
//! filesystem, `argv`, exit codes), and render whatever error escapes.

use cc_base::{Diagnostics, SourceMap};
use cc_lex::Token;
use cc_pp::{install_predefined, preprocess, IncludeKind, IncludeResolver, MacroTable};
use clap::Parser;
use std::path::{Path, PathBuf};

/// `occ` — a small C11-subset compiler that emits GNU-syntax assembly.
#[derive(Parser, Debug)]
#[command(name = "occ", version, about = "A C11-subset compiler")]
pub struct Cli {
    /// The `.c` file to compile.
    pub input: Option<PathBuf>,

    /// Output path (default: the input path with its extension replaced by `.s`).
    #[arg(short = 'o')]
    pub output: Option<PathBuf>,

    /// Adds `dir` to the header search path.
    #[arg(short = 'I', action = clap::ArgAction::Append)]
    pub include_dirs: Vec<PathBuf>,

    /// Defines `name` (optionally `name=value`) before the first line of the input.
    #[arg(short = 'D', action = clap::ArgAction::Append)]
    pub defines: Vec<String>,

    /// Preprocess only; print the result instead of compiling it.
    #[arg(short = 'E')]
    pub preprocess_only: bool,

    #[arg(long = "fpic")]
    pub fpic: bool,

    #[arg(long = "fPIC")]
    pub fpic_upper: bool,

    #[arg(long = "fno-pic")]
    pub fno_pic: bool,

    #[arg(long = "fno-PIC")]
    pub fno_pic_upper: bool,

    /// Emit RV64GC assembly instead of x86-64.
    #[arg(long = "target-rv64")]
    pub target_rv64: bool,
}

impl Cli {
    /// Whether position-independent code should be emitted. `-fno-pic`/
    /// `-fno-PIC` win over `-fpic`/`-fPIC` when both are present on one
    /// command line — true "last flag wins" would need clap to expose
    /// argument order, which the derive API doesn't, so a no-pic flag
    /// always disables PIC regardless of where it sits among the others.
    pub fn pic(&self) -> bool {
        !(self.fno_pic || self.fno_pic_upper)
    }

    pub fn arch(&self) -> Arch {
        if self.target_rv64 {
            Arch::Rv64
        } else {
            Arch::X86_64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Rv64,
}

/// Default include search path appended after `-I` directories, rooted at
/// the running binary's own directory first (so a build tree can ship its
/// own headers) and then the usual system locations.
pub fn default_include_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            dirs.push(dir.join("include"));
        }
    }
    dirs.push(PathBuf::from("/usr/local/include"));
    dirs.push(PathBuf::from("/usr/include/x86_64-linux-gnu"));
    dirs.push(PathBuf::from("/usr/include"));
    dirs
}

/// Resolves `#include` against a real filesystem: quoted and angled forms
/// both search `search_dirs` in order (the caller has already put the
/// including file's own directory first for quoted includes, then `-I`
/// directories, then the defaults).
pub struct FsIncludeResolver {
    pub search_dirs: Vec<PathBuf>,
}

impl IncludeResolver for FsIncludeResolver {
    fn resolve(&mut self, name: &str, kind: IncludeKind, current_file: &str) -> Result<(String, String), String> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        if kind == IncludeKind::Quoted {
            if let Some(dir) = Path::new(current_file).parent() {
                dirs.push(dir.to_path_buf());
            }
        }
        dirs.extend(self.search_dirs.iter().cloned());
        for dir in &dirs {
            let candidate = dir.join(name);
            if let Ok(contents) = std::fs::read_to_string(&candidate) {
                return Ok((candidate.display().to_string(), contents));
            }
        }
        Err(format!("{name}: no such file or directory"))
    }
}

/// Parses a `-D name[=value]` argument into the pair `MacroTable::define_objlike`
/// wants, defaulting a bare `name` to an empty-bodied macro (not `1`).
fn split_define(raw: &str) -> (&str, &str) {
    match raw.split_once('=') {
        Some((name, value)) => (name, value),
        None => (raw, ""),
    }
}

fn define_cli_macro(macros: &mut MacroTable, files: &mut SourceMap, raw: &str) -> Result<(), String> {
    let (name, value) = split_define(raw);
    if value.is_empty() {
        macros.define_objlike(name, Vec::new());
        return Ok(());
    }
    let prepared = cc_lex::prepare_source(value);
    let file = files.add_file(format!("<command-line:{name}>"), prepared);
    let toks = cc_lex::tokenize(file, files.contents(file)).map_err(|e| Diagnostics::new(files).fatal(&e))?;
    let body: Vec<Token> = toks.into_iter().filter(|t| !t.is_eof()).collect();
    macros.define_objlike(name, body);
    Ok(())
}

/// Everything the pipeline needs that isn't owned by the pass crates
/// themselves — assembled by the driver from `Cli` plus the file actually
/// read off disk, so the core pipeline stays testable without a filesystem.
pub struct CompileRequest {
    pub entry_name: String,
    pub entry_contents: String,
    pub search_dirs: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub pic: bool,
    pub arch: Arch,
}

/// Runs lexing through preprocessing and returns the resulting token stream
/// plus the `SourceMap` it was resolved against (every `#include`d file is
/// registered in it by the time this returns).
pub fn run_preprocessor(req: &CompileRequest) -> Result<(Vec<Token>, SourceMap), String> {
    let mut files = SourceMap::new();
    let prepared = cc_lex::prepare_source(&req.entry_contents);
    let entry = files.add_file(req.entry_name.clone(), prepared);

    let mut macros = MacroTable::new();
    install_predefined(&mut macros, &mut files);
    for raw in &req.defines {
        define_cli_macro(&mut macros, &mut files, raw)?;
    }

    let mut resolver = FsIncludeResolver { search_dirs: req.search_dirs.clone() };
    log::info!("preprocessing {}", req.entry_name);
    let toks = preprocess(&mut files, entry, &mut macros, &mut resolver)
        .map_err(|e| Diagnostics::new(&files).fatal(&e))?;
    log::debug!("macro table holds {} entries after preprocessing", macros.len());
    Ok((toks, files))
}

/// Renders a macro-expanded token stream the way `-E` prints it: a newline
/// at each `at_bol` boundary, a single space wherever the token carried
/// leading whitespace, and no separator otherwise — no attempt to reproduce
/// original column alignment.
pub fn render_preprocessed(toks: &[Token], files: &SourceMap) -> String {
    let mut out = String::new();
    let mut first = true;
    for tok in toks {
        if tok.is_eof() {
            continue;
        }
        if !first {
            if tok.at_bol {
                out.push('\n');
            } else if tok.has_space {
                out.push(' ');
            }
        }
        out.push_str(tok.text_in(files));
        first = false;
    }
    out.push('\n');
    out
}

/// Runs the full pipeline — preprocess, parse, codegen — and returns the
/// emitted assembly text.
pub fn compile(req: CompileRequest) -> Result<String, String> {
    let arch = req.arch;
    let pic = req.pic;
    let (toks, files) = run_preprocessor(&req)?;

    log::info!("parsing");
    let mut parsed = cc_parse::parse(&toks, &files).map_err(|e| Diagnostics::new(&files).fatal(&e))?;

    log::info!("generating code for {} function(s)", parsed.program.functions.len());
    let asm = match arch {
        Arch::X86_64 => cc_codegen::emit_x86_64(&mut parsed, &files, pic),
        Arch::Rv64 => cc_codegen::emit_rv64(&mut parsed, &files, pic),
    };
    Ok(asm)
}

fn default_output_path(input: &Path) -> PathBuf {
    if input.extension().and_then(|e| e.to_str()) == Some("c") {
        input.with_extension("s")
    } else {
        let mut s = input.as_os_str().to_os_string();
        s.push(".s");
        PathBuf::from(s)
    }
}

/// Parses `argv`, runs the pipeline, and writes its output — the only
/// function `main` calls. Argument-parsing failures and `--help`/`--version`
/// exit the process directly (clap's own convention); every other failure
/// comes back as `Err` for `main` to report and turn into exit code 1.
pub fn run_cli() -> Result<(), String> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.exit_code() == 0 { 0 } else { 1 };
            std::process::exit(code);
        }
    };

    let input = cli.input.clone().ok_or_else(|| "no input file".to_string())?;
    let entry_contents = std::fs::read_to_string(&input).map_err(|e| format!("{}: {e}", input.display()))?;
    let entry_name = input.display().to_string();

    let mut search_dirs: Vec<PathBuf> = cli.include_dirs.clone();
    search_dirs.extend(default_include_dirs());

    let req = CompileRequest {
        entry_name,
        entry_contents,
        search_dirs,
        defines: cli.defines.clone(),
        pic: cli.pic(),
        arch: cli.arch(),
    };

    if cli.preprocess_only {
        let (toks, files) = run_preprocessor(&req)?;
        let rendered = render_preprocessed(&toks, &files);
        return write_output(cli.output.as_deref(), &rendered);
    }

    let asm = compile(req)?;
    let output = cli.output.clone().unwrap_or_else(|| default_output_path(&input));
    std::fs::write(&output, asm).map_err(|e| format!("{}: {e}", output.display()))
}

fn write_output(path: Option<&Path>, text: &str) -> Result<(), String> {
    match path {
        Some(path) => std::fs::write(path, text).map_err(|e| format!("{}: {e}", path.display())),
        None => {
            use std::io::Write;
            std::io::stdout().write_all(text.as_bytes()).map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_define_defaults_bare_name_to_empty_body() {
        assert_eq!(split_define("FOO"), ("FOO", ""));
        assert_eq!(split_define("FOO=1"), ("FOO", "1"));
        assert_eq!(split_define("FOO=bar=baz"), ("FOO", "bar=baz"));
    }

    #[test]
    fn default_output_path_replaces_c_extension() {
        assert_eq!(default_output_path(Path::new("prog.c")), PathBuf::from("prog.s"));
        assert_eq!(default_output_path(Path::new("prog")), PathBuf::from("prog.s"));
        assert_eq!(default_output_path(Path::new("prog.txt")), PathBuf::from("prog.txt.s"));
    }

    #[test]
    fn render_preprocessed_breaks_lines_at_bol() {
        let mut files = SourceMap::new();
        let prepared = cc_lex::prepare_source("int a;\nint b;\n");
        let f = files.add_file("t.c", prepared);
        let toks = cc_lex::tokenize(f, files.contents(f)).unwrap();
        let rendered = render_preprocessed(&toks, &files);
        assert_eq!(rendered, "int a;\nint b;\n");
    }

    #[test]
    fn compile_emits_a_return_instruction_for_a_trivial_function() {
        let req = CompileRequest {
            entry_name: "t.c".to_string(),
            entry_contents: "int main(void) { return 42; }\n".to_string(),
            search_dirs: Vec::new(),
            defines: Vec::new(),
            pic: true,
            arch: Arch::X86_64,
        };
        let asm = compile(req).unwrap();
        assert!(asm.contains("main:"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn cli_define_without_value_defines_an_empty_macro() {
        let mut files = SourceMap::new();
        let mut macros = MacroTable::new();
        define_cli_macro(&mut macros, &mut files, "FOO").unwrap();
        assert!(macros.is_defined("FOO"));
        assert!(macros.get("FOO").unwrap().body.is_empty());
    }
}
