//! Directive dispatch: `#include`, `#define`, `#undef`, conditional
//! inclusion, `#error`, and the null directive (§4.4 "Directive
//! recognition").
//!
//! Owns the single top-level scan that interleaves directive handling with
//! macro expansion in source order — `#define`/`#undef` visibility is
//! strictly sequential, so expansion cannot be a separate pass run after all
//! directives have been collected.

use crate::concat::concat_adjacent_strings;
use crate::expand::{expand_tokens, try_expand_one};
use crate::include::{IncludeKind, IncludeResolver};
use crate::macro_table::MacroTable;
use cc_base::{ErrorKind, FileId, Result, SourceMap, SpannedError, Span};
use cc_lex::{IntKind, NumLit, Token, TokenKind};
use std::collections::VecDeque;

fn err(span: Span, msg: impl Into<String>) -> SpannedError {
    SpannedError::new(ErrorKind::Preprocess, msg.into(), span)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CondState {
    Then,
    Elif,
    Else,
}

struct CondIncl {
    state: CondState,
    /// Whether the body immediately following is currently live.
    included: bool,
    /// Whether any arm of this `#if` chain has matched yet.
    any_included: bool,
    /// True if this whole chain sits inside an already-false outer region;
    /// once set, no `#elif`/`#else` in this chain can become live.
    dead: bool,
}

/// Preprocesses `entry` (and everything it transitively `#include`s) into a
/// single macro-expanded, string-concatenated token list ready for the
/// parser.
pub fn preprocess(
    files: &mut SourceMap,
    entry: FileId,
    macros: &mut MacroTable,
    resolver: &mut dyn IncludeResolver,
) -> Result<Vec<Token>> {
    let toks = cc_lex::tokenize(entry, files.contents(entry))?;
    let mut queue: VecDeque<Token> = toks.into();
    let mut out = Vec::new();
    process(&mut queue, &mut out, files, macros, resolver)?;
    Ok(concat_adjacent_strings(out))
}

fn process(
    queue: &mut VecDeque<Token>,
    out: &mut Vec<Token>,
    files: &mut SourceMap,
    macros: &mut MacroTable,
    resolver: &mut dyn IncludeResolver,
) -> Result<()> {
    let mut conds: Vec<CondIncl> = Vec::new();
    while let Some(tok) = queue.pop_front() {
        if tok.is_eof() {
            if !conds.is_empty() {
                return Err(err(tok.span, "unterminated #if (missing #endif)"));
            }
            return Ok(());
        }
        if tok.at_bol && tok.is_in("#", files) {
            handle_directive(tok.span, queue, out, &mut conds, files, macros, resolver)?;
            continue;
        }
        let skipping = conds.last().is_some_and(|c| !c.included);
        if skipping {
            continue;
        }
        if tok.is_ident() {
            match try_expand_one(&tok, queue, macros, files)? {
                Some(replacement) => {
                    for t in replacement.into_iter().rev() {
                        queue.push_front(t);
                    }
                }
                None => out.push(tok),
            }
        } else {
            out.push(tok);
        }
    }
    if !conds.is_empty() {
        return Err(err(Span::point(FileId(0), 0), "unterminated #if (missing #endif)"));
    }
    Ok(())
}

/// Pops the rest of the current logical line (everything up to, but not
/// including, the next token with `at_bol` set, or `Eof`).
fn take_line(queue: &mut VecDeque<Token>) -> Vec<Token> {
    let mut line = Vec::new();
    while let Some(front) = queue.front() {
        if front.is_eof() || front.at_bol {
            break;
        }
        line.push(queue.pop_front().unwrap());
    }
    line
}

#[allow(clippy::too_many_arguments)]
fn handle_directive(
    hash_span: Span,
    queue: &mut VecDeque<Token>,
    out: &mut Vec<Token>,
    conds: &mut Vec<CondIncl>,
    files: &mut SourceMap,
    macros: &mut MacroTable,
    resolver: &mut dyn IncludeResolver,
) -> Result<()> {
    let line = take_line(queue);
    let skipping = conds.last().is_some_and(|c| !c.included);

    let Some(name_tok) = line.first() else {
        return Ok(()); // null directive: bare `#`
    };
    if !name_tok.is_ident() {
        if skipping {
            return Ok(());
        }
        return Err(err(name_tok.span, "expected a preprocessing directive name"));
    }
    let name = name_tok.text_in(files).to_string();

    match name.as_str() {
        "if" | "ifdef" | "ifndef" => {
            let cond = if skipping {
                false
            } else {
                match name.as_str() {
                    "ifdef" => {
                        let id = line.get(1).ok_or_else(|| err(hash_span, "#ifdef expects an identifier"))?;
                        macros.is_defined(id.text_in(files))
                    }
                    "ifndef" => {
                        let id = line.get(1).ok_or_else(|| err(hash_span, "#ifndef expects an identifier"))?;
                        !macros.is_defined(id.text_in(files))
                    }
                    _ => eval_condition(hash_span, &line[1..], macros, files)?,
                }
            };
            conds.push(CondIncl { state: CondState::Then, included: cond && !skipping, any_included: cond && !skipping, dead: skipping });
            Ok(())
        }
        "elif" => {
            let c = conds.last_mut().ok_or_else(|| err(hash_span, "#elif without #if"))?;
            if c.state == CondState::Else {
                return Err(err(hash_span, "#elif after #else"));
            }
            c.state = CondState::Elif;
            if c.dead || c.any_included {
                c.included = false;
                Ok(())
            } else {
                let cond = eval_condition(hash_span, &line[1..], macros, files)?;
                let c = conds.last_mut().unwrap();
                c.included = cond;
                c.any_included |= cond;
                Ok(())
            }
        }
        "else" => {
            let c = conds.last_mut().ok_or_else(|| err(hash_span, "#else without #if"))?;
            if c.state == CondState::Else {
                return Err(err(hash_span, "duplicate #else"));
            }
            c.state = CondState::Else;
            c.included = !c.dead && !c.any_included;
            c.any_included = true;
            Ok(())
        }
        "endif" => {
            conds.pop().ok_or_else(|| err(hash_span, "#endif without #if"))?;
            Ok(())
        }
        _ if skipping => Ok(()),
        "include" => handle_include(hash_span, &line[1..], out, files, macros, resolver),
        "define" => handle_define(hash_span, &line[1..], macros, files),
        "undef" => {
            let id = line.get(1).ok_or_else(|| err(hash_span, "#undef expects an identifier"))?;
            macros.undef(id.text_in(files));
            Ok(())
        }
        "error" => {
            let msg: String = line[1..].iter().map(|t| t.text_in(files)).collect::<Vec<_>>().join(" ");
            Err(err(hash_span, format!("#error {msg}")))
        }
        "pragma" | "line" => Ok(()),
        _ => Err(err(hash_span, format!("unknown preprocessing directive `#{name}`"))),
    }
}

/// Evaluates an `#if`/`#elif` expression: `defined`/`defined(...)` reduce
/// first (before macro expansion sees them), then the line is macro
/// expanded, then any identifiers still standing reduce to `0`, and the
/// result is parsed and evaluated as a constant expression.
fn eval_condition(hash_span: Span, tokens: &[Token], macros: &mut MacroTable, files: &mut SourceMap) -> Result<bool> {
    if tokens.is_empty() {
        return Err(err(hash_span, "#if/#elif requires an expression"));
    }
    let replaced = replace_defined(tokens, macros, files);
    let mut expanded = expand_tokens(replaced, macros, files)?;
    zero_out_remaining_idents(&mut expanded);
    expanded.push(Token::eof(hash_span, tokens[0].line_no));
    let v = cc_parse::eval_constant_expr_tokens(&expanded, files)?;
    Ok(v != 0)
}

fn replace_defined(tokens: &[Token], macros: &MacroTable, files: &mut SourceMap) -> Vec<Token> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        if t.is_ident() && t.text_in(files) == "defined" {
            let (name, total) = if tokens.get(i + 1).is_some_and(|n| n.is_in("(", files)) {
                (tokens.get(i + 2), 4usize)
            } else {
                (tokens.get(i + 1), 2usize)
            };
            let is_def = name.is_some_and(|n| macros.is_defined(n.text_in(files)));
            out.push(bool_token(files, t.span, is_def));
            i += total;
            continue;
        }
        out.push(t.clone());
        i += 1;
    }
    out
}

fn bool_token(files: &mut SourceMap, span: Span, v: bool) -> Token {
    let spelling = if v { "1" } else { "0" };
    let file = files.add_file("<defined>", format!("{spelling}\n\0"));
    Token {
        kind: TokenKind::Num(NumLit::Int { value: v as u64, kind: IntKind::Int }),
        span: Span::new(file, 0, 1),
        line_no: files.line_number(span.file, span.start),
        at_bol: false,
        has_space: true,
        is_first_of_file: false,
        hideset: cc_lex::HideSet::empty(),
    }
}

fn zero_out_remaining_idents(toks: &mut [Token]) {
    for t in toks.iter_mut() {
        if t.is_ident() {
            t.kind = TokenKind::Num(NumLit::Int { value: 0, kind: IntKind::Int });
        }
    }
}

fn handle_include(
    hash_span: Span,
    rest: &[Token],
    out: &mut Vec<Token>,
    files: &mut SourceMap,
    macros: &mut MacroTable,
    resolver: &mut dyn IncludeResolver,
) -> Result<()> {
    let (name, kind) = parse_include_target(hash_span, rest, macros, files)?;
    let current = files.name(hash_span.file).to_string();
    let (display, contents) = resolver
        .resolve(&name, kind, &current)
        .map_err(|msg| err(hash_span, format!("cannot find include file `{name}`: {msg}")))?;
    let prepared = cc_lex::prepare_source(&contents);
    let file = files.add_file(display, prepared);
    let toks = cc_lex::tokenize(file, files.contents(file))?;
    let mut nested_queue: VecDeque<Token> = toks.into();
    process(&mut nested_queue, out, files, macros, resolver)
}

fn parse_include_target(hash_span: Span, rest: &[Token], macros: &mut MacroTable, files: &mut SourceMap) -> Result<(String, IncludeKind)> {
    if let Some(name) = quoted_name(rest) {
        return Ok((name, IncludeKind::Quoted));
    }
    if rest.first().is_some_and(|t| t.is_in("<", files)) {
        return Ok((angle_name(hash_span, rest, files)?, IncludeKind::Angled));
    }
    let expanded = expand_tokens(rest.to_vec(), macros, files)?;
    if let Some(name) = quoted_name(&expanded) {
        return Ok((name, IncludeKind::Quoted));
    }
    if expanded.first().is_some_and(|t| t.is_in("<", files)) {
        return Ok((angle_name(hash_span, &expanded, files)?, IncludeKind::Angled));
    }
    Err(err(hash_span, "#include expects \"FILENAME\" or <FILENAME>"))
}

fn quoted_name(toks: &[Token]) -> Option<String> {
    let first = toks.first()?;
    let TokenKind::Str { bytes, .. } = &first.kind else { return None };
    Some(String::from_utf8_lossy(bytes).into_owned())
}

fn angle_name(hash_span: Span, rest: &[Token], files: &SourceMap) -> Result<String> {
    let mut name = String::new();
    let mut i = 1;
    while i < rest.len() && !rest[i].is_in(">", files) {
        name.push_str(rest[i].text_in(files));
        i += 1;
    }
    if i >= rest.len() {
        return Err(err(hash_span, "#include expects a closing `>`"));
    }
    Ok(name)
}

fn handle_define(hash_span: Span, rest: &[Token], macros: &mut MacroTable, files: &SourceMap) -> Result<()> {
    let name_tok = rest.first().ok_or_else(|| err(hash_span, "#define expects an identifier"))?;
    if !name_tok.is_ident() {
        return Err(err(name_tok.span, "macro name must be an identifier"));
    }
    let name = name_tok.text_in(files).to_string();

    if rest.get(1).is_some_and(|t| t.is_in("(", files) && !t.has_space) {
        let mut params = Vec::new();
        let mut is_variadic = false;
        let mut i = 2;
        if !rest.get(i).is_some_and(|t| t.is_in(")", files)) {
            loop {
                let t = rest.get(i).ok_or_else(|| err(hash_span, "unterminated macro parameter list"))?;
                if t.is_in("...", files) {
                    is_variadic = true;
                    i += 1;
                    break;
                }
                if !t.is_ident() {
                    return Err(err(t.span, "expected a macro parameter name"));
                }
                params.push(t.text_in(files).to_string());
                i += 1;
                let sep = rest.get(i).ok_or_else(|| err(hash_span, "unterminated macro parameter list"))?;
                if sep.is_in(")", files) {
                    break;
                }
                if !sep.is_in(",", files) {
                    return Err(err(sep.span, "expected `,` or `)` in macro parameter list"));
                }
                i += 1;
            }
        }
        let close = rest.get(i).ok_or_else(|| err(hash_span, "unterminated macro parameter list"))?;
        if !close.is_in(")", files) {
            return Err(err(close.span, "expected `)` to close macro parameter list"));
        }
        let body = rest[i + 1..].to_vec();
        macros.define_funclike(name, params, is_variadic, body);
    } else {
        let body = rest[1..].to_vec();
        macros.define_objlike(name, body);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::include::MapIncludeResolver;

    fn run(src: &str, resolver: &mut dyn IncludeResolver) -> (Vec<Token>, SourceMap) {
        let mut files = SourceMap::new();
        let prepared = cc_lex::prepare_source(src);
        let entry = files.add_file("<test>", prepared);
        let mut macros = MacroTable::new();
        let out = preprocess(&mut files, entry, &mut macros, resolver).unwrap();
        (out, files)
    }

    fn spellings(toks: &[Token], files: &SourceMap) -> Vec<String> {
        toks.iter()
            .filter(|t| !t.is_eof())
            .map(|t| match &t.kind {
                TokenKind::Str { bytes, .. } => format!("\"{}\"", String::from_utf8_lossy(bytes)),
                _ => t.text_in(files).to_string(),
            })
            .collect()
    }

    #[test]
    fn define_and_use_object_like_macro() {
        let mut resolver = MapIncludeResolver::new();
        let (out, files) = run("#define N 3\nint a = N;\n", &mut resolver);
        assert_eq!(spellings(&out, &files), vec!["int", "a", "=", "3", ";"]);
    }

    #[test]
    fn ifdef_skips_body_when_undefined() {
        let mut resolver = MapIncludeResolver::new();
        let (out, files) = run("#ifdef MISSING\nshould_not_appear\n#else\nkept\n#endif\n", &mut resolver);
        assert_eq!(spellings(&out, &files), vec!["kept"]);
    }

    #[test]
    fn nested_conditional_inside_skipped_branch_stays_dead() {
        let src = "#if 0\n#if 1\ninner\n#endif\n#else\nouter\n#endif\n";
        let mut resolver = MapIncludeResolver::new();
        let (out, files) = run(src, &mut resolver);
        assert_eq!(spellings(&out, &files), vec!["outer"]);
    }

    #[test]
    fn elif_chain_picks_first_true_arm() {
        let src = "#define X 2\n#if X == 1\na\n#elif X == 2\nb\n#else\nc\n#endif\n";
        let mut resolver = MapIncludeResolver::new();
        let (out, files) = run(src, &mut resolver);
        assert_eq!(spellings(&out, &files), vec!["b"]);
    }

    #[test]
    fn defined_operator_reads_macro_table() {
        let src = "#define FOO\n#if defined(FOO) && !defined(BAR)\nyes\n#endif\n";
        let mut resolver = MapIncludeResolver::new();
        let (out, files) = run(src, &mut resolver);
        assert_eq!(spellings(&out, &files), vec!["yes"]);
    }

    #[test]
    fn include_splices_resolved_file_tokens() {
        let mut resolver = MapIncludeResolver::new();
        resolver.add("a.h", "int spliced;\n");
        let (out, files) = run("#include \"a.h\"\n", &mut resolver);
        assert_eq!(spellings(&out, &files), vec!["int", "spliced", ";"]);
    }

    #[test]
    fn unterminated_if_is_an_error() {
        let mut resolver = MapIncludeResolver::new();
        let mut files = SourceMap::new();
        let entry = files.add_file("<test>", cc_lex::prepare_source("#if 1\nx\n"));
        let mut macros = MacroTable::new();
        assert!(preprocess(&mut files, entry, &mut macros, &mut resolver).is_err());
    }
}
