//! Macro substitution mechanics (§4.4 "Function-like expansion"): argument
//! reading, stringize, paste, and hideset application. The control loop that
//! decides *when* a given identifier gets handed to this module lives in
//! [`crate::directive`], which must interleave directive processing with
//! expansion so `#define`/`#undef` visibility stays strictly sequential.

use crate::builtin;
use crate::macro_table::{Macro, MacroTable};
use cc_base::{ErrorKind, Result, SourceMap, SpannedError, Span};
use cc_lex::{HideSet, Token, TokenKind};
use std::collections::VecDeque;

fn err(span: Span, msg: impl Into<String>) -> SpannedError {
    SpannedError::new(ErrorKind::Preprocess, msg.into(), span)
}

/// Fully macro-expands a directive-free token list (a macro argument, or an
/// `#if`/`#elif` expression) to a fixed point.
pub fn expand_tokens(input: Vec<Token>, macros: &mut MacroTable, files: &mut SourceMap) -> Result<Vec<Token>> {
    let mut queue: VecDeque<Token> = input.into();
    let mut out = Vec::new();
    while let Some(tok) = queue.pop_front() {
        if tok.is_eof() || !tok.is_ident() {
            out.push(tok);
            continue;
        }
        match try_expand_one(&tok, &mut queue, macros, files)? {
            Some(replacement) => prepend(&mut queue, replacement),
            None => out.push(tok),
        }
    }
    Ok(out)
}

/// Attempts to expand the macro invocation starting at `tok`, consuming
/// further tokens from `queue` for a function-like invocation's argument
/// list. Returns `None` (consuming nothing) when `tok` does not name an
/// active, unhidden macro, or names a function-like macro not actually
/// invoked here (no `(` follows).
pub fn try_expand_one(
    tok: &Token,
    queue: &mut VecDeque<Token>,
    macros: &mut MacroTable,
    files: &mut SourceMap,
) -> Result<Option<Vec<Token>>> {
    let name = tok.text_in(files).to_string();
    if tok.hideset.contains(&name) {
        return Ok(None);
    }
    let Some(m) = macros.get(&name).cloned() else {
        return Ok(None);
    };
    if let Some(kind) = m.builtin {
        return Ok(Some(vec![builtin::expand_builtin(kind, tok, files)]));
    }
    if m.is_objlike {
        let hs = tok.hideset.inserted(&name);
        let mut body = m.body.clone();
        apply_hideset(&mut body, &hs);
        return Ok(Some(body));
    }
    if !queue.front().is_some_and(|t| t.is_in("(", files)) {
        return Ok(None);
    }
    queue.pop_front();
    let (args_raw, close) = read_args(queue, &m, tok.span, files)?;
    let mut args_expanded = Vec::with_capacity(args_raw.len());
    for a in &args_raw {
        args_expanded.push(expand_tokens(a.clone(), macros, files)?);
    }
    let hs = tok.hideset.intersection(&close.hideset).inserted(&name);
    let mut result = subst(&m, &args_raw, &args_expanded, files)?;
    apply_hideset(&mut result, &hs);
    Ok(Some(result))
}

fn prepend(queue: &mut VecDeque<Token>, toks: Vec<Token>) {
    for t in toks.into_iter().rev() {
        queue.push_front(t);
    }
}

fn apply_hideset(toks: &mut [Token], hs: &HideSet) {
    for t in toks.iter_mut() {
        t.hideset = t.hideset.union(hs);
    }
}

/// Reads the parenthesized, comma-separated argument list following a
/// function-like macro's already-consumed `(`. One token slice per formal
/// parameter; a variadic macro's trailing actuals (including their
/// separating commas) are joined into one final slot bound to
/// `__VA_ARGS__`, defaulting to empty when none are given.
fn read_args(queue: &mut VecDeque<Token>, m: &Macro, open_span: Span, files: &SourceMap) -> Result<(Vec<Vec<Token>>, Token)> {
    let mut args: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth = 0i32;
    let close = loop {
        let Some(t) = queue.pop_front() else {
            return Err(err(open_span, format!("unterminated argument list for macro `{}`", m.name)));
        };
        if t.is_eof() {
            return Err(err(open_span, format!("unterminated argument list for macro `{}`", m.name)));
        }
        if t.is_in("(", files) {
            depth += 1;
            args.last_mut().unwrap().push(t);
            continue;
        }
        if t.is_in(")", files) {
            if depth == 0 {
                break t;
            }
            depth -= 1;
            args.last_mut().unwrap().push(t);
            continue;
        }
        if depth == 0 && t.is_in(",", files) {
            let in_variadic_tail = m.is_variadic && args.len() > m.params.len();
            if in_variadic_tail {
                args.last_mut().unwrap().push(t);
            } else {
                args.push(Vec::new());
            }
            continue;
        }
        args.last_mut().unwrap().push(t);
    };
    // `F()` for a zero-parameter, non-variadic `F` reads as zero arguments,
    // not one empty argument.
    if m.params.is_empty() && !m.is_variadic && args.len() == 1 && args[0].is_empty() {
        args.clear();
    }
    if m.is_variadic {
        if args.len() < m.params.len() {
            return Err(err(open_span, format!("too few arguments to macro `{}`", m.name)));
        }
        if args.len() == m.params.len() {
            args.push(Vec::new());
        }
    } else if args.len() != m.params.len() {
        return Err(err(
            open_span,
            format!("macro `{}` expects {} argument(s), got {}", m.name, m.params.len(), args.len()),
        ));
    }
    Ok((args, close))
}

enum Chunk {
    Plain(Token),
    /// Already-resolved raw tokens glued by one or more `##`.
    Pasted(Vec<Token>),
}

/// Substitutes a function-like macro's body against its (already-read)
/// arguments: `#` stringizes, `##` pastes using each operand's raw
/// (unexpanded) tokens, and every other parameter reference uses the fully
/// macro-expanded argument.
fn subst(m: &Macro, args_raw: &[Vec<Token>], args_expanded: &[Vec<Token>], files: &mut SourceMap) -> Result<Vec<Token>> {
    let body = &m.body;
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let t = &body[i];
        if t.is_in("#", files) {
            let next = body.get(i + 1).ok_or_else(|| err(t.span, "'#' is not followed by a macro parameter"))?;
            let idx = param_index(m, next, files).ok_or_else(|| err(t.span, "'#' is not followed by a macro parameter"))?;
            chunks.push(Chunk::Pasted(vec![stringize(&args_raw[idx], files)]));
            i += 2;
            continue;
        }
        if body.get(i + 1).is_some_and(|n| n.is_in("##", files)) {
            let mut toks = token_or_arg(m, t, args_raw, files);
            let mut j = i + 1;
            while body.get(j).is_some_and(|n| n.is_in("##", files)) {
                let rhs = body.get(j + 1).ok_or_else(|| err(body[j].span, "'##' cannot appear at the end of a macro body"))?;
                let rhs_toks = token_or_arg(m, rhs, args_raw, files);
                toks = paste_join(toks, rhs_toks, files)?;
                j += 2;
            }
            chunks.push(Chunk::Pasted(toks));
            i = j;
            continue;
        }
        chunks.push(Chunk::Plain(t.clone()));
        i += 1;
    }
    let mut out = Vec::new();
    for c in chunks {
        match c {
            Chunk::Pasted(toks) => out.extend(toks),
            Chunk::Plain(t) => match param_index(m, &t, files) {
                Some(idx) => out.extend(args_expanded[idx].iter().cloned()),
                None => out.push(t),
            },
        }
    }
    Ok(out)
}

fn param_index(m: &Macro, t: &Token, files: &SourceMap) -> Option<usize> {
    if !t.is_ident() {
        return None;
    }
    let text = t.text_in(files);
    if m.is_variadic && text == "__VA_ARGS__" {
        return Some(m.params.len());
    }
    m.params.iter().position(|p| p == text)
}

fn token_or_arg(m: &Macro, t: &Token, args_raw: &[Vec<Token>], files: &SourceMap) -> Vec<Token> {
    match param_index(m, t, files) {
        Some(idx) => args_raw[idx].clone(),
        None => vec![t.clone()],
    }
}

/// Joins two raw-token operands of a `##` chain. Per §4.4: if either side is
/// an empty variadic argument, the result is the other side unchanged.
fn paste_join(lhs: Vec<Token>, rhs: Vec<Token>, files: &mut SourceMap) -> Result<Vec<Token>> {
    if lhs.is_empty() {
        return Ok(rhs);
    }
    if rhs.is_empty() {
        return Ok(lhs);
    }
    let mut lhs = lhs;
    let last = lhs.pop().unwrap();
    let merged = paste(&last, &rhs[0], files)?;
    lhs.push(merged);
    lhs.extend(rhs[1..].iter().cloned());
    Ok(lhs)
}

/// Concatenates two tokens' literal source slices and re-tokenizes the
/// result, requiring exactly one resulting token (§4.4 "paste").
fn paste(lhs: &Token, rhs: &Token, files: &mut SourceMap) -> Result<Token> {
    let joined = format!("{}{}", lhs.text_in(files), rhs.text_in(files));
    let file = files.add_file("<paste>", format!("{joined}\n\0"));
    let toks = cc_lex::tokenize(file, files.contents(file))
        .map_err(|_| err(lhs.span, format!("'##' produced an invalid token: `{joined}`")))?;
    let real: Vec<_> = toks.into_iter().filter(|t| !t.is_eof()).collect();
    if real.len() != 1 {
        return Err(err(lhs.span, format!("'##' produced an invalid token: `{joined}`")));
    }
    let mut tok = real.into_iter().next().unwrap();
    tok.hideset = lhs.hideset.intersection(&rhs.hideset);
    Ok(tok)
}

/// Stringizes unexpanded argument tokens into one string-literal token
/// (§4.4 "stringize"): single spaces where `has_space` separated the
/// originals, with embedded `"`/`\` backslash-escaped.
fn stringize(arg: &[Token], files: &mut SourceMap) -> Token {
    let mut s = String::new();
    for (i, t) in arg.iter().enumerate() {
        if i > 0 && t.has_space {
            s.push(' ');
        }
        let spelling = t.text_in(files);
        if matches!(t.kind, TokenKind::Str { .. }) {
            for c in spelling.chars() {
                if c == '"' || c == '\\' {
                    s.push('\\');
                }
                s.push(c);
            }
        } else {
            s.push_str(spelling);
        }
    }
    let quoted = format!("\"{s}\"");
    let file = files.add_file("<stringize>", format!("{quoted}\n\0"));
    let span = Span::new(file, 0, quoted.len() as u32);
    Token {
        kind: TokenKind::Str { bytes: s.into_bytes(), elem_size: 1 },
        span,
        line_no: 1,
        at_bol: false,
        has_space: true,
        is_first_of_file: false,
        hideset: HideSet::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tokenizes `src` with its trailing `Eof` sentinel dropped, so the
    /// result is safe to use either as an expansion target or as a macro
    /// body (a body must never itself contain an `Eof`).
    fn toks(src: &str, files: &mut SourceMap) -> Vec<Token> {
        let prepared = cc_lex::prepare_source(src);
        let file = files.add_file("<test>", prepared);
        let mut t = cc_lex::tokenize(file, files.contents(file)).unwrap();
        t.retain(|tok| !tok.is_eof());
        t
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
    fn objlike_macro_expands_in_place() {
        let mut files = SourceMap::new();
        let mut macros = MacroTable::new();
        macros.define_objlike("N", toks("42", &mut files));
        let input = toks("N + 1", &mut files);
        let out = expand_tokens(input, &mut macros, &mut files).unwrap();
        assert_eq!(spellings(&out, &files), vec!["42", "+", "1"]);
    }

    #[test]
    fn funclike_macro_substitutes_expanded_args() {
        let mut files = SourceMap::new();
        let mut macros = MacroTable::new();
        macros.define_funclike("ADD", vec!["a".into(), "b".into()], false, toks("(a) + (b)", &mut files));
        let input = toks("ADD(1, 2)", &mut files);
        let out = expand_tokens(input, &mut macros, &mut files).unwrap();
        assert_eq!(spellings(&out, &files), vec!["(", "1", ")", "+", "(", "2", ")"]);
    }

    #[test]
    fn recursive_macro_expands_exactly_once() {
        let mut files = SourceMap::new();
        let mut macros = MacroTable::new();
        macros.define_objlike("T", toks("T", &mut files));
        let input = toks("T", &mut files);
        let out = expand_tokens(input, &mut macros, &mut files).unwrap();
        assert_eq!(spellings(&out, &files), vec!["T"]);
    }

    #[test]
    fn stringize_operator_quotes_its_argument() {
        let mut files = SourceMap::new();
        let mut macros = MacroTable::new();
        macros.define_funclike("STR", vec!["x".into()], false, toks("#x", &mut files));
        let input = toks("STR(a + b)", &mut files);
        let out = expand_tokens(input, &mut macros, &mut files).unwrap();
        assert_eq!(spellings(&out, &files), vec!["\"a + b\""]);
    }

    #[test]
    fn paste_operator_glues_adjacent_tokens() {
        let mut files = SourceMap::new();
        let mut macros = MacroTable::new();
        macros.define_funclike("CAT", vec!["a".into(), "b".into()], false, toks("a ## b", &mut files));
        let input = toks("CAT(foo, bar)", &mut files);
        let out = expand_tokens(input, &mut macros, &mut files).unwrap();
        assert_eq!(spellings(&out, &files), vec!["foobar"]);
    }

    #[test]
    fn variadic_macro_binds_va_args() {
        let mut files = SourceMap::new();
        let mut macros = MacroTable::new();
        macros.define_funclike("LOG", vec!["fmt".into()], true, toks("f(fmt, __VA_ARGS__)", &mut files));
        let input = toks("LOG(\"x\", 1, 2)", &mut files);
        let out = expand_tokens(input, &mut macros, &mut files).unwrap();
        assert_eq!(spellings(&out, &files), vec!["f", "(", "\"x\"", ",", "1", ",", "2", ")"]);
    }

    #[test]
    fn uninvoked_funclike_name_passes_through() {
        let mut files = SourceMap::new();
        let mut macros = MacroTable::new();
        macros.define_funclike("F", vec!["a".into()], false, toks("a", &mut files));
        let input = toks("F + 1", &mut files);
        let out = expand_tokens(input, &mut macros, &mut files).unwrap();
        assert_eq!(spellings(&out, &files), vec!["F", "+", "1"]);
    }
}
