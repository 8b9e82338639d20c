//! Built-in dynamic macros and the fixed predefined identifier set (§4.4
//! "Built-in macros").
//!
//! `__FILE__`/`__LINE__` synthesize a fresh token from the invocation site
//! on every expansion; `__DATE__`/`__TIME__` and the target-identity macros
//! are installed once, at preprocessor construction, with a body fixed for
//! the whole compilation.

use crate::macro_table::{BuiltinKind, MacroTable};
use cc_base::{SourceMap, Span};
use cc_lex::{HideSet, IntKind, NumLit, Token, TokenKind};
use std::time::{SystemTime, UNIX_EPOCH};

/// Synthesizes the replacement token for a `__FILE__`/`__LINE__` invocation,
/// registering a tiny synthetic file so the new token's span still resolves
/// correctly if something downstream re-stringizes or pastes it.
pub fn expand_builtin(kind: BuiltinKind, invocation: &Token, files: &mut SourceMap) -> Token {
    match kind {
        BuiltinKind::File => {
            let name = files.name(invocation.span.file).to_string();
            str_token(files, "<__FILE__>", &name, invocation)
        }
        BuiltinKind::Line => {
            let n = files.line_number(invocation.span.file, invocation.span.start);
            num_token(files, "<__LINE__>", n as i64, invocation)
        }
    }
}

fn str_token(files: &mut SourceMap, tag: &str, content: &str, invocation: &Token) -> Token {
    let spelling = format!("\"{}\"", content.replace('\\', "\\\\").replace('"', "\\\""));
    let file = files.add_file(tag, format!("{spelling}\n\0"));
    Token {
        kind: TokenKind::Str { bytes: content.as_bytes().to_vec(), elem_size: 1 },
        span: Span::new(file, 0, spelling.len() as u32),
        line_no: invocation.line_no,
        at_bol: false,
        has_space: invocation.has_space,
        is_first_of_file: false,
        hideset: invocation.hideset.clone(),
    }
}

fn num_token(files: &mut SourceMap, tag: &str, value: i64, invocation: &Token) -> Token {
    let spelling = value.to_string();
    let file = files.add_file(tag, format!("{spelling}\n\0"));
    Token {
        kind: TokenKind::Num(NumLit::Int { value: value as u64, kind: IntKind::Int }),
        span: Span::new(file, 0, spelling.len() as u32),
        line_no: invocation.line_no,
        at_bol: false,
        has_space: invocation.has_space,
        is_first_of_file: false,
        hideset: invocation.hideset.clone(),
    }
}

/// Installs the fixed predefined-macro set, `__DATE__`/`__TIME__` (computed
/// once, from wall-clock time at preprocessor construction), and registers
/// `__FILE__`/`__LINE__` as per-invocation builtins.
pub fn install_predefined(macros: &mut MacroTable, files: &mut SourceMap) {
    macros.define_builtin("__FILE__", BuiltinKind::File);
    macros.define_builtin("__LINE__", BuiltinKind::Line);

    let (date, time) = current_date_time();
    define_str(macros, files, "__DATE__", &date);
    define_str(macros, files, "__TIME__", &time);

    define_num(macros, files, "__STDC__", 1);
    define_num(macros, files, "__STDC_VERSION__", 201112);
    define_num(macros, files, "__STDC_HOSTED__", 1);
    define_num(macros, files, "__x86_64__", 1);
    define_num(macros, files, "__linux__", 1);
    define_num(macros, files, "__ELF__", 1);
    define_num(macros, files, "__SIZEOF_INT__", 4);
    define_num(macros, files, "__SIZEOF_LONG__", 8);
    define_num(macros, files, "__SIZEOF_POINTER__", 8);
    define_num(macros, files, "__CHAR_BIT__", 8);
}

fn define_num(macros: &mut MacroTable, files: &mut SourceMap, name: &str, value: i64) {
    let spelling = value.to_string();
    let file = files.add_file(format!("<{name}>"), format!("{spelling}\n\0"));
    let tok = Token {
        kind: TokenKind::Num(NumLit::Int { value: value as u64, kind: IntKind::Int }),
        span: Span::new(file, 0, spelling.len() as u32),
        line_no: 1,
        at_bol: false,
        has_space: true,
        is_first_of_file: false,
        hideset: HideSet::empty(),
    };
    macros.define_objlike(name, vec![tok]);
}

fn define_str(macros: &mut MacroTable, files: &mut SourceMap, name: &str, content: &str) {
    let spelling = format!("\"{content}\"");
    let file = files.add_file(format!("<{name}>"), format!("{spelling}\n\0"));
    let tok = Token {
        kind: TokenKind::Str { bytes: content.as_bytes().to_vec(), elem_size: 1 },
        span: Span::new(file, 0, spelling.len() as u32),
        line_no: 1,
        at_bol: false,
        has_space: true,
        is_first_of_file: false,
        hideset: HideSet::empty(),
    };
    macros.define_objlike(name, vec![tok]);
}

const MONTHS: [&str; 12] = ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

/// Formats the current UTC wall-clock time as C's `"Mmm dd yyyy"` /
/// `"hh:mm:ss"`. No calendar crate is pulled in for two fields used once per
/// compilation; `civil_from_days` is Howard Hinnant's days-since-epoch
/// conversion.
fn current_date_time() -> (String, String) {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0) as i64;
    let days = secs.div_euclid(86400);
    let secs_of_day = secs.rem_euclid(86400);
    let (y, m, d) = civil_from_days(days);
    let hh = secs_of_day / 3600;
    let mm = (secs_of_day % 3600) / 60;
    let ss = secs_of_day % 60;
    let date = format!("{} {:2} {}", MONTHS[(m - 1) as usize], d, y);
    let time = format!("{hh:02}:{mm:02}:{ss:02}");
    (date, time)
}

/// <https://howardhinnant.github.io/date_algorithms.html>
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_matches_known_epoch_date() {
        // 2000-03-01 is exactly 11017 days after 1970-01-01.
        assert_eq!(civil_from_days(11017), (2000, 3, 1));
    }

    #[test]
    fn predefined_macros_cover_target_identity() {
        let mut macros = MacroTable::new();
        let mut files = SourceMap::new();
        install_predefined(&mut macros, &mut files);
        assert!(macros.is_defined("__STDC__"));
        assert!(macros.is_defined("__x86_64__"));
        assert!(macros.is_defined("__DATE__"));
        assert!(macros.is_defined("__FILE__"));
    }
}
