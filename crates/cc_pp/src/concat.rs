//! Adjacent string-literal concatenation, the preprocessor's final pass
//! (§4.4 "String concatenation").

use cc_lex::{Token, TokenKind};

/// Merges every run of adjacent string-literal tokens into one, splicing
/// their decoded byte contents and widening `elem_size` to the widest
/// literal in the run (so `L"a" "b"` comes out wide).
pub fn concat_adjacent_strings(toks: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(toks.len());
    for t in toks {
        if let TokenKind::Str { bytes, elem_size } = &t.kind {
            if let Some(prev) = out.last_mut() {
                if let TokenKind::Str { bytes: pbytes, elem_size: pelem } = &mut prev.kind {
                    pbytes.extend_from_slice(bytes);
                    *pelem = (*pelem).max(*elem_size);
                    if prev.span.file == t.span.file {
                        prev.span = prev.span.merge(t.span);
                    }
                    continue;
                }
            }
        }
        out.push(t);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_base::SourceMap;

    fn toks(src: &str, files: &mut SourceMap) -> Vec<Token> {
        let prepared = cc_lex::prepare_source(src);
        let file = files.add_file("<test>", prepared);
        let mut t = cc_lex::tokenize(file, files.contents(file)).unwrap();
        t.retain(|tok| !tok.is_eof());
        t
    }

    #[test]
    fn adjacent_strings_merge_into_one_token() {
        let mut files = SourceMap::new();
        let input = toks("\"foo\" \"bar\"", &mut files);
        let out = concat_adjacent_strings(input);
        assert_eq!(out.len(), 1);
        let TokenKind::Str { bytes, .. } = &out[0].kind else { panic!("expected a string token") };
        assert_eq!(bytes, b"foobar");
    }

    #[test]
    fn non_adjacent_strings_stay_separate() {
        let mut files = SourceMap::new();
        let input = toks("\"foo\" + \"bar\"", &mut files);
        let out = concat_adjacent_strings(input);
        assert_eq!(out.len(), 3);
    }
}
