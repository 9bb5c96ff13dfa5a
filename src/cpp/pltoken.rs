//! Preprocessing-token lexer
//!
//! Turns the character stream into preprocessing tokens, each tagged with
//! the Tokid of its first character and its raw byte length. For a token
//! untouched by trigraphs or line splices, the byte range
//! `[tokid, tokid + len)` of the source file spells the token exactly;
//! tokens where that contract cannot hold report `clean() == false` and are
//! kept out of the equivalence-class map. Whitespace, comments (as a single
//! space), and newlines are preserved for the macro layer.

use crate::source::fchar::Fchar;
use crate::source::tokid::Tokid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpKind {
    Ident,
    Number,
    CharLit,
    StrLit,
    HeaderName,
    Punct,
    Newline,
    Space,
    Other,
}

/// One preprocessing token with provenance.
#[derive(Debug, Clone)]
pub struct PpTok {
    pub kind: PpKind,
    /// Spelling as decoded (quotes included for literals)
    pub spelling: String,
    /// Tokid of the first character
    pub tokid: Tokid,
    /// Raw source byte length; 0 for synthetic tokens built by the macro
    /// engine
    pub len: u32,
}

impl PpTok {
    /// A token manufactured during expansion (paste/stringize results);
    /// carries provenance but covers no source bytes.
    pub fn synthetic(kind: PpKind, spelling: String, provenance: Tokid) -> Self {
        Self {
            kind,
            spelling,
            tokid: provenance,
            len: 0,
        }
    }

    /// True when the source bytes `[tokid, tokid+len)` spell this token.
    pub fn clean(&self) -> bool {
        self.len > 0 && self.len as usize == self.spelling.len()
    }

    pub fn is_space(&self) -> bool {
        matches!(self.kind, PpKind::Space)
    }

    pub fn is_ident(&self, s: &str) -> bool {
        self.kind == PpKind::Ident && self.spelling == s
    }

    pub fn is_punct(&self, s: &str) -> bool {
        self.kind == PpKind::Punct && self.spelling == s
    }
}

/// Lexer result: the token plus an optional recoverable complaint.
pub struct LexOutput {
    pub tok: PpTok,
    pub error: Option<String>,
}

impl LexOutput {
    fn ok(tok: PpTok) -> Self {
        Self { tok, error: None }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Lex one preprocessing token from the current frame. `None` means the
/// frame is exhausted.
pub fn lex(src: &mut Fchar) -> Option<LexOutput> {
    let first = src.peek(0)?;
    let start = first.tokid;
    let c = first.ch;

    // Newline is its own token; the directive layer is line-oriented.
    if c == '\n' {
        let d = src.next().unwrap();
        return Some(LexOutput::ok(PpTok {
            kind: PpKind::Newline,
            spelling: "\n".into(),
            tokid: start,
            len: d.width,
        }));
    }

    if c.is_whitespace() {
        let mut spelling = String::new();
        let mut len = 0u32;
        while let Some(d) = src.peek(0) {
            if d.ch == '\n' || !d.ch.is_whitespace() {
                break;
            }
            src.next();
            spelling.push(d.ch);
            len += d.width;
        }
        return Some(LexOutput::ok(PpTok {
            kind: PpKind::Space,
            spelling,
            tokid: start,
            len,
        }));
    }

    // Comments read as a single space
    if c == '/' {
        match src.peek(1).map(|d| d.ch) {
            Some('*') => return Some(lex_block_comment(src, start)),
            Some('/') => {
                let mut len = 0u32;
                while let Some(d) = src.peek(0) {
                    if d.ch == '\n' {
                        break;
                    }
                    src.next();
                    len += d.width;
                }
                return Some(LexOutput::ok(PpTok {
                    kind: PpKind::Space,
                    spelling: " ".into(),
                    tokid: start,
                    len,
                }));
            }
            _ => {}
        }
    }

    // Wide literal prefix
    if c == 'L' {
        if let Some(q) = src.peek(1).map(|d| d.ch) {
            if q == '"' || q == '\'' {
                return Some(lex_quoted(src, start, q, true));
            }
        }
    }

    if is_ident_start(c) {
        let mut spelling = String::new();
        let mut len = 0u32;
        while let Some(d) = src.peek(0) {
            if !is_ident_cont(d.ch) {
                break;
            }
            src.next();
            spelling.push(d.ch);
            len += d.width;
        }
        return Some(LexOutput::ok(PpTok {
            kind: PpKind::Ident,
            spelling,
            tokid: start,
            len,
        }));
    }

    if c.is_ascii_digit() || (c == '.' && src.peek(1).is_some_and(|d| d.ch.is_ascii_digit())) {
        return Some(lex_pp_number(src, start));
    }

    if c == '"' || c == '\'' {
        return Some(lex_quoted(src, start, c, false));
    }

    if let Some(out) = lex_punct(src, start) {
        return Some(out);
    }

    let d = src.next().unwrap();
    Some(LexOutput::ok(PpTok {
        kind: PpKind::Other,
        spelling: d.ch.to_string(),
        tokid: start,
        len: d.width,
    }))
}

fn lex_block_comment(src: &mut Fchar, start: Tokid) -> LexOutput {
    let mut len = 0u32;
    // Consume "/*"
    for _ in 0..2 {
        len += src.next().unwrap().width;
    }
    let mut prev = '\0';
    loop {
        match src.next() {
            Some(d) => {
                len += d.width;
                if prev == '*' && d.ch == '/' {
                    return LexOutput::ok(PpTok {
                        kind: PpKind::Space,
                        spelling: " ".into(),
                        tokid: start,
                        len,
                    });
                }
                prev = d.ch;
            }
            None => {
                return LexOutput {
                    tok: PpTok {
                        kind: PpKind::Space,
                        spelling: " ".into(),
                        tokid: start,
                        len,
                    },
                    error: Some("unterminated comment".into()),
                }
            }
        }
    }
}

fn lex_pp_number(src: &mut Fchar, start: Tokid) -> LexOutput {
    let mut spelling = String::new();
    let mut len = 0u32;
    while let Some(d) = src.peek(0) {
        let c = d.ch;
        let take = is_ident_cont(c)
            || c == '.'
            || ((c == '+' || c == '-')
                && matches!(spelling.chars().last(), Some('e' | 'E' | 'p' | 'P')));
        if !take {
            break;
        }
        src.next();
        spelling.push(c);
        len += d.width;
    }
    LexOutput::ok(PpTok {
        kind: PpKind::Number,
        spelling,
        tokid: start,
        len,
    })
}

fn lex_quoted(src: &mut Fchar, start: Tokid, quote: char, wide: bool) -> LexOutput {
    let kind = if quote == '"' {
        PpKind::StrLit
    } else {
        PpKind::CharLit
    };
    let mut spelling = String::new();
    let mut len = 0u32;
    if wide {
        let d = src.next().unwrap();
        spelling.push(d.ch);
        len += d.width;
    }
    let d = src.next().unwrap();
    spelling.push(d.ch);
    len += d.width;

    loop {
        match src.peek(0) {
            Some(d) if d.ch == '\n' => {
                return LexOutput {
                    tok: PpTok {
                        kind,
                        spelling,
                        tokid: start,
                        len,
                    },
                    error: Some(format!("missing closing {quote}")),
                };
            }
            Some(d) => {
                src.next();
                spelling.push(d.ch);
                len += d.width;
                if d.ch == '\\' {
                    if let Some(esc) = src.next() {
                        spelling.push(esc.ch);
                        len += esc.width;
                    }
                    continue;
                }
                if d.ch == quote {
                    return LexOutput::ok(PpTok {
                        kind,
                        spelling,
                        tokid: start,
                        len,
                    });
                }
            }
            None => {
                return LexOutput {
                    tok: PpTok {
                        kind,
                        spelling,
                        tokid: start,
                        len,
                    },
                    error: Some(format!("missing closing {quote}")),
                };
            }
        }
    }
}

const PUNCT3: [&str; 3] = ["<<=", ">>=", "..."];
const PUNCT2: [&str; 19] = [
    "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=", "*=", "/=",
    "%=", "&=", "^=", "|=",
];
const PUNCT1: &str = "[](){}.&*+-~!/%<>^|?:;=,#";

fn lex_punct(src: &mut Fchar, start: Tokid) -> Option<LexOutput> {
    let c0 = src.peek(0)?.ch;
    let c1 = src.peek(1).map(|d| d.ch).unwrap_or('\0');
    let c2 = src.peek(2).map(|d| d.ch).unwrap_or('\0');

    let three: String = [c0, c1, c2].iter().collect();
    if PUNCT3.contains(&three.as_str()) {
        let mut len = 0;
        for _ in 0..3 {
            len += src.next().unwrap().width;
        }
        return Some(LexOutput::ok(PpTok {
            kind: PpKind::Punct,
            spelling: three,
            tokid: start,
            len,
        }));
    }
    // "##" is lexed as one token for the paste operator
    if c0 == '#' && c1 == '#' {
        let mut len = 0;
        for _ in 0..2 {
            len += src.next().unwrap().width;
        }
        return Some(LexOutput::ok(PpTok {
            kind: PpKind::Punct,
            spelling: "##".into(),
            tokid: start,
            len,
        }));
    }
    let two: String = [c0, c1].iter().collect();
    if PUNCT2.contains(&two.as_str()) {
        let mut len = 0;
        for _ in 0..2 {
            len += src.next().unwrap().width;
        }
        return Some(LexOutput::ok(PpTok {
            kind: PpKind::Punct,
            spelling: two,
            tokid: start,
            len,
        }));
    }
    if PUNCT1.contains(c0) {
        let d = src.next().unwrap();
        return Some(LexOutput::ok(PpTok {
            kind: PpKind::Punct,
            spelling: c0.to_string(),
            tokid: start,
            len: d.width,
        }));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fileid::FileId;

    fn lex_all(text: &str) -> Vec<PpTok> {
        let mut src = Fchar::new();
        src.push(FileId(0), text.as_bytes().to_vec(), false);
        let mut toks = Vec::new();
        while let Some(out) = lex(&mut src) {
            toks.push(out.tok);
        }
        toks
    }

    #[test]
    fn spelling_matches_source_bytes() {
        let text = "int foo_1 = 0x1f + .5e-3; /* c */ \"s\\\"tr\" 'a'\n";
        let toks = lex_all(text);
        for t in &toks {
            if t.clean() {
                let lo = t.tokid.offset as usize;
                let hi = lo + t.len as usize;
                assert_eq!(&text.as_bytes()[lo..hi], t.spelling.as_bytes(), "{t:?}");
            }
        }
    }

    #[test]
    fn classifies_the_basic_kinds() {
        let toks: Vec<_> = lex_all("x 12 'c' \"s\" ->\n")
            .into_iter()
            .filter(|t| !t.is_space())
            .collect();
        let kinds: Vec<PpKind> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PpKind::Ident,
                PpKind::Number,
                PpKind::CharLit,
                PpKind::StrLit,
                PpKind::Punct,
                PpKind::Newline
            ]
        );
        assert_eq!(toks[4].spelling, "->");
    }

    #[test]
    fn punctuators_use_longest_match() {
        let toks: Vec<_> = lex_all("a <<= b << c <= d")
            .into_iter()
            .filter(|t| t.kind == PpKind::Punct)
            .map(|t| t.spelling)
            .collect();
        assert_eq!(toks, vec!["<<=", "<<", "<="]);
    }

    #[test]
    fn comments_become_a_single_space() {
        let toks = lex_all("a/* long\ncomment */b // trailing\nc");
        let sig: Vec<_> = toks
            .iter()
            .filter(|t| !t.is_space() && t.kind != PpKind::Newline)
            .map(|t| t.spelling.clone())
            .collect();
        assert_eq!(sig, vec!["a", "b", "c"]);
        // The block comment space is not clean: its span covers the comment
        let sp = toks.iter().find(|t| t.is_space() && t.len > 1).unwrap();
        assert!(!sp.clean());
    }

    #[test]
    fn spliced_identifier_is_not_clean() {
        let toks = lex_all("fo\\\no = 1");
        let id = &toks[0];
        assert_eq!(id.spelling, "foo");
        assert_eq!(id.len, 5);
        assert!(!id.clean());
    }

    #[test]
    fn unterminated_string_reports_but_yields_token() {
        let mut src = Fchar::new();
        src.push(FileId(0), b"\"abc\nx".to_vec(), false);
        let out = lex(&mut src).unwrap();
        assert_eq!(out.tok.kind, PpKind::StrLit);
        assert!(out.error.is_some());
        // The newline was not consumed
        assert_eq!(lex(&mut src).unwrap().tok.kind, PpKind::Newline);
    }

}
