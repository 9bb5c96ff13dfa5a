//! Macro table and body substitution
//!
//! Definitions keep their body as preprocessing tokens carrying the Tokids
//! of the `#define` line. Substitution therefore preserves provenance for
//! free: a token that survives into the expansion still points at the byte
//! of the definition body it came from, while argument tokens point at the
//! invocation site. Stringize and paste results cover no source bytes and
//! are marked synthetic.

use crate::cpp::pltoken::{PpKind, PpTok};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    /// Name token on the `#define` line
    pub name_tok: PpTok,
    /// `Some` for function-like macros
    pub params: Option<Vec<String>>,
    pub variadic: bool,
    pub body: Vec<PpTok>,
}

impl MacroDef {
    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }

    /// C-level compatibility of two definitions: same kind, same parameter
    /// list, same significant body spelling.
    pub fn same_definition(&self, other: &MacroDef) -> bool {
        if self.params != other.params || self.variadic != other.variadic {
            return false;
        }
        let sig = |body: &[PpTok]| -> Vec<String> {
            body.iter()
                .filter(|t| !t.is_space())
                .map(|t| t.spelling.clone())
                .collect()
        };
        sig(&self.body) == sig(&other.body)
    }
}

/// The macro binding table for the compilation in progress.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    map: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.map.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Bind a definition, returning the previous one if any.
    pub fn define(&mut self, def: MacroDef) -> Option<MacroDef> {
        self.map.insert(def.name.clone(), def)
    }

    pub fn undef(&mut self, name: &str) -> Option<MacroDef> {
        self.map.remove(name)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Substitute arguments into a function-like macro body, handling `#`
/// stringizing and `##` pasting. `raw` holds arguments as written,
/// `expanded` the fully macro-expanded forms used for plain substitution.
pub fn substitute(
    def: &MacroDef,
    raw: &HashMap<String, Vec<PpTok>>,
    expanded: &HashMap<String, Vec<PpTok>>,
) -> Vec<PpTok> {
    let mut out: Vec<PpTok> = Vec::new();
    let body: Vec<&PpTok> = def.body.iter().filter(|t| !t.is_space()).collect();
    let mut i = 0;

    while i < body.len() {
        let t = body[i];

        // Stringize: # param
        if t.is_punct("#") {
            if let Some(next) = body.get(i + 1) {
                if let Some(arg) = raw.get(&next.spelling) {
                    out.push(stringize(arg, t.tokid));
                    i += 2;
                    continue;
                }
            }
            out.push(t.clone());
            i += 1;
            continue;
        }

        // Paste: operand ## operand
        if body.get(i + 1).is_some_and(|n| n.is_punct("##")) && i + 2 < body.len() {
            let left = last_of_operand(t, raw);
            let right = first_of_operand(body[i + 2], raw);
            let mut pasted = match (left, right) {
                (Some(l), Some(r)) => {
                    let spelling = format!("{}{}", l.spelling, r.spelling);
                    let kind = classify_pasted(&spelling);
                    vec![PpTok::synthetic(kind, spelling, l.tokid)]
                }
                (Some(l), None) => vec![l.clone()],
                (None, Some(r)) => vec![r.clone()],
                (None, None) => vec![],
            };
            // Tokens of multi-token operands around the paste point survive
            if let Some(arg) = raw.get(&t.spelling) {
                let sig: Vec<&PpTok> = arg.iter().filter(|a| !a.is_space()).collect();
                for a in sig.iter().take(sig.len().saturating_sub(1)) {
                    out.push((*a).clone());
                }
            }
            out.append(&mut pasted);
            if let Some(arg) = raw.get(&body[i + 2].spelling) {
                let sig: Vec<&PpTok> = arg.iter().filter(|a| !a.is_space()).collect();
                for a in sig.iter().skip(1) {
                    out.push((*a).clone());
                }
            }
            i += 3;
            continue;
        }

        // Plain parameter: splice the expanded argument
        if let Some(arg) = expanded.get(&t.spelling) {
            out.extend(arg.iter().filter(|a| !a.is_space()).cloned());
            i += 1;
            continue;
        }

        out.push(t.clone());
        i += 1;
    }
    out
}

/// Build the string literal for a `#`-stringized argument.
fn stringize(arg: &[PpTok], provenance: crate::source::tokid::Tokid) -> PpTok {
    let mut inner = String::new();
    let mut last_space = true;
    for t in arg {
        if t.is_space() {
            if !last_space {
                inner.push(' ');
            }
            last_space = true;
            continue;
        }
        last_space = false;
        if matches!(t.kind, PpKind::StrLit | PpKind::CharLit) {
            for c in t.spelling.chars() {
                if c == '"' || c == '\\' {
                    inner.push('\\');
                }
                inner.push(c);
            }
        } else {
            inner.push_str(&t.spelling);
        }
    }
    PpTok::synthetic(PpKind::StrLit, format!("\"{}\"", inner.trim()), provenance)
}

fn last_of_operand<'a>(t: &'a PpTok, raw: &'a HashMap<String, Vec<PpTok>>) -> Option<&'a PpTok> {
    match raw.get(&t.spelling) {
        Some(arg) => arg.iter().filter(|a| !a.is_space()).last(),
        None => Some(t),
    }
}

fn first_of_operand<'a>(t: &'a PpTok, raw: &'a HashMap<String, Vec<PpTok>>) -> Option<&'a PpTok> {
    match raw.get(&t.spelling) {
        Some(arg) => arg.iter().find(|a| !a.is_space()),
        None => Some(t),
    }
}

fn classify_pasted(spelling: &str) -> PpKind {
    let mut chars = spelling.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => PpKind::Number,
        Some(c) if c.is_ascii_alphabetic() || c == '_' => PpKind::Ident,
        _ => PpKind::Punct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fileid::FileId;
    use crate::source::tokid::Tokid;

    fn tok(kind: PpKind, s: &str, off: u64) -> PpTok {
        PpTok {
            kind,
            spelling: s.to_string(),
            tokid: Tokid::new(FileId(0), off),
            len: s.len() as u32,
        }
    }

    fn def(params: &[&str], body: Vec<PpTok>) -> MacroDef {
        MacroDef {
            name: "M".into(),
            name_tok: tok(PpKind::Ident, "M", 8),
            params: Some(params.iter().map(|s| s.to_string()).collect()),
            variadic: false,
            body,
        }
    }

    #[test]
    fn plain_parameter_substitution_keeps_argument_tokids() {
        let d = def(
            &["x"],
            vec![tok(PpKind::Ident, "f", 20), tok(PpKind::Ident, "x", 22)],
        );
        let arg = vec![tok(PpKind::Ident, "value", 100)];
        let mut raw = HashMap::new();
        raw.insert("x".to_string(), arg.clone());
        let out = substitute(&d, &raw, &raw);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].spelling, "f");
        assert_eq!(out[0].tokid.offset, 20); // body provenance
        assert_eq!(out[1].spelling, "value");
        assert_eq!(out[1].tokid.offset, 100); // invocation provenance
    }

    #[test]
    fn stringize_produces_synthetic_string() {
        let d = def(
            &["x"],
            vec![tok(PpKind::Punct, "#", 20), tok(PpKind::Ident, "x", 21)],
        );
        let mut raw = HashMap::new();
        raw.insert(
            "x".to_string(),
            vec![
                tok(PpKind::Ident, "a", 50),
                tok(PpKind::Space, " ", 51),
                tok(PpKind::Punct, "+", 52),
                tok(PpKind::Space, " ", 53),
                tok(PpKind::Ident, "b", 54),
            ],
        );
        let out = substitute(&d, &raw, &raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].spelling, "\"a + b\"");
        assert_eq!(out[0].kind, PpKind::StrLit);
        assert_eq!(out[0].len, 0); // synthetic
    }

    #[test]
    fn paste_joins_operands_into_synthetic_token() {
        let d = def(
            &["a", "b"],
            vec![
                tok(PpKind::Ident, "a", 20),
                tok(PpKind::Punct, "##", 22),
                tok(PpKind::Ident, "b", 25),
            ],
        );
        let mut raw = HashMap::new();
        raw.insert("a".to_string(), vec![tok(PpKind::Ident, "foo", 50)]);
        raw.insert("b".to_string(), vec![tok(PpKind::Number, "2", 60)]);
        let out = substitute(&d, &raw, &raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].spelling, "foo2");
        assert_eq!(out[0].kind, PpKind::Ident);
        assert!(!out[0].clean());
    }

    #[test]
    fn redefinition_compatibility_ignores_whitespace() {
        let a = def(&["x"], vec![tok(PpKind::Ident, "x", 20)]);
        let b = def(
            &["x"],
            vec![tok(PpKind::Space, "  ", 19), tok(PpKind::Ident, "x", 21)],
        );
        assert!(a.same_definition(&b));
        let c = def(&["x"], vec![tok(PpKind::Number, "1", 20)]);
        assert!(!a.same_definition(&c));
    }
}
