//! C token classification over the post-preprocessing stream

use crate::cpp::pltoken::{PpKind, PpTok};
use crate::source::tokid::Tokid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Auto,
    Break,
    Case,
    Char,
    Const,
    Continue,
    Default,
    Do,
    Double,
    Else,
    Enum,
    Extern,
    Float,
    For,
    Goto,
    If,
    Inline,
    Int,
    Long,
    Register,
    Restrict,
    Return,
    Short,
    Signed,
    Sizeof,
    Static,
    Struct,
    Switch,
    Typedef,
    Union,
    Unsigned,
    Void,
    Volatile,
    While,
}

pub fn keyword(s: &str) -> Option<Keyword> {
    use Keyword::*;
    Some(match s {
        "auto" => Auto,
        "break" => Break,
        "case" => Case,
        "char" => Char,
        "const" => Const,
        "continue" => Continue,
        "default" => Default,
        "do" => Do,
        "double" => Double,
        "else" => Else,
        "enum" => Enum,
        "extern" => Extern,
        "float" => Float,
        "for" => For,
        "goto" => Goto,
        "if" => If,
        "inline" | "__inline" | "__inline__" => Inline,
        "int" => Int,
        "long" => Long,
        "register" => Register,
        "restrict" | "__restrict" | "__restrict__" => Restrict,
        "return" => Return,
        "short" => Short,
        "signed" => Signed,
        "sizeof" => Sizeof,
        "static" => Static,
        "struct" => Struct,
        "switch" => Switch,
        "typedef" => Typedef,
        "union" => Union,
        "unsigned" => Unsigned,
        "void" => Void,
        "volatile" => Volatile,
        "while" => While,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CKind {
    Kw(Keyword),
    Ident,
    Number,
    CharLit,
    StrLit,
    Punct,
    Other,
}

/// One classified C token.
#[derive(Debug, Clone)]
pub struct CTok {
    pub kind: CKind,
    pub spelling: String,
    pub tokid: Tokid,
    pub len: u32,
    /// The token's byte range carries its own equivalence class
    pub ec_ok: bool,
}

impl CTok {
    pub fn from_pp(t: PpTok) -> Self {
        let ec_ok = t.clean();
        let kind = match t.kind {
            PpKind::Ident => match keyword(&t.spelling) {
                Some(k) => CKind::Kw(k),
                None => CKind::Ident,
            },
            PpKind::Number => CKind::Number,
            PpKind::CharLit => CKind::CharLit,
            PpKind::StrLit => CKind::StrLit,
            PpKind::Punct => CKind::Punct,
            _ => CKind::Other,
        };
        Self {
            kind,
            spelling: t.spelling,
            tokid: t.tokid,
            len: t.len,
            ec_ok,
        }
    }

    pub fn is_kw(&self, k: Keyword) -> bool {
        self.kind == CKind::Kw(k)
    }

    pub fn is_punct(&self, s: &str) -> bool {
        self.kind == CKind::Punct && self.spelling == s
    }

    pub fn is_ident(&self) -> bool {
        self.kind == CKind::Ident
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fileid::FileId;

    fn pp(kind: PpKind, s: &str) -> PpTok {
        PpTok {
            kind,
            spelling: s.to_string(),
            tokid: Tokid::new(FileId(0), 0),
            len: s.len() as u32,
        }
    }

    #[test]
    fn keywords_are_not_identifiers() {
        let t = CTok::from_pp(pp(PpKind::Ident, "while"));
        assert!(t.is_kw(Keyword::While));
        assert!(!t.is_ident());
        let t = CTok::from_pp(pp(PpKind::Ident, "whilex"));
        assert!(t.is_ident());
    }

    #[test]
    fn synthetic_tokens_do_not_carry_classes() {
        let mut p = pp(PpKind::Ident, "pasted");
        p.len = 0;
        assert!(!CTok::from_pp(p).ec_ok);
    }
}
