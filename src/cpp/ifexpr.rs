//! Constant-expression evaluation for `#if` and `#elif`
//!
//! Operates on an already macro-expanded token list (with `defined`
//! resolved beforehand). Arithmetic is `i64` with C operator precedence;
//! surviving identifiers evaluate to zero.

use crate::cpp::pltoken::{PpKind, PpTok};

pub type EvalResult<T> = std::result::Result<T, String>;

struct Cursor<'a> {
    toks: Vec<&'a PpTok>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a PpTok> {
        self.toks.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<&'a PpTok> {
        let t = self.peek()?;
        self.pos += 1;
        Some(t)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_punct(p)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

/// Evaluate a controlling expression; nonzero is true.
pub fn eval(toks: &[PpTok]) -> EvalResult<bool> {
    let mut cur = Cursor {
        toks: toks.iter().filter(|t| !t.is_space()).collect(),
        pos: 0,
    };
    if cur.peek().is_none() {
        return Err("empty controlling expression".into());
    }
    let v = conditional(&mut cur)?;
    if cur.peek().is_some() {
        return Err("trailing tokens in controlling expression".into());
    }
    Ok(v != 0)
}

fn conditional(cur: &mut Cursor) -> EvalResult<i64> {
    let cond = binary(cur, 0)?;
    if cur.eat_punct("?") {
        let then = conditional(cur)?;
        if !cur.eat_punct(":") {
            return Err("expected ':' in conditional expression".into());
        }
        let alt = conditional(cur)?;
        return Ok(if cond != 0 { then } else { alt });
    }
    Ok(cond)
}

/// Binary-operator precedence, lowest first.
fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

fn binary(cur: &mut Cursor, min_prec: u8) -> EvalResult<i64> {
    let mut lhs = unary(cur)?;
    loop {
        let op = match cur.peek() {
            Some(t) if t.kind == PpKind::Punct => match precedence(&t.spelling) {
                Some(p) if p >= min_prec => t.spelling.clone(),
                _ => break,
            },
            _ => break,
        };
        cur.bump();
        let prec = precedence(&op).unwrap();
        let rhs = binary(cur, prec + 1)?;
        lhs = apply_binary(&op, lhs, rhs)?;
    }
    Ok(lhs)
}

fn apply_binary(op: &str, a: i64, b: i64) -> EvalResult<i64> {
    Ok(match op {
        "||" => ((a != 0) || (b != 0)) as i64,
        "&&" => ((a != 0) && (b != 0)) as i64,
        "|" => a | b,
        "^" => a ^ b,
        "&" => a & b,
        "==" => (a == b) as i64,
        "!=" => (a != b) as i64,
        "<" => (a < b) as i64,
        ">" => (a > b) as i64,
        "<=" => (a <= b) as i64,
        ">=" => (a >= b) as i64,
        "<<" => a.wrapping_shl(b as u32),
        ">>" => a.wrapping_shr(b as u32),
        "+" => a.wrapping_add(b),
        "-" => a.wrapping_sub(b),
        "*" => a.wrapping_mul(b),
        "/" => {
            if b == 0 {
                return Err("division by zero in controlling expression".into());
            }
            a / b
        }
        "%" => {
            if b == 0 {
                return Err("division by zero in controlling expression".into());
            }
            a % b
        }
        _ => return Err(format!("unexpected operator '{op}'")),
    })
}

fn unary(cur: &mut Cursor) -> EvalResult<i64> {
    let t = cur.peek().ok_or("unexpected end of expression")?;
    if t.kind == PpKind::Punct {
        match t.spelling.as_str() {
            "!" => {
                cur.bump();
                return Ok((unary(cur)? == 0) as i64);
            }
            "~" => {
                cur.bump();
                return Ok(!unary(cur)?);
            }
            "-" => {
                cur.bump();
                return Ok(unary(cur)?.wrapping_neg());
            }
            "+" => {
                cur.bump();
                return unary(cur);
            }
            "(" => {
                cur.bump();
                let v = conditional(cur)?;
                if !cur.eat_punct(")") {
                    return Err("expected ')'".into());
                }
                return Ok(v);
            }
            _ => {}
        }
    }
    primary(cur)
}

fn primary(cur: &mut Cursor) -> EvalResult<i64> {
    let t = cur.bump().ok_or("unexpected end of expression")?;
    match t.kind {
        PpKind::Number => parse_int(&t.spelling),
        PpKind::CharLit => char_value(&t.spelling),
        // Identifiers that survived expansion are not macros
        PpKind::Ident => Ok(0),
        _ => Err(format!("unexpected token '{}'", t.spelling)),
    }
}

fn parse_int(s: &str) -> EvalResult<i64> {
    let trimmed = s.trim_end_matches(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L'));
    let parsed = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else if trimmed.len() > 1 && trimmed.starts_with('0') {
        i64::from_str_radix(&trimmed[1..], 8)
    } else {
        trimmed.parse()
    };
    parsed.map_err(|_| format!("bad integer constant '{s}'"))
}

fn char_value(s: &str) -> EvalResult<i64> {
    // Strip an optional wide prefix and the quotes
    let inner = s.trim_start_matches('L');
    let inner = inner
        .strip_prefix('\'')
        .and_then(|i| i.strip_suffix('\''))
        .ok_or_else(|| format!("bad character constant '{s}'"))?;
    let mut chars = inner.chars();
    let v = match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => b'\n' as i64,
            Some('t') => b'\t' as i64,
            Some('r') => b'\r' as i64,
            Some('0') => 0,
            Some('\\') => b'\\' as i64,
            Some('\'') => b'\'' as i64,
            Some('"') => b'"' as i64,
            Some(c) => c as i64,
            None => return Err(format!("bad character constant '{s}'")),
        },
        Some(c) => c as i64,
        None => return Err(format!("bad character constant '{s}'")),
    };
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fileid::FileId;

    fn toks(text: &str) -> Vec<PpTok> {
        use crate::source::fchar::Fchar;
        let mut src = Fchar::new();
        src.push(FileId(0), text.as_bytes().to_vec(), false);
        let mut out = Vec::new();
        while let Some(lx) = crate::cpp::pltoken::lex(&mut src) {
            out.push(lx.tok);
        }
        out
    }

    fn ev(text: &str) -> bool {
        eval(&toks(text)).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert!(ev("1 + 2 * 3 == 7"));
        assert!(ev("(1 + 2) * 3 == 9"));
        assert!(ev("10 % 3 == 1"));
        assert!(ev("1 << 4 == 16"));
    }

    #[test]
    fn logical_and_conditional() {
        assert!(ev("1 && 2"));
        assert!(!ev("1 && 0"));
        assert!(ev("0 || 3"));
        assert!(ev("1 ? 5 : 0"));
        assert!(!ev("0 ? 5 : 0"));
        assert!(ev("!0"));
    }

    #[test]
    fn bases_suffixes_and_chars() {
        assert!(ev("0x10 == 16"));
        assert!(ev("010 == 8"));
        assert!(ev("1UL == 1"));
        assert!(ev("'A' == 65"));
        assert!(ev("'\\n' == 10"));
    }

    #[test]
    fn unknown_identifiers_are_zero() {
        assert!(!ev("UNDEFINED_THING"));
        assert!(ev("UNDEFINED_THING == 0"));
    }

    #[test]
    fn malformed_expressions_error() {
        assert!(eval(&toks("1 +")).is_err());
        assert!(eval(&toks("(1")).is_err());
        assert!(eval(&toks("")).is_err());
        assert!(eval(&toks("1 / 0")).is_err());
    }
}
