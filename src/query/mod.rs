//! Query engine
//!
//! Queries are values, not code: compiled once from a parameter map or a
//! string spec, then evaluated pure per candidate. The three variants
//! (identifier, file, function) share the comparison operators, the match
//! modes, and the `is_valid`/`need_eval`/`eval`/`url` surface.

pub mod file;
pub mod fun;
pub mod id;

pub use file::FileQuery;
pub use fun::FunQuery;
pub use id::IdQuery;

use crate::core::error::{Error, Result};
use regex::Regex;

/// Comparison operator for numeric selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CmpOp {
    #[default]
    Ignore,
    Eq,
    Ne,
    Lt,
    Gt,
}

impl CmpOp {
    pub fn from_index(i: usize) -> CmpOp {
        match i {
            1 => CmpOp::Eq,
            2 => CmpOp::Ne,
            3 => CmpOp::Lt,
            4 => CmpOp::Gt,
            _ => CmpOp::Ignore,
        }
    }

    pub fn index(self) -> usize {
        match self {
            CmpOp::Ignore => 0,
            CmpOp::Eq => 1,
            CmpOp::Ne => 2,
            CmpOp::Lt => 3,
            CmpOp::Gt => 4,
        }
    }

    /// Apply the operator; `Ignore` never matches.
    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            CmpOp::Ignore => false,
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Gt => a > b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Ignore => "--",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
        }
    }
}

/// How marked criteria combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Y: any marked criterion holds
    #[default]
    AnyOf,
    /// L: all marked criteria hold
    AllOf,
    /// E: no marked criterion holds
    Exclude,
    /// T: the candidate's properties equal the marked set exactly
    Exact,
}

impl MatchMode {
    pub fn parse(s: &str) -> Result<MatchMode> {
        match s.chars().next() {
            Some('Y') => Ok(MatchMode::AnyOf),
            Some('L') => Ok(MatchMode::AllOf),
            Some('E') => Ok(MatchMode::Exclude),
            Some('T') => Ok(MatchMode::Exact),
            _ => Err(Error::Query {
                message: format!("bad match mode '{s}'"),
            }),
        }
    }

    pub fn letter(self) -> char {
        match self {
            MatchMode::AnyOf => 'Y',
            MatchMode::AllOf => 'L',
            MatchMode::Exclude => 'E',
            MatchMode::Exact => 'T',
        }
    }

    /// Combine a marked-criteria vector under this mode (exact handled by
    /// the caller, which knows the full property set).
    pub fn combine(self, criteria: &[bool]) -> bool {
        match self {
            MatchMode::AnyOf => criteria.is_empty() || criteria.iter().any(|&c| c),
            MatchMode::AllOf => criteria.iter().all(|&c| c),
            MatchMode::Exclude => !criteria.iter().any(|&c| c),
            MatchMode::Exact => criteria.iter().all(|&c| c),
        }
    }
}

/// Compile a user-supplied regex, optionally case-insensitive.
pub fn compile_re(pattern: &str, icase: bool) -> Result<Regex> {
    let p = if icase {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    Regex::new(&p).map_err(|e| Error::Query {
        message: format!("bad regular expression '{pattern}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_op_semantics() {
        assert!(CmpOp::Eq.apply(3.0, 3.0));
        assert!(CmpOp::Ne.apply(3.0, 4.0));
        assert!(CmpOp::Lt.apply(3.0, 4.0));
        assert!(CmpOp::Gt.apply(5.0, 4.0));
        assert!(!CmpOp::Ignore.apply(1.0, 1.0));
        assert_eq!(CmpOp::from_index(3), CmpOp::Lt);
        assert_eq!(CmpOp::Lt.index(), 3);
    }

    #[test]
    fn match_modes_combine() {
        let crit = [true, false];
        assert!(MatchMode::AnyOf.combine(&crit));
        assert!(!MatchMode::AllOf.combine(&crit));
        assert!(!MatchMode::Exclude.combine(&crit));
        assert!(MatchMode::AnyOf.combine(&[]));
        assert!(MatchMode::Exclude.combine(&[]));
    }

    #[test]
    fn bad_regex_is_a_query_error() {
        assert!(compile_re("(", false).is_err());
        assert!(compile_re("FOO", true).unwrap().is_match("foo"));
    }
}
