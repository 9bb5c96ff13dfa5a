//! Attribute bitsets and the project registry
//!
//! The first [`ATTR_BASE`] bit positions are fixed; positions from
//! `ATTR_BASE` upward are project identifiers, allocated in the order the
//! workspace file names projects. Selecting a project that was not seen
//! before widens the global attribute count, and every bitset grows lazily
//! to match.

use std::collections::HashMap;

pub const ATTR_READONLY: usize = 0;
pub const ATTR_IDENTIFIER: usize = 1;
pub const ATTR_MACRO: usize = 2;
pub const ATTR_MACROARG: usize = 3;
pub const ATTR_FUNCTION: usize = 4;
pub const ATTR_ORDINARY: usize = 5;
pub const ATTR_SUETAG: usize = 6;
pub const ATTR_MEMBER: usize = 7;
pub const ATTR_LABEL: usize = 8;
pub const ATTR_TYPEDEF: usize = 9;
/// Compilation-unit scope (static linkage)
pub const ATTR_CSCOPE: usize = 10;
/// Linkage-unit scope (visible project-wide)
pub const ATTR_LSCOPE: usize = 11;

/// Number of fixed attribute positions; project bits start here.
pub const ATTR_BASE: usize = 12;

/// Attributes compared under the exact-match query mode: the identifier
/// namespace classes and scopes, not the readonly/identifier/function
/// markers.
pub const ATTR_EXACT: [usize; 9] = [
    ATTR_MACRO,
    ATTR_MACROARG,
    ATTR_ORDINARY,
    ATTR_SUETAG,
    ATTR_MEMBER,
    ATTR_LABEL,
    ATTR_TYPEDEF,
    ATTR_CSCOPE,
    ATTR_LSCOPE,
];

/// Human-readable name for a fixed attribute position.
pub fn attr_name(i: usize) -> &'static str {
    match i {
        ATTR_READONLY => "read-only",
        ATTR_IDENTIFIER => "identifier",
        ATTR_MACRO => "preprocessor macro",
        ATTR_MACROARG => "macro argument",
        ATTR_FUNCTION => "function",
        ATTR_ORDINARY => "ordinary identifier",
        ATTR_SUETAG => "struct/union/enum tag",
        ATTR_MEMBER => "struct/union member",
        ATTR_LABEL => "label",
        ATTR_TYPEDEF => "typedef",
        ATTR_CSCOPE => "file scope (static)",
        ATTR_LSCOPE => "project scope",
        _ => "project",
    }
}

/// Short spelling used in `-m` monitor specs and the warning report.
pub fn attr_spec_name(name: &str) -> Option<usize> {
    Some(match name {
        "readonly" | "ro" => ATTR_READONLY,
        "identifier" | "id" => ATTR_IDENTIFIER,
        "macro" => ATTR_MACRO,
        "macroarg" => ATTR_MACROARG,
        "function" | "fun" => ATTR_FUNCTION,
        "ordinary" | "obj" => ATTR_ORDINARY,
        "suetag" | "tag" => ATTR_SUETAG,
        "member" => ATTR_MEMBER,
        "label" => ATTR_LABEL,
        "typedef" => ATTR_TYPEDEF,
        "cscope" | "fscope" => ATTR_CSCOPE,
        "lscope" | "pscope" => ATTR_LSCOPE,
        _ => return None,
    })
}

/// A growable bitset over attribute positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrSet {
    bits: Vec<u64>,
}

impl AttrSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, i: usize) {
        let block = i / 64;
        if block >= self.bits.len() {
            self.bits.resize(block + 1, 0);
        }
        self.bits[block] |= 1 << (i % 64);
    }

    pub fn clear(&mut self, i: usize) {
        let block = i / 64;
        if block < self.bits.len() {
            self.bits[block] &= !(1 << (i % 64));
        }
    }

    pub fn test(&self, i: usize) -> bool {
        let block = i / 64;
        block < self.bits.len() && self.bits[block] & (1 << (i % 64)) != 0
    }

    /// Bitwise OR with another set, widening as needed.
    pub fn merge(&mut self, other: &AttrSet) {
        if other.bits.len() > self.bits.len() {
            self.bits.resize(other.bits.len(), 0);
        }
        for (i, b) in other.bits.iter().enumerate() {
            self.bits[i] |= b;
        }
    }

    /// Positions of all set bits, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(bi, &b)| {
            (0..64usize)
                .filter(move |&j| b & (1u64 << j) != 0)
                .map(move |j| bi * 64 + j)
        })
    }
}

/// Ordered project name registry; ids double as attribute positions.
#[derive(Debug, Default)]
pub struct Projects {
    names: Vec<String>,
    ids: HashMap<String, usize>,
    current: Option<usize>,
}

impl Projects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` the current project, allocating an id on first use.
    pub fn select(&mut self, name: &str) -> usize {
        let id = match self.ids.get(name) {
            Some(&id) => id,
            None => {
                let id = ATTR_BASE + self.names.len();
                self.names.push(name.to_string());
                self.ids.insert(name.to_string(), id);
                id
            }
        };
        self.current = Some(id);
        id
    }

    pub fn set_current(&mut self, id: Option<usize>) {
        self.current = id;
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id.checked_sub(ATTR_BASE)?).map(String::as_str)
    }

    /// (attribute id, name) pairs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (ATTR_BASE + i, n.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_set_grows_on_demand() {
        let mut a = AttrSet::new();
        assert!(!a.test(ATTR_MACRO));
        a.set(ATTR_MACRO);
        a.set(200);
        assert!(a.test(ATTR_MACRO));
        assert!(a.test(200));
        assert!(!a.test(199));
        assert_eq!(a.iter_set().collect::<Vec<_>>(), vec![ATTR_MACRO, 200]);
    }

    #[test]
    fn attr_set_merge_is_union() {
        let mut a = AttrSet::new();
        a.set(ATTR_ORDINARY);
        let mut b = AttrSet::new();
        b.set(ATTR_LSCOPE);
        b.set(ATTR_BASE + 3);
        a.merge(&b);
        assert!(a.test(ATTR_ORDINARY));
        assert!(a.test(ATTR_LSCOPE));
        assert!(a.test(ATTR_BASE + 3));
    }

    #[test]
    fn project_ids_start_past_base_attributes() {
        let mut p = Projects::new();
        assert_eq!(p.select("kernel"), ATTR_BASE);
        assert_eq!(p.select("libc"), ATTR_BASE + 1);
        // Re-selecting an existing project reuses its id
        assert_eq!(p.select("kernel"), ATTR_BASE);
        assert_eq!(p.current(), Some(ATTR_BASE));
        assert_eq!(p.name_of(ATTR_BASE + 1), Some("libc"));
    }
}
