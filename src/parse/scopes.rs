//! Layered symbol tables
//!
//! Four namespaces, as in C: ordinary identifiers, struct/union/enum tags,
//! members (one table per tag), and labels (owned by the parser per
//! function definition). Each namespace keyed by spelling; a descriptor
//! holds the declaring token's equivalence class so that name resolution
//! can unify use and declaration.

use crate::ec::eclass::EcId;
use crate::source::tokid::Tokid;
use std::collections::HashMap;

/// Approximate C type, tracked only as far as member resolution needs:
/// struct identity through pointers, arrays and typedefs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    Unknown,
    Void,
    Arith,
    Ptr(Box<CType>),
    Struct(usize),
    Func(Box<CType>),
}

impl CType {
    /// Type after one dereference or array indexing.
    pub fn deref(&self) -> CType {
        match self {
            CType::Ptr(inner) => (**inner).clone(),
            other => other.clone(),
        }
    }

    pub fn struct_tag(&self) -> Option<usize> {
        match self {
            CType::Struct(t) => Some(*t),
            _ => None,
        }
    }
}

/// An ordinary-namespace or member descriptor.
#[derive(Debug, Clone)]
pub struct Sym {
    pub ec: Option<EcId>,
    pub tokid: Tokid,
    pub ty: CType,
    pub is_typedef: bool,
}

/// The ordinary-identifier scope stack. Level 0 is the translation unit's
/// file scope; blocks push and pop above it.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Sym>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.scopes.len() > 1);
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn at_file_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn declare(&mut self, name: &str, sym: Sym) {
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), sym);
    }

    /// Innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<&Sym> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Binding of `name` in the current scope only.
    pub fn lookup_current(&self, name: &str) -> Option<&Sym> {
        self.scopes.last().unwrap().get(name)
    }

    pub fn is_typedef(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|s| s.is_typedef)
    }
}

/// One struct/union definition: its tag class and member table.
#[derive(Debug, Default)]
pub struct StructDef {
    pub tag_ec: Option<EcId>,
    pub members: HashMap<String, Sym>,
    pub defined: bool,
}

/// The tag namespace: scoped name-to-definition bindings over an arena of
/// definitions that outlives the scopes (member tables are consulted after
/// the defining scope closes).
#[derive(Debug)]
pub struct TagTable {
    pub defs: Vec<StructDef>,
    scopes: Vec<HashMap<String, usize>>,
}

impl TagTable {
    pub fn new() -> Self {
        Self {
            defs: Vec::new(),
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.scopes.len() > 1);
        self.scopes.pop();
    }

    /// Resolve `name` through the scope stack, declaring it in the current
    /// scope on a miss.
    pub fn get_or_declare(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.scopes.iter().rev().find_map(|s| s.get(name)) {
            return idx;
        }
        let idx = self.defs.len();
        self.defs.push(StructDef::default());
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), idx);
        idx
    }

    /// A fresh anonymous definition.
    pub fn anonymous(&mut self) -> usize {
        self.defs.push(StructDef::default());
        self.defs.len() - 1
    }

    pub fn def(&self, idx: usize) -> &StructDef {
        &self.defs[idx]
    }

    pub fn def_mut(&mut self, idx: usize) -> &mut StructDef {
        &mut self.defs[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fileid::FileId;

    fn sym(ty: CType) -> Sym {
        Sym {
            ec: None,
            tokid: Tokid::new(FileId(0), 0),
            ty,
            is_typedef: false,
        }
    }

    #[test]
    fn inner_scopes_shadow_outer() {
        let mut s = ScopeStack::new();
        s.declare("x", sym(CType::Arith));
        s.push();
        s.declare("x", sym(CType::Void));
        assert_eq!(s.lookup("x").unwrap().ty, CType::Void);
        s.pop();
        assert_eq!(s.lookup("x").unwrap().ty, CType::Arith);
    }

    #[test]
    fn tag_reference_before_definition_resolves_to_one_def() {
        let mut t = TagTable::new();
        let fwd = t.get_or_declare("node"); // forward reference
        t.push();
        let same = t.get_or_declare("node"); // sees the outer binding
        assert_eq!(fwd, same);
        t.pop();
    }

    #[test]
    fn deref_unwraps_one_pointer_level() {
        let ty = CType::Ptr(Box::new(CType::Struct(3)));
        assert_eq!(ty.deref(), CType::Struct(3));
        assert_eq!(ty.deref().struct_tag(), Some(3));
        assert_eq!(CType::Arith.deref(), CType::Arith);
    }
}
