//! Parser driver and name resolution
//!
//! Walks the post-preprocessing token stream of one compilation unit,
//! maintains the layered symbol tables, and reports every resolved name to
//! the equivalence-class engine: binding a use to its declaration, a struct
//! member to its definition, a label to its `goto`, merges the two tokens'
//! classes. Function-call syntax feeds the call graph, and the statement
//! walk counts the per-function metrics.
//!
//! The grammar handling is phrase-level: on an unexpected token the driver
//! reports a diagnostic and resumes at the next `;` or `}`, leaving the
//! class map consistent.

use crate::ec::attr::{
    ATTR_CSCOPE, ATTR_FUNCTION, ATTR_IDENTIFIER, ATTR_LABEL, ATTR_LSCOPE, ATTR_MEMBER,
    ATTR_ORDINARY, ATTR_SUETAG, ATTR_TYPEDEF,
};
use crate::ec::eclass::EcId;
use crate::graph::call::CallId;
use crate::metrics::fun::{FunMetric, FunMetrics};
use crate::parse::ctoken::{CKind, CTok, Keyword};
use crate::parse::scopes::{CType, ScopeStack, Sym, TagTable};
use crate::source::fileid::FileId;
use crate::workspace::Analysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    None,
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
}

#[derive(Debug, Clone)]
struct DeclSpec {
    storage: Storage,
    base: CType,
}

#[derive(Debug)]
struct Declr {
    name: Option<CTok>,
    ty: CType,
    is_func: bool,
    params: Vec<Param>,
}

#[derive(Debug)]
struct Param {
    name: Option<CTok>,
    ty: CType,
}

pub struct Parser<'a> {
    cx: &'a mut Analysis,
    toks: Vec<CTok>,
    pos: usize,
    scopes: ScopeStack,
    tags: TagTable,
    labels: std::collections::HashMap<String, EcId>,
    gotos: Vec<(String, EcId)>,
    cur_fun: Vec<CallId>,
}

/// Parse one compilation unit's significant tokens.
pub fn parse_unit(cx: &mut Analysis, toks: Vec<crate::cpp::pltoken::PpTok>, _unit: FileId) {
    let toks: Vec<CTok> = toks.into_iter().map(CTok::from_pp).collect();
    let mut p = Parser {
        cx,
        toks,
        pos: 0,
        scopes: ScopeStack::new(),
        tags: TagTable::new(),
        labels: std::collections::HashMap::new(),
        gotos: Vec::new(),
        cur_fun: Vec::new(),
    };
    p.run();
}

impl<'a> Parser<'a> {
    fn run(&mut self) {
        while !self.at_end() {
            let before = self.pos;
            self.external_declaration();
            if self.pos == before {
                self.pos += 1; // never stall
            }
        }
    }

    // ---------------------------------------------------------------
    // Token plumbing
    // ---------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn peek(&self) -> Option<&CTok> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&CTok> {
        self.toks.get(self.pos + n)
    }

    fn bump(&mut self) -> Option<CTok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn check_punct(&self, s: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(s))
    }

    fn eat_punct(&mut self, s: &str) -> bool {
        if self.check_punct(s) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn check_kw(&self, k: Keyword) -> bool {
        self.peek().is_some_and(|t| t.is_kw(k))
    }

    fn eat_kw(&mut self, k: Keyword) -> bool {
        if self.check_kw(k) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn here(&self) -> String {
        match self.peek().or_else(|| self.toks.last()) {
            Some(t) => {
                let rec = self.cx.files.get(t.tokid.file);
                format!("{}:@{}", rec.path().display(), t.tokid.offset)
            }
            None => "<empty unit>".to_string(),
        }
    }

    fn error_here(&mut self, msg: &str) {
        let loc = self.here();
        self.cx.diags.parse_error(&loc, msg);
    }

    /// Skip to the next `;` (consumed) or `}` (left in place).
    fn recover(&mut self) {
        let mut depth = 0usize;
        while let Some(t) = self.peek() {
            if t.is_punct("{") || t.is_punct("(") || t.is_punct("[") {
                depth += 1;
            } else if t.is_punct(")") || t.is_punct("]") {
                depth = depth.saturating_sub(1);
            } else if t.is_punct("}") {
                if depth == 0 {
                    return;
                }
                depth -= 1;
            } else if t.is_punct(";") && depth == 0 {
                self.pos += 1;
                return;
            }
            self.pos += 1;
        }
    }

    // ---------------------------------------------------------------
    // Equivalence-class plumbing
    // ---------------------------------------------------------------

    fn mark_tok(&mut self, t: &CTok, attrs: &[usize]) -> Option<EcId> {
        if !t.ec_ok {
            return None;
        }
        let ec = self.cx.ecs.lookup(t.tokid)?;
        for &a in attrs {
            self.cx.ecs.set_attr(ec, a);
        }
        Some(ec)
    }

    fn fm(&mut self) -> Option<&mut FunMetrics> {
        let &id = self.cur_fun.last()?;
        Some(&mut self.cx.calls.get_mut(id).metrics)
    }

    fn fm_inc(&mut self, m: FunMetric) {
        if let Some(f) = self.fm() {
            f.inc(m);
        }
    }

    fn fm_op(&mut self, op: &str) {
        if let Some(f) = self.fm() {
            f.add_operator(op);
        }
    }

    fn fm_id(&mut self, ec: EcId) {
        if let Some(f) = self.fm() {
            f.add_id(ec.0);
        }
    }

    // ---------------------------------------------------------------
    // Declarations
    // ---------------------------------------------------------------

    fn is_decl_start(&self) -> bool {
        match self.peek() {
            Some(t) => match &t.kind {
                CKind::Kw(k) => matches!(
                    k,
                    Keyword::Auto
                        | Keyword::Char
                        | Keyword::Const
                        | Keyword::Double
                        | Keyword::Enum
                        | Keyword::Extern
                        | Keyword::Float
                        | Keyword::Inline
                        | Keyword::Int
                        | Keyword::Long
                        | Keyword::Register
                        | Keyword::Restrict
                        | Keyword::Short
                        | Keyword::Signed
                        | Keyword::Static
                        | Keyword::Struct
                        | Keyword::Typedef
                        | Keyword::Union
                        | Keyword::Unsigned
                        | Keyword::Void
                        | Keyword::Volatile
                ),
                CKind::Ident => self.scopes.is_typedef(&t.spelling),
                _ => false,
            },
            None => false,
        }
    }

    fn external_declaration(&mut self) {
        if self.eat_punct(";") {
            return;
        }
        if !self.is_decl_start() {
            self.error_here("expected declaration");
            self.recover();
            return;
        }
        self.declaration(true);
    }

    fn decl_specifiers(&mut self) -> Option<DeclSpec> {
        let mut storage = Storage::None;
        let mut base: Option<CType> = None;
        let mut any = false;

        loop {
            let Some(t) = self.peek().cloned() else { break };
            match &t.kind {
                CKind::Kw(k) => match k {
                    Keyword::Typedef => {
                        storage = Storage::Typedef;
                        self.pos += 1;
                    }
                    Keyword::Extern => {
                        storage = Storage::Extern;
                        self.pos += 1;
                    }
                    Keyword::Static => {
                        storage = Storage::Static;
                        self.pos += 1;
                    }
                    Keyword::Auto => {
                        storage = Storage::Auto;
                        self.pos += 1;
                    }
                    Keyword::Register => {
                        storage = Storage::Register;
                        self.pos += 1;
                    }
                    Keyword::Const | Keyword::Volatile | Keyword::Restrict | Keyword::Inline => {
                        self.pos += 1;
                    }
                    Keyword::Void => {
                        base = Some(CType::Void);
                        self.pos += 1;
                    }
                    Keyword::Char
                    | Keyword::Short
                    | Keyword::Int
                    | Keyword::Long
                    | Keyword::Float
                    | Keyword::Double
                    | Keyword::Signed
                    | Keyword::Unsigned => {
                        base.get_or_insert(CType::Arith);
                        self.pos += 1;
                    }
                    Keyword::Struct | Keyword::Union => {
                        self.pos += 1;
                        let tag = self.sue_specifier();
                        base = Some(CType::Struct(tag));
                    }
                    Keyword::Enum => {
                        self.pos += 1;
                        self.enum_specifier();
                        base = Some(CType::Arith);
                    }
                    _ => break,
                },
                CKind::Ident if base.is_none() && self.scopes.is_typedef(&t.spelling) => {
                    // A typedef name used as a type specifier
                    let sym = self.scopes.lookup(&t.spelling).cloned();
                    self.pos += 1;
                    if let Some(sym) = sym {
                        if let Some(a) = self.mark_tok(&t, &[ATTR_IDENTIFIER]) {
                            let root = match sym.ec {
                                Some(b) => self.cx.ecs.merge(a, b),
                                None => a,
                            };
                            self.fm_id(root);
                        }
                        base = Some(sym.ty);
                    }
                }
                _ => break,
            }
            any = true;
        }

        if !any {
            return None;
        }
        Some(DeclSpec {
            storage,
            base: base.unwrap_or(CType::Unknown),
        })
    }

    /// struct/union specifier; the keyword is already consumed.
    fn sue_specifier(&mut self) -> usize {
        let tag_tok = if self.peek().is_some_and(|t| t.is_ident()) {
            self.bump()
        } else {
            None
        };
        let tag_idx = match &tag_tok {
            Some(t) => self.tags.get_or_declare(&t.spelling),
            None => self.tags.anonymous(),
        };
        if let Some(t) = &tag_tok {
            let ec = self.mark_tok(t, &[ATTR_SUETAG, ATTR_IDENTIFIER, ATTR_CSCOPE]);
            match (self.tags.def(tag_idx).tag_ec, ec) {
                (Some(prev), Some(cur)) => {
                    let r = self.cx.ecs.merge(prev, cur);
                    self.tags.def_mut(tag_idx).tag_ec = Some(r);
                }
                (None, Some(cur)) => self.tags.def_mut(tag_idx).tag_ec = Some(cur),
                _ => {}
            }
        }

        if self.eat_punct("{") {
            self.tags.def_mut(tag_idx).defined = true;
            while !self.check_punct("}") && !self.at_end() {
                if !self.is_decl_start() {
                    self.error_here("expected member declaration");
                    self.recover();
                    continue;
                }
                let Some(spec) = self.decl_specifiers() else {
                    self.recover();
                    continue;
                };
                if self.eat_punct(";") {
                    continue; // tag-only member declaration
                }
                loop {
                    let d = self.declarator(spec.base.clone());
                    if let Some(nt) = &d.name {
                        let ec = self.mark_tok(nt, &[ATTR_MEMBER, ATTR_IDENTIFIER, ATTR_CSCOPE]);
                        if let Some(prev) = self.tags.def(tag_idx).members.get(&nt.spelling) {
                            if let (Some(a), Some(b)) = (prev.ec, ec) {
                                self.cx.ecs.merge(a, b);
                            }
                        }
                        self.tags.def_mut(tag_idx).members.insert(
                            nt.spelling.clone(),
                            Sym {
                                ec,
                                tokid: nt.tokid,
                                ty: d.ty,
                                is_typedef: false,
                            },
                        );
                    }
                    if self.eat_punct(":") {
                        // bit-field width
                        self.scan_expression(&[",", ";"]);
                    }
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                if !self.eat_punct(";") {
                    self.error_here("expected ';' after member declaration");
                    self.recover();
                }
            }
            self.eat_punct("}");
        }
        tag_idx
    }

    /// enum specifier; the keyword is already consumed.
    fn enum_specifier(&mut self) {
        if self.peek().is_some_and(|t| t.is_ident()) {
            let t = self.bump().unwrap();
            let ec = self.mark_tok(&t, &[ATTR_SUETAG, ATTR_IDENTIFIER, ATTR_CSCOPE]);
            let tag_idx = self.tags.get_or_declare(&t.spelling);
            match (self.tags.def(tag_idx).tag_ec, ec) {
                (Some(prev), Some(cur)) => {
                    let r = self.cx.ecs.merge(prev, cur);
                    self.tags.def_mut(tag_idx).tag_ec = Some(r);
                }
                (None, Some(cur)) => self.tags.def_mut(tag_idx).tag_ec = Some(cur),
                _ => {}
            }
        }
        if self.eat_punct("{") {
            while !self.check_punct("}") && !self.at_end() {
                if !self.peek().is_some_and(|t| t.is_ident()) {
                    self.error_here("expected enumerator");
                    self.recover();
                    break;
                }
                let nt = self.bump().unwrap();
                let ec = self.mark_tok(&nt, &[ATTR_ORDINARY, ATTR_IDENTIFIER, ATTR_CSCOPE]);
                if let Some(prev) = self.scopes.lookup_current(&nt.spelling) {
                    if let (Some(a), Some(b)) = (prev.ec, ec) {
                        self.cx.ecs.merge(a, b);
                    }
                }
                self.scopes.declare(
                    &nt.spelling,
                    Sym {
                        ec,
                        tokid: nt.tokid,
                        ty: CType::Arith,
                        is_typedef: false,
                    },
                );
                if self.eat_punct("=") {
                    self.scan_expression(&[",", "}"]);
                }
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.eat_punct("}");
        }
    }

    fn declarator(&mut self, base: CType) -> Declr {
        let mut ty = base;
        while self.eat_punct("*") {
            while self.eat_kw(Keyword::Const)
                || self.eat_kw(Keyword::Volatile)
                || self.eat_kw(Keyword::Restrict)
            {}
            ty = CType::Ptr(Box::new(ty));
        }

        let mut name = None;
        let mut paren_inner = false;
        if self.peek().is_some_and(|t| t.is_ident()) {
            name = self.bump();
        } else if self.check_punct("(")
            && self
                .peek_at(1)
                .is_some_and(|t| t.is_punct("*") || t.is_ident())
        {
            // Parenthesized declarator (function pointers and the like)
            self.pos += 1;
            let inner = self.declarator(CType::Unknown);
            name = inner.name;
            paren_inner = true;
            if !self.eat_punct(")") {
                self.error_here("expected ')' in declarator");
            }
        }

        let mut is_func = false;
        let mut params = Vec::new();
        loop {
            if self.check_punct("(") && !is_func {
                self.pos += 1;
                params = self.param_list();
                if paren_inner {
                    // Pointer to function: precise typing not tracked
                    ty = CType::Unknown;
                } else {
                    is_func = true;
                    ty = CType::Func(Box::new(ty));
                }
            } else if self.eat_punct("[") {
                if !self.check_punct("]") {
                    self.scan_expression(&["]"]);
                }
                self.eat_punct("]");
                // Arrays decay for the member-chain tracking
                ty = CType::Ptr(Box::new(ty));
            } else {
                break;
            }
        }

        Declr {
            name,
            ty,
            is_func,
            params,
        }
    }

    /// Parameter list; the opening parenthesis is already consumed.
    fn param_list(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if self.eat_punct(")") {
            return params;
        }
        if self.check_kw(Keyword::Void) && self.peek_at(1).is_some_and(|t| t.is_punct(")")) {
            self.pos += 2;
            return params;
        }
        loop {
            if self.eat_punct("...") {
            } else if self.is_decl_start() {
                if let Some(spec) = self.decl_specifiers() {
                    let d = self.declarator(spec.base);
                    if let Some(nt) = &d.name {
                        self.mark_tok(nt, &[ATTR_ORDINARY, ATTR_IDENTIFIER, ATTR_CSCOPE]);
                    }
                    params.push(Param {
                        name: d.name,
                        ty: d.ty,
                    });
                }
            } else if self.peek().is_some_and(|t| t.is_ident()) {
                // Old-style parameter name
                let nt = self.bump();
                if let Some(nt) = &nt {
                    self.mark_tok(nt, &[ATTR_ORDINARY, ATTR_IDENTIFIER, ATTR_CSCOPE]);
                }
                params.push(Param {
                    name: nt,
                    ty: CType::Unknown,
                });
            } else {
                break;
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        if !self.eat_punct(")") {
            self.error_here("expected ')' in parameter list");
            while let Some(t) = self.peek() {
                let done = t.is_punct(")");
                self.pos += 1;
                if done {
                    break;
                }
            }
        }
        params
    }

    /// Declare an ordinary-namespace identifier and unify it with prior
    /// declarations in scope and, for external linkage, across units.
    fn declare_ordinary(
        &mut self,
        name_tok: &CTok,
        ty: CType,
        storage: Storage,
        is_function: bool,
    ) -> Option<EcId> {
        let file_scope = self.scopes.at_file_scope();
        // Functions and extern declarations have external linkage even at
        // block scope
        let linkage = storage != Storage::Static
            && storage != Storage::Typedef
            && (file_scope || is_function || storage == Storage::Extern);

        let mut attrs = vec![ATTR_IDENTIFIER, ATTR_ORDINARY];
        if is_function {
            attrs.push(ATTR_FUNCTION);
        }
        if storage == Storage::Typedef {
            attrs.push(ATTR_TYPEDEF);
        }
        attrs.push(if linkage { ATTR_LSCOPE } else { ATTR_CSCOPE });

        let mut ec = self.mark_tok(name_tok, &attrs);

        if let Some(prev) = self.scopes.lookup_current(&name_tok.spelling).cloned() {
            if let (Some(a), Some(b)) = (ec, prev.ec) {
                ec = Some(self.cx.ecs.merge(a, b));
            } else {
                ec = ec.or(prev.ec);
            }
        }
        if linkage {
            match self.cx.linkage.get(&name_tok.spelling).copied() {
                Some(lec) => {
                    if let Some(e) = ec {
                        ec = Some(self.cx.ecs.merge(e, lec));
                    }
                }
                None => {
                    if let Some(e) = ec {
                        self.cx.linkage.insert(name_tok.spelling.clone(), e);
                    }
                }
            }
        }

        self.scopes.declare(
            &name_tok.spelling,
            Sym {
                ec,
                tokid: name_tok.tokid,
                ty,
                is_typedef: storage == Storage::Typedef,
            },
        );
        ec
    }

    /// A declaration; at file scope (`allow_fundef`) a function declarator
    /// followed by a body becomes a function definition.
    fn declaration(&mut self, allow_fundef: bool) {
        let Some(spec) = self.decl_specifiers() else {
            self.error_here("expected declaration specifiers");
            self.recover();
            return;
        };
        if self.eat_punct(";") {
            return; // tag or enum declaration alone
        }

        loop {
            let d = self.declarator(spec.base.clone());
            let Some(name_tok) = d.name.clone() else {
                self.error_here("expected declarator");
                self.recover();
                return;
            };

            if allow_fundef && d.is_func && (self.check_punct("{") || self.is_decl_start()) {
                self.function_definition(&spec, d, name_tok);
                return;
            }

            let ec = self.declare_ordinary(&name_tok, d.ty.clone(), spec.storage, d.is_func);
            if d.is_func {
                if let Some(e) = ec {
                    self.cx.calls.get_or_insert(
                        &mut self.cx.ecs,
                        e,
                        &name_tok.spelling,
                        name_tok.tokid,
                        false,
                    );
                }
            }

            if self.eat_punct("=") {
                self.scan_expression(&[",", ";"]);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        if !self.eat_punct(";") {
            self.error_here("expected ';' after declaration");
            self.recover();
        }
    }

    fn function_definition(&mut self, spec: &DeclSpec, d: Declr, name_tok: CTok) {
        let ec = self.declare_ordinary(&name_tok, d.ty.clone(), spec.storage, true);

        let call_id = ec.map(|e| {
            let id = self.cx.calls.get_or_insert(
                &mut self.cx.ecs,
                e,
                &name_tok.spelling,
                name_tok.tokid,
                false,
            );
            self.cx.calls.get_mut(id).definition = Some(name_tok.tokid);
            id
        });
        if let Some(id) = call_id {
            self.cur_fun.push(id);
        }

        self.scopes.push();
        self.tags.push();
        for p in &d.params {
            if let Some(nt) = &p.name {
                let pec = self.mark_tok(nt, &[ATTR_ORDINARY, ATTR_IDENTIFIER, ATTR_CSCOPE]);
                self.scopes.declare(
                    &nt.spelling,
                    Sym {
                        ec: pec,
                        tokid: nt.tokid,
                        ty: p.ty.clone(),
                        is_typedef: false,
                    },
                );
                self.fm_inc(FunMetric::Nparam);
            }
        }

        // Old-style parameter declarations before the body
        while self.is_decl_start() && !self.check_punct("{") && !self.at_end() {
            self.declaration(false);
        }

        self.labels.clear();
        self.gotos.clear();

        if self.check_punct("{") {
            self.compound_statement();
        } else {
            self.error_here("expected function body");
            self.recover();
        }

        // Unify goto uses with their label definitions
        let gotos = std::mem::take(&mut self.gotos);
        for (name, ec) in gotos {
            if let Some(&lec) = self.labels.get(&name) {
                self.cx.ecs.merge(ec, lec);
            }
        }

        if let Some(id) = call_id {
            self.cx.calls.get_mut(id).metrics.summarize();
            self.cur_fun.pop();
        }
        self.tags.pop();
        self.scopes.pop();
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn compound_statement(&mut self) {
        if !self.eat_punct("{") {
            self.error_here("expected '{'");
            return;
        }
        self.scopes.push();
        self.tags.push();
        while !self.check_punct("}") && !self.at_end() {
            let before = self.pos;
            self.statement();
            if self.pos == before {
                self.pos += 1;
            }
        }
        self.eat_punct("}");
        self.tags.pop();
        self.scopes.pop();
    }

    fn paren_expression(&mut self) {
        if !self.eat_punct("(") {
            self.error_here("expected '('");
            return;
        }
        self.scan_expression(&[")"]);
        if !self.eat_punct(")") {
            self.error_here("expected ')'");
        }
    }

    fn statement(&mut self) {
        let Some(t) = self.peek().cloned() else { return };

        match &t.kind {
            CKind::Punct if t.spelling == "{" => self.compound_statement(),
            CKind::Punct if t.spelling == ";" => {
                self.pos += 1;
                self.fm_inc(FunMetric::Nstmt);
            }
            CKind::Kw(Keyword::If) => {
                self.fm_inc(FunMetric::Nif);
                self.fm_inc(FunMetric::Nstmt);
                self.pos += 1;
                self.paren_expression();
                self.statement();
                if self.eat_kw(Keyword::Else) {
                    self.statement();
                }
            }
            CKind::Kw(Keyword::While) => {
                self.fm_inc(FunMetric::Nwhile);
                self.fm_inc(FunMetric::Nstmt);
                self.pos += 1;
                self.paren_expression();
                self.statement();
            }
            CKind::Kw(Keyword::Do) => {
                self.fm_inc(FunMetric::Ndo);
                self.fm_inc(FunMetric::Nstmt);
                self.pos += 1;
                self.statement();
                if !self.eat_kw(Keyword::While) {
                    self.error_here("expected 'while' after do body");
                    self.recover();
                    return;
                }
                self.paren_expression();
                self.eat_punct(";");
            }
            CKind::Kw(Keyword::For) => {
                self.fm_inc(FunMetric::Nfor);
                self.fm_inc(FunMetric::Nstmt);
                self.pos += 1;
                if !self.eat_punct("(") {
                    self.error_here("expected '(' after for");
                    self.recover();
                    return;
                }
                if self.eat_punct(";") {
                } else if self.is_decl_start() {
                    self.declaration(false);
                } else {
                    self.scan_expression(&[";"]);
                    self.eat_punct(";");
                }
                if !self.check_punct(";") {
                    self.scan_expression(&[";"]);
                }
                self.eat_punct(";");
                if !self.check_punct(")") {
                    self.scan_expression(&[")"]);
                }
                self.eat_punct(")");
                self.statement();
            }
            CKind::Kw(Keyword::Switch) => {
                self.fm_inc(FunMetric::Nswitch);
                self.fm_inc(FunMetric::Nstmt);
                self.pos += 1;
                self.paren_expression();
                self.statement();
            }
            CKind::Kw(Keyword::Case) => {
                self.fm_inc(FunMetric::Ncase);
                self.pos += 1;
                self.scan_expression(&[":"]);
                self.eat_punct(":");
            }
            CKind::Kw(Keyword::Default) => {
                self.pos += 1;
                self.eat_punct(":");
            }
            CKind::Kw(Keyword::Return) => {
                self.fm_inc(FunMetric::Nstmt);
                self.pos += 1;
                if !self.check_punct(";") {
                    self.scan_expression(&[";"]);
                }
                self.eat_punct(";");
            }
            CKind::Kw(Keyword::Break) | CKind::Kw(Keyword::Continue) => {
                self.fm_inc(FunMetric::Nstmt);
                self.pos += 1;
                self.eat_punct(";");
            }
            CKind::Kw(Keyword::Goto) => {
                self.fm_inc(FunMetric::Nstmt);
                self.pos += 1;
                if self.peek().is_some_and(|t| t.is_ident()) {
                    let nt = self.bump().unwrap();
                    if let Some(ec) =
                        self.mark_tok(&nt, &[ATTR_LABEL, ATTR_IDENTIFIER, ATTR_CSCOPE])
                    {
                        self.gotos.push((nt.spelling.clone(), ec));
                    }
                } else {
                    self.error_here("expected label after goto");
                }
                self.eat_punct(";");
            }
            CKind::Ident if self.peek_at(1).is_some_and(|n| n.is_punct(":")) => {
                // Label definition
                let nt = self.bump().unwrap();
                self.pos += 1; // ':'
                if let Some(ec) = self.mark_tok(&nt, &[ATTR_LABEL, ATTR_IDENTIFIER, ATTR_CSCOPE]) {
                    if let Some(&prev) = self.labels.get(&nt.spelling) {
                        self.cx.ecs.merge(prev, ec);
                    } else {
                        self.labels.insert(nt.spelling.clone(), ec);
                    }
                }
            }
            _ if self.is_decl_start() => self.declaration(false),
            _ => {
                self.fm_inc(FunMetric::Nstmt);
                self.scan_expression(&[";"]);
                self.eat_punct(";");
            }
        }
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    /// Scan an expression, resolving identifier uses, member chains and
    /// calls, and counting operator and operand metrics. Stops before any
    /// of `terminators` at nesting depth zero; never consumes them.
    fn scan_expression(&mut self, terminators: &[&str]) {
        let mut depth_paren = 0usize;
        let mut depth_brace = 0usize;
        // Type of the postfix chain being scanned, for member resolution
        let mut chain = CType::Unknown;

        loop {
            let Some(t) = self.peek().cloned() else { return };

            if let CKind::Punct = t.kind {
                if depth_paren == 0 && depth_brace == 0 {
                    if terminators.contains(&t.spelling.as_str()) {
                        return;
                    }
                    if t.spelling == ";" || t.spelling == "}" {
                        return;
                    }
                }
            }
            self.pos += 1;

            match &t.kind {
                CKind::Kw(Keyword::Sizeof) => self.fm_op("sizeof"),
                CKind::Kw(_) => {}
                CKind::Ident => {
                    if self.check_punct("(") {
                        self.resolve_call(&t);
                        chain = CType::Unknown;
                    } else {
                        chain = self.resolve_use(&t);
                    }
                }
                CKind::Number => {
                    self.fm_inc(FunMetric::Nnconst);
                    chain = CType::Unknown;
                }
                CKind::CharLit => {
                    self.fm_inc(FunMetric::Nclit);
                    chain = CType::Unknown;
                }
                CKind::StrLit | CKind::Other => chain = CType::Unknown,
                CKind::Punct => match t.spelling.as_str() {
                    "(" => {
                        depth_paren += 1;
                        chain = CType::Unknown;
                    }
                    ")" => {
                        if depth_paren == 0 {
                            self.pos -= 1;
                            return;
                        }
                        depth_paren -= 1;
                    }
                    "[" => {
                        self.scan_expression(&["]"]);
                        self.eat_punct("]");
                        self.fm_op("[]");
                        chain = chain.deref();
                    }
                    "]" => {
                        self.pos -= 1;
                        return;
                    }
                    "{" => {
                        depth_brace += 1;
                        chain = CType::Unknown;
                    }
                    "}" => {
                        depth_brace = depth_brace.saturating_sub(1);
                    }
                    "." => {
                        self.fm_op(".");
                        if self.peek().is_some_and(|n| n.is_ident()) {
                            let mt = self.bump().unwrap();
                            chain = self.member_use(chain.clone(), &mt);
                        }
                    }
                    "->" => {
                        self.fm_op("->");
                        let derefed = chain.deref();
                        if self.peek().is_some_and(|n| n.is_ident()) {
                            let mt = self.bump().unwrap();
                            chain = self.member_use(derefed, &mt);
                        } else {
                            chain = CType::Unknown;
                        }
                    }
                    "&&" | "||" => {
                        self.fm_inc(FunMetric::Ncc2op);
                        self.fm_op(&t.spelling);
                        chain = CType::Unknown;
                    }
                    "?" => {
                        self.fm_inc(FunMetric::Ncc2op);
                        self.fm_op("?:");
                        chain = CType::Unknown;
                    }
                    "," | ":" => chain = CType::Unknown,
                    op => {
                        self.fm_op(op);
                        chain = CType::Unknown;
                    }
                },
            }
        }
    }

    /// Resolve an identifier use against the scope stack; returns its type
    /// for the member-chain tracking.
    fn resolve_use(&mut self, t: &CTok) -> CType {
        match self.scopes.lookup(&t.spelling).cloned() {
            Some(sym) => {
                if let Some(a) = self.mark_tok(t, &[ATTR_IDENTIFIER]) {
                    let root = match sym.ec {
                        Some(b) => self.cx.ecs.merge(a, b),
                        None => a,
                    };
                    self.fm_id(root);
                }
                sym.ty
            }
            None => {
                // Undeclared: assume an external-linkage object so a
                // declaration in another unit unifies with this use
                if let Some(ec) = self.mark_tok(t, &[ATTR_IDENTIFIER, ATTR_ORDINARY]) {
                    let root = match self.cx.linkage.get(&t.spelling).copied() {
                        Some(lec) => self.cx.ecs.merge(ec, lec),
                        None => {
                            self.cx.linkage.insert(t.spelling.clone(), ec);
                            ec
                        }
                    };
                    self.fm_id(root);
                }
                CType::Unknown
            }
        }
    }

    /// A call site: `t` is the callee identifier, '(' is next.
    fn resolve_call(&mut self, t: &CTok) {
        let sym = self.scopes.lookup(&t.spelling).cloned();
        let ec = match &sym {
            Some(sym) => {
                let marked = self.mark_tok(t, &[ATTR_IDENTIFIER, ATTR_FUNCTION]);
                match (marked, sym.ec) {
                    (Some(a), Some(b)) => Some(self.cx.ecs.merge(a, b)),
                    (a, b) => a.or(b),
                }
            }
            None => {
                // Implicit declaration: an undeclared callee has external
                // linkage
                let ec = self.mark_tok(
                    t,
                    &[ATTR_IDENTIFIER, ATTR_ORDINARY, ATTR_FUNCTION, ATTR_LSCOPE],
                );
                if let Some(e) = ec {
                    match self.cx.linkage.get(&t.spelling).copied() {
                        Some(lec) => {
                            self.cx.ecs.merge(e, lec);
                        }
                        None => {
                            self.cx.linkage.insert(t.spelling.clone(), e);
                        }
                    }
                }
                ec
            }
        };

        if let Some(e) = ec {
            self.fm_id(e);
            let callee =
                self.cx
                    .calls
                    .get_or_insert(&mut self.cx.ecs, e, &t.spelling, t.tokid, false);
            self.cx.calls.get_mut(callee).call_sites.insert(t.tokid);
            if let Some(&cur) = self.cur_fun.last() {
                self.cx.calls.add_edge(cur, callee);
            }
        }
        self.fm_op("()");
    }

    /// A member reference after `.` or `->`; `owner` is the type of the
    /// expression to the left.
    fn member_use(&mut self, owner: CType, mt: &CTok) -> CType {
        if let Some(tag) = owner.struct_tag() {
            if let Some(member) = self.tags.def(tag).members.get(&mt.spelling).cloned() {
                if let Some(a) = self.mark_tok(mt, &[ATTR_MEMBER, ATTR_IDENTIFIER]) {
                    let root = match member.ec {
                        Some(b) => self.cx.ecs.merge(a, b),
                        None => a,
                    };
                    self.fm_id(root);
                }
                return member.ty;
            }
        }
        // Owner type unknown: record the token as a member identifier but
        // leave it unbound
        self.mark_tok(mt, &[ATTR_MEMBER, ATTR_IDENTIFIER]);
        CType::Unknown
    }
}
