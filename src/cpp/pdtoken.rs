//! Post-preprocessing token stream
//!
//! Drives the lexer through directive processing, conditional inclusion,
//! include resolution, and macro expansion, and hands significant tokens to
//! the parser. Workspace `#pragma` directives are handled here too: they
//! select projects, adjust read-only policy and include paths, and push
//! compilation units onto the character source.
//!
//! Provenance: a token that came from a macro body keeps the Tokid of the
//! byte inside the `#define` line; argument tokens keep their invocation
//! site. Every identifier-like token emitted while a branch is active gets
//! an equivalence class at its Tokid, and a macro use site is merged with
//! the macro's definition name on every expansion.

use crate::core::error::{Error, Result};
use crate::cpp::ifexpr;
use crate::cpp::macros::{substitute, MacroDef, MacroTable};
use crate::cpp::pltoken::{self, PpKind, PpTok};
use crate::ec::attr::{ATTR_CSCOPE, ATTR_IDENTIFIER, ATTR_MACRO, ATTR_MACROARG};
use crate::ec::eclass::EcId;
use crate::metrics::file::FileMetric;
use crate::source::fchar::Fchar;
use crate::source::fileid::FileId;
use crate::workspace::Analysis;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::info;

const MAX_INCLUDE_DEPTH: usize = 200;

/// What the preprocessor hands to the analysis driver.
#[derive(Debug)]
pub enum Event {
    /// A significant post-preprocessing token
    Tok(PpTok),
    /// A `#pragma process` pushed this compilation-unit root
    UnitStart(FileId),
    /// The unit root reached end of file
    UnitEnd(FileId),
    Eof,
}

#[derive(Debug)]
struct Cond {
    taken: bool,
    any_taken: bool,
    seen_else: bool,
    parent_active: bool,
}

struct Saved {
    macros: MacroTable,
    include_path: Vec<PathBuf>,
}

pub struct Preprocessor {
    src: Fchar,
    macros: MacroTable,
    conds: Vec<Cond>,
    cond_marks: Vec<usize>,
    include_path: Vec<PathBuf>,
    saved: Vec<Saved>,
    /// Expansion output awaiting emission
    out: VecDeque<PpTok>,
    /// Raw tokens read ahead of the lexer (failed invocation lookahead)
    replay: VecDeque<PpTok>,
    events: VecDeque<Event>,
    at_line_start: bool,
    /// Emit whitespace and newline tokens too (`-E` mode)
    emit_space: bool,
}

impl Preprocessor {
    /// Open the workspace file and prepare pass 1.
    pub fn new(cx: &mut Analysis, workspace: &Path, emit_space: bool) -> Result<Self> {
        let fid = cx.files.intern(workspace, &cx.ro_prefixes)?;
        let bytes = cx.files.read(fid)?;
        cx.workspace_file = Some(fid);
        let mut src = Fchar::new();
        src.push(fid, bytes, false);
        Ok(Self {
            src,
            macros: MacroTable::new(),
            conds: Vec::new(),
            cond_marks: vec![0],
            include_path: Vec::new(),
            saved: Vec::new(),
            out: VecDeque::new(),
            replay: VecDeque::new(),
            events: VecDeque::new(),
            at_line_start: true,
            emit_space,
        })
    }

    fn active(&self) -> bool {
        self.conds.iter().all(|c| c.taken)
    }

    fn location(&self, cx: &Analysis) -> String {
        match self.src.current_file() {
            Some(f) => format!(
                "{}:{}",
                cx.files.get(f).path().display(),
                self.src.current_line()
            ),
            None => "<end of input>".to_string(),
        }
    }

    /// Equivalence class of a token, if it can carry one.
    fn tok_ec(&self, cx: &mut Analysis, t: &PpTok) -> Option<EcId> {
        if t.kind != PpKind::Ident || !t.clean() {
            return None;
        }
        let readonly = cx.files.get(t.tokid.file).read_only();
        Some(cx.ecs.ec_for(t.tokid, t.len, readonly, cx.projects.current()))
    }

    fn mark(&self, cx: &mut Analysis, t: &PpTok, attrs: &[usize]) -> Option<EcId> {
        let ec = self.tok_ec(cx, t)?;
        for &a in attrs {
            cx.ecs.set_attr(ec, a);
        }
        Some(ec)
    }

    fn merge_tokens(&self, cx: &mut Analysis, a: &PpTok, b: &PpTok) {
        if let (Some(x), Some(y)) = (self.tok_ec(cx, a), self.tok_ec(cx, b)) {
            cx.ecs.merge(x, y);
        }
    }

    /// One raw token from the replay buffer or the lexer. `None` means the
    /// current frame is exhausted.
    fn pull(&mut self, cx: &mut Analysis) -> Option<PpTok> {
        if let Some(t) = self.replay.pop_front() {
            return Some(t);
        }
        let lx = pltoken::lex(&mut self.src)?;
        if let Some(msg) = lx.error {
            let loc = self.location(cx);
            cx.diags.cpp_error(&loc, &msg);
        }
        Some(lx.tok)
    }

    /// The next event of the preprocessing stream.
    pub fn next_event(&mut self, cx: &mut Analysis) -> Result<Event> {
        loop {
            if let Some(e) = self.events.pop_front() {
                return Ok(e);
            }
            if let Some(t) = self.out.pop_front() {
                match t.kind {
                    PpKind::Space | PpKind::Newline if !self.emit_space => continue,
                    _ => {
                        self.note_emission(cx, &t);
                        return Ok(Event::Tok(t));
                    }
                }
            }
            if self.src.is_empty() {
                return Ok(Event::Eof);
            }

            let t = match self.pull(cx) {
                Some(t) => t,
                None => {
                    self.end_of_frame(cx);
                    continue;
                }
            };

            match t.kind {
                PpKind::Newline => {
                    self.at_line_start = true;
                    if self.emit_space && self.active() {
                        self.out.push_back(t);
                    }
                }
                PpKind::Space => {
                    if self.emit_space && self.active() {
                        self.out.push_back(t);
                    }
                }
                PpKind::Punct if t.spelling == "#" && self.at_line_start => {
                    self.directive(cx)?;
                    self.at_line_start = true;
                }
                _ => {
                    self.at_line_start = false;
                    if !self.active() {
                        continue;
                    }
                    if t.kind == PpKind::Ident && self.macros.is_defined(&t.spelling) {
                        if let Some(expansion) = self.try_expand(cx, &t)? {
                            for r in expansion {
                                self.out.push_back(r);
                            }
                            continue;
                        }
                    }
                    self.out.push_back(t);
                }
            }
        }
    }

    /// Bookkeeping on every emitted token: equivalence classes for
    /// identifiers and per-file token metrics.
    fn note_emission(&self, cx: &mut Analysis, t: &PpTok) {
        match t.kind {
            PpKind::Ident => {
                self.tok_ec(cx, t);
                if t.len > 0 {
                    cx.files.get_mut(t.tokid.file).metrics.inc(FileMetric::Nid);
                }
            }
            PpKind::StrLit => {
                if t.len > 0 {
                    cx.files
                        .get_mut(t.tokid.file)
                        .metrics
                        .inc(FileMetric::Nstring);
                }
            }
            PpKind::Punct if t.spelling == ";" && t.len > 0 => {
                cx.files
                    .get_mut(t.tokid.file)
                    .metrics
                    .inc(FileMetric::Nstatement);
            }
            _ => {}
        }
    }

    /// The top frame ran dry: check conditional balance, pop it, and
    /// surface unit boundaries.
    fn end_of_frame(&mut self, cx: &mut Analysis) {
        let mark = self.cond_marks.pop().unwrap_or(0);
        if self.conds.len() > mark {
            let loc = self.location(cx);
            cx.diags.cpp_error(&loc, "unterminated conditional at end of file");
            self.conds.truncate(mark);
        }
        if let Some((fid, was_root)) = self.src.pop() {
            if was_root {
                self.events.push_back(Event::UnitEnd(fid));
            }
        }
        self.at_line_start = true;
    }

    /// Raw tokens up to (and consuming) the end of the line.
    fn read_line(&mut self, cx: &mut Analysis) -> Vec<PpTok> {
        let mut line = Vec::new();
        while let Some(t) = self.pull(cx) {
            if t.kind == PpKind::Newline {
                break;
            }
            line.push(t);
        }
        line
    }

    // -------------------------------------------------------------------
    // Directives
    // -------------------------------------------------------------------

    fn directive(&mut self, cx: &mut Analysis) -> Result<()> {
        let line_no = self.src.current_line();
        let loc = self.location(cx);
        let line = self.read_line(cx);
        let sig: Vec<PpTok> = line.iter().filter(|t| !t.is_space()).cloned().collect();

        let Some(name_tok) = sig.first() else {
            return Ok(()); // null directive
        };
        if name_tok.kind != PpKind::Ident {
            // Line markers emitted by other preprocessors ("# 1 file")
            if name_tok.kind == PpKind::Number {
                return Ok(());
            }
            if self.active() {
                cx.diags.cpp_error(&loc, "invalid preprocessing directive");
            }
            return Ok(());
        }

        match name_tok.spelling.as_str() {
            "if" => self.handle_if(cx, &loc, &sig[1..]),
            "ifdef" => self.handle_ifdef(cx, &loc, &sig[1..], false),
            "ifndef" => self.handle_ifdef(cx, &loc, &sig[1..], true),
            "elif" => self.handle_elif(cx, &loc, &sig[1..]),
            "else" => self.handle_else(cx, &loc),
            "endif" => {
                if self.conds.pop().is_none() {
                    cx.diags.cpp_error(&loc, "#endif without matching #if");
                }
                Ok(())
            }
            _ if !self.active() => Ok(()),
            "include" => self.handle_include(cx, &loc, &line, line_no),
            "define" => self.handle_define(cx, &loc, &line),
            "undef" => {
                match sig.get(1) {
                    Some(name) if name.kind == PpKind::Ident => {
                        if let Some(old) = self.macros.undef(&name.spelling) {
                            self.merge_tokens(cx, name, &old.name_tok);
                            self.mark(cx, name, &[ATTR_MACRO, ATTR_IDENTIFIER, ATTR_CSCOPE]);
                        }
                    }
                    _ => cx.diags.cpp_error(&loc, "#undef expects a macro name"),
                }
                Ok(())
            }
            "error" => {
                let text: Vec<String> = sig[1..].iter().map(|t| t.spelling.clone()).collect();
                cx.diags
                    .cpp_error(&loc, &format!("#error {}", text.join(" ")));
                Ok(())
            }
            "pragma" => self.handle_pragma(cx, &loc, &sig[1..]),
            "line" => Ok(()),
            other => {
                cx.diags
                    .cpp_error(&loc, &format!("unknown directive #{other}"));
                Ok(())
            }
        }
    }

    fn handle_if(&mut self, cx: &mut Analysis, loc: &str, rest: &[PpTok]) -> Result<()> {
        let parent_active = self.active();
        let taken = if parent_active {
            let toks = self.prepare_if_tokens(cx, rest)?;
            match ifexpr::eval(&toks) {
                Ok(v) => v,
                Err(msg) => {
                    cx.diags.cpp_error(loc, &msg);
                    // Resynchronize at the matching #endif: mark every
                    // branch of this conditional dead.
                    self.conds.push(Cond {
                        taken: false,
                        any_taken: true,
                        seen_else: false,
                        parent_active,
                    });
                    return Ok(());
                }
            }
        } else {
            false
        };
        self.conds.push(Cond {
            taken,
            any_taken: taken || !parent_active,
            seen_else: false,
            parent_active,
        });
        Ok(())
    }

    fn handle_ifdef(
        &mut self,
        cx: &mut Analysis,
        loc: &str,
        rest: &[PpTok],
        invert: bool,
    ) -> Result<()> {
        let parent_active = self.active();
        let mut defined = false;
        match rest.first() {
            Some(name) if name.kind == PpKind::Ident => {
                if parent_active {
                    if let Some(def) = self.macros.get(&name.spelling).cloned() {
                        defined = true;
                        self.merge_tokens(cx, name, &def.name_tok);
                    }
                }
            }
            _ => {
                if parent_active {
                    cx.diags.cpp_error(loc, "#ifdef expects a macro name");
                }
            }
        }
        let taken = parent_active && (defined != invert);
        self.conds.push(Cond {
            taken,
            any_taken: taken || !parent_active,
            seen_else: false,
            parent_active,
        });
        Ok(())
    }

    fn handle_elif(&mut self, cx: &mut Analysis, loc: &str, rest: &[PpTok]) -> Result<()> {
        let Some(top) = self.conds.last() else {
            cx.diags.cpp_error(loc, "#elif without matching #if");
            return Ok(());
        };
        if top.seen_else {
            cx.diags.cpp_error(loc, "#elif after #else");
            let top = self.conds.last_mut().unwrap();
            top.taken = false;
            return Ok(());
        }
        let eligible = top.parent_active && !top.any_taken;
        let taken = if eligible {
            let toks = self.prepare_if_tokens(cx, rest)?;
            match ifexpr::eval(&toks) {
                Ok(v) => v,
                Err(msg) => {
                    cx.diags.cpp_error(loc, &msg);
                    false
                }
            }
        } else {
            false
        };
        let top = self.conds.last_mut().unwrap();
        top.taken = taken;
        top.any_taken |= taken;
        Ok(())
    }

    fn handle_else(&mut self, cx: &mut Analysis, loc: &str) -> Result<()> {
        let Some(top) = self.conds.last_mut() else {
            cx.diags.cpp_error(loc, "#else without matching #if");
            return Ok(());
        };
        if top.seen_else {
            cx.diags.cpp_error(loc, "duplicate #else");
            top.taken = false;
            return Ok(());
        }
        top.taken = top.parent_active && !top.any_taken;
        top.any_taken = true;
        top.seen_else = true;
        Ok(())
    }

    /// Resolve `defined` operators, then macro-expand the controlling
    /// expression.
    fn prepare_if_tokens(&mut self, cx: &mut Analysis, rest: &[PpTok]) -> Result<Vec<PpTok>> {
        let mut resolved: Vec<PpTok> = Vec::new();
        let mut i = 0;
        while i < rest.len() {
            let t = &rest[i];
            if t.is_ident("defined") {
                let (name, consumed) = if rest.get(i + 1).is_some_and(|n| n.is_punct("(")) {
                    (rest.get(i + 2), 4) // defined ( name )
                } else {
                    (rest.get(i + 1), 2)
                };
                if let Some(name) = name.filter(|n| n.kind == PpKind::Ident) {
                    let is_def = self.macros.is_defined(&name.spelling);
                    if is_def {
                        let def = self.macros.get(&name.spelling).unwrap().clone();
                        self.merge_tokens(cx, name, &def.name_tok);
                    }
                    resolved.push(PpTok::synthetic(
                        PpKind::Number,
                        if is_def { "1" } else { "0" }.to_string(),
                        t.tokid,
                    ));
                    i += consumed;
                    continue;
                }
            }
            resolved.push(t.clone());
            i += 1;
        }
        Ok(self.expand_list(cx, resolved, &HashSet::new()))
    }

    fn handle_include(
        &mut self,
        cx: &mut Analysis,
        loc: &str,
        line: &[PpTok],
        line_no: usize,
    ) -> Result<()> {
        let rest: Vec<PpTok> = line
            .iter()
            .skip_while(|t| t.is_space())
            .skip(1) // the "include" ident
            .filter(|t| !t.is_space())
            .cloned()
            .collect();

        let spec = match Self::include_spec(&rest) {
            Some(s) => Some(s),
            // Computed include: expand the operand tokens and retry
            None => {
                let expanded = self.expand_list(cx, rest, &HashSet::new());
                let sig: Vec<PpTok> = expanded.into_iter().filter(|t| !t.is_space()).collect();
                Self::include_spec(&sig)
            }
        };
        let Some((path, quoted)) = spec else {
            cx.diags.cpp_error(loc, "invalid #include directive");
            return Ok(());
        };

        let cur = self.src.current_file().expect("include outside any file");
        let Some(resolved) = self.resolve_include(cx, cur, &path, quoted) else {
            cx.diags
                .cpp_error(loc, &format!("unable to find include file {path}"));
            return Ok(());
        };

        if self.src.depth() >= MAX_INCLUDE_DEPTH {
            cx.diags.cpp_error(loc, "include depth exceeded");
            return Ok(());
        }

        let fid = cx.files.intern(&resolved, &cx.ro_prefixes)?;
        cx.files.add_include(cur, fid, line_no);
        cx.files.get_mut(cur).metrics.inc(FileMetric::Nincl);
        if let Some(p) = cx.projects.current() {
            cx.files.get_mut(fid).attrs.set(p);
        }

        let bytes = match cx.files.read(fid) {
            Ok(b) => b,
            Err(e) => {
                cx.diags.cpp_error(loc, &e.to_string());
                return Ok(());
            }
        };
        self.src.push(fid, bytes, false);
        self.cond_marks.push(self.conds.len());
        Ok(())
    }

    /// Interpret the operand of `#include`: `"path"` or `<path>`.
    fn include_spec(sig: &[PpTok]) -> Option<(String, bool)> {
        match sig.first() {
            Some(t) if t.kind == PpKind::StrLit => {
                let inner = t.spelling.trim_matches('"');
                Some((inner.to_string(), true))
            }
            Some(t) if t.is_punct("<") => {
                let mut path = String::new();
                for t in &sig[1..] {
                    if t.is_punct(">") {
                        return Some((path, false));
                    }
                    path.push_str(&t.spelling);
                }
                None
            }
            _ => None,
        }
    }

    fn resolve_include(
        &self,
        cx: &Analysis,
        cur: FileId,
        path: &str,
        quoted: bool,
    ) -> Option<PathBuf> {
        let p = Path::new(path);
        if p.is_absolute() {
            return p.is_file().then(|| p.to_path_buf());
        }
        if quoted {
            if let Some(dir) = cx.files.get(cur).path().parent() {
                let cand = dir.join(p);
                if cand.is_file() {
                    return Some(cand);
                }
            }
        }
        for dir in &self.include_path {
            let cand = dir.join(p);
            if cand.is_file() {
                return Some(cand);
            }
        }
        None
    }

    fn handle_define(&mut self, cx: &mut Analysis, loc: &str, line: &[PpTok]) -> Result<()> {
        // Raw order matters: a '(' directly after the name (no space)
        // makes the macro function-like.
        let mut i = 0;
        while i < line.len() && line[i].is_space() {
            i += 1;
        }
        i += 1; // the "define" ident
        while i < line.len() && line[i].is_space() {
            i += 1;
        }
        let Some(name_tok) = line.get(i).filter(|t| t.kind == PpKind::Ident).cloned() else {
            cx.diags.cpp_error(loc, "#define expects a macro name");
            return Ok(());
        };
        i += 1;

        let mut params: Option<Vec<String>> = None;
        let mut variadic = false;
        let mut param_toks: Vec<PpTok> = Vec::new();
        if line.get(i).is_some_and(|t| t.is_punct("(")) {
            i += 1;
            let mut list = Vec::new();
            loop {
                match line.get(i) {
                    Some(t) if t.is_space() => {}
                    Some(t) if t.is_punct(")") => {
                        i += 1;
                        break;
                    }
                    Some(t) if t.is_punct(",") => {}
                    Some(t) if t.kind == PpKind::Ident => {
                        list.push(t.spelling.clone());
                        param_toks.push(t.clone());
                    }
                    Some(t) if t.is_punct("...") => {
                        variadic = true;
                        list.push("__VA_ARGS__".to_string());
                    }
                    _ => {
                        cx.diags.cpp_error(loc, "malformed macro parameter list");
                        return Ok(());
                    }
                }
                i += 1;
            }
            params = Some(list);
        }

        // Body: the rest of the line, trimmed of outer whitespace
        let mut body: Vec<PpTok> = line[i.min(line.len())..].to_vec();
        while body.first().is_some_and(|t| t.is_space()) {
            body.remove(0);
        }
        while body.last().is_some_and(|t| t.is_space()) {
            body.pop();
        }

        let name_ec = self.mark(cx, &name_tok, &[ATTR_MACRO, ATTR_IDENTIFIER, ATTR_CSCOPE]);

        // Unify each body occurrence of a parameter with the parameter
        // itself, so renaming a macro argument follows through its uses.
        for pt in &param_toks {
            let p_ec = self.mark(cx, pt, &[ATTR_MACROARG, ATTR_IDENTIFIER]);
            for bt in &body {
                if bt.kind == PpKind::Ident && bt.spelling == pt.spelling {
                    if let (Some(p), Some(b)) = (p_ec, self.mark(cx, bt, &[ATTR_MACROARG])) {
                        cx.ecs.merge(p, b);
                    }
                }
            }
        }

        let def = MacroDef {
            name: name_tok.spelling.clone(),
            name_tok: name_tok.clone(),
            params,
            variadic,
            body,
        };

        if let Some(old) = self.macros.get(&def.name) {
            let old_tok = old.name_tok.clone();
            let compatible = old.same_definition(&def);
            // Same macro entity either way: the two definition sites are
            // unified.
            self.merge_tokens(cx, &name_tok, &old_tok);
            if !compatible {
                cx.diags.cpp_error(
                    loc,
                    &format!("incompatible redefinition of macro {}", def.name),
                );
            }
        }

        if def.is_function_like() {
            if let Some(ec) = name_ec {
                let id = cx.calls.get_or_insert(
                    &mut cx.ecs,
                    ec,
                    &def.name,
                    name_tok.tokid,
                    true,
                );
                let nparam = def.params.as_ref().map(|p| p.len()).unwrap_or(0) as u64;
                let node = cx.calls.get_mut(id);
                node.definition = Some(name_tok.tokid);
                node.metrics
                    .set_count(crate::metrics::fun::FunMetric::Nparam, nparam);
            }
        }

        self.macros.define(def);
        Ok(())
    }

    fn handle_pragma(&mut self, cx: &mut Analysis, loc: &str, rest: &[PpTok]) -> Result<()> {
        let Some(kind) = rest.first().filter(|t| t.kind == PpKind::Ident) else {
            return Ok(()); // pragmas we do not understand are ignored
        };
        let str_arg = || -> Option<String> {
            rest.get(1)
                .filter(|t| t.kind == PpKind::StrLit)
                .map(|t| t.spelling.trim_matches('"').to_string())
        };

        match kind.spelling.as_str() {
            "echo" => {
                if let Some(s) = str_arg() {
                    info!("{}", s.replace("\\n", ""));
                }
            }
            "project" => {
                if let Some(s) = str_arg() {
                    cx.projects.select(&s);
                }
            }
            "ro_prefix" => {
                if let Some(s) = str_arg() {
                    cx.ro_prefixes.push(PathBuf::from(s));
                }
            }
            "includepath" => {
                if let Some(s) = str_arg() {
                    self.include_path.push(PathBuf::from(s));
                }
            }
            "clear_include" => self.include_path.clear(),
            "clear_defines" => self.macros.clear(),
            "block_enter" => self.saved.push(Saved {
                macros: self.macros.clone(),
                include_path: self.include_path.clone(),
            }),
            "block_exit" => match self.saved.pop() {
                Some(s) => {
                    self.macros = s.macros;
                    self.include_path = s.include_path;
                }
                None => cx.diags.cpp_error(loc, "block_exit without block_enter"),
            },
            "process" => {
                let Some(s) = str_arg() else {
                    cx.diags.cpp_error(loc, "process pragma expects a file name");
                    return Ok(());
                };
                self.process_unit(cx, loc, &s)?;
            }
            _ => {} // ordinary pragmas in C sources
        }
        Ok(())
    }

    fn process_unit(&mut self, cx: &mut Analysis, loc: &str, path: &str) -> Result<()> {
        let fid = match cx.files.intern(Path::new(path), &cx.ro_prefixes) {
            Ok(f) => f,
            Err(e) => {
                // A missing compilation unit is fatal for the workspace
                return Err(Error::Workspace {
                    message: format!("{loc}: {e}"),
                });
            }
        };
        cx.files.get_mut(fid).set_compilation_unit(true);
        if let Some(p) = cx.projects.current() {
            cx.files.get_mut(fid).attrs.set(p);
        }
        let bytes = cx.files.read(fid)?;
        info!("processing {}", cx.files.get(fid).path().display());
        self.src.push(fid, bytes, true);
        self.cond_marks.push(self.conds.len());
        self.events.push_back(Event::UnitStart(fid));
        Ok(())
    }

    // -------------------------------------------------------------------
    // Macro expansion
    // -------------------------------------------------------------------

    /// Expand a macro use in the main stream. Returns `None` when the name
    /// turns out not to be an invocation (function-like without `(`).
    fn try_expand(&mut self, cx: &mut Analysis, name: &PpTok) -> Result<Option<Vec<PpTok>>> {
        let def = self.macros.get(&name.spelling).unwrap().clone();
        let mut hide = HashSet::new();
        hide.insert(def.name.clone());

        if !def.is_function_like() {
            self.merge_tokens(cx, name, &def.name_tok);
            return Ok(Some(self.expand_list(cx, def.body.clone(), &hide)));
        }

        // Look for the opening parenthesis, keeping skipped tokens for
        // replay if this is not an invocation.
        let mut skipped: Vec<PpTok> = Vec::new();
        let open = loop {
            match self.pull(cx) {
                Some(t) if t.is_space() || t.kind == PpKind::Newline => skipped.push(t),
                Some(t) if t.is_punct("(") => break Some(t),
                Some(t) => {
                    skipped.push(t);
                    break None;
                }
                None => break None,
            }
        };
        if open.is_none() {
            for t in skipped.into_iter().rev() {
                self.replay.push_front(t);
            }
            return Ok(None);
        }

        let loc = self.location(cx);
        let Some(args) = self.gather_args(cx, &loc) else {
            return Ok(None);
        };

        let params = def.params.as_ref().unwrap();
        let arg_ok = if def.variadic {
            args.len() >= params.len().saturating_sub(1)
        } else {
            args.len() == params.len()
                || (params.is_empty()
                    && args.len() == 1
                    && args[0].iter().all(|t| t.is_space()))
        };
        if !arg_ok {
            cx.diags.cpp_error(
                &loc,
                &format!(
                    "macro {} expects {} arguments, got {}",
                    def.name,
                    params.len(),
                    args.len()
                ),
            );
            return Ok(Some(Vec::new()));
        }

        self.merge_tokens(cx, name, &def.name_tok);
        self.record_macro_call(cx, &def, name);

        let (raw, expanded) = self.bind_args(cx, &def, args);
        let substituted = substitute(&def, &raw, &expanded);
        Ok(Some(self.expand_list(cx, substituted, &hide)))
    }

    /// Collect invocation arguments from the raw stream; the opening
    /// parenthesis has been consumed.
    fn gather_args(&mut self, cx: &mut Analysis, loc: &str) -> Option<Vec<Vec<PpTok>>> {
        let mut args: Vec<Vec<PpTok>> = vec![Vec::new()];
        let mut depth = 1usize;
        loop {
            let t = match self.pull(cx) {
                Some(t) => t,
                None => {
                    cx.diags
                        .cpp_error(loc, "end of file inside macro invocation");
                    return None;
                }
            };
            match t.kind {
                PpKind::Newline => args.last_mut().unwrap().push(PpTok {
                    kind: PpKind::Space,
                    spelling: " ".into(),
                    tokid: t.tokid,
                    len: 0,
                }),
                PpKind::Punct if t.spelling == "(" => {
                    depth += 1;
                    args.last_mut().unwrap().push(t);
                }
                PpKind::Punct if t.spelling == ")" => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(args);
                    }
                    args.last_mut().unwrap().push(t);
                }
                PpKind::Punct if t.spelling == "," && depth == 1 => args.push(Vec::new()),
                _ => args.last_mut().unwrap().push(t),
            }
        }
    }

    /// Map parameter names to raw and fully-expanded argument tokens.
    fn bind_args(
        &mut self,
        cx: &mut Analysis,
        def: &MacroDef,
        mut args: Vec<Vec<PpTok>>,
    ) -> (HashMap<String, Vec<PpTok>>, HashMap<String, Vec<PpTok>>) {
        let params = def.params.as_ref().unwrap();
        let mut raw = HashMap::new();

        if def.variadic {
            let fixed = params.len() - 1;
            let rest: Vec<Vec<PpTok>> = args.split_off(fixed.min(args.len()));
            for (p, a) in params.iter().zip(args.into_iter()) {
                raw.insert(p.clone(), a);
            }
            let mut joined: Vec<PpTok> = Vec::new();
            for (i, mut a) in rest.into_iter().enumerate() {
                if i > 0 {
                    let tokid = a
                        .first()
                        .map(|t| t.tokid)
                        .or_else(|| joined.last().map(|t| t.tokid))
                        .unwrap_or(def.name_tok.tokid);
                    joined.push(PpTok::synthetic(PpKind::Punct, ",".into(), tokid));
                }
                joined.append(&mut a);
            }
            raw.insert("__VA_ARGS__".to_string(), joined);
        } else {
            for (p, a) in params.iter().zip(args.into_iter()) {
                raw.insert(p.clone(), a);
            }
        }

        let mut expanded = HashMap::new();
        for (p, a) in &raw {
            expanded.insert(p.clone(), self.expand_list(cx, a.clone(), &HashSet::new()));
        }
        (raw, expanded)
    }

    fn record_macro_call(&mut self, cx: &mut Analysis, def: &MacroDef, name: &PpTok) {
        if let Some(def_ec) = self.tok_ec(cx, &def.name_tok) {
            if let Some(id) = cx.calls.lookup(&mut cx.ecs, def_ec) {
                cx.calls.get_mut(id).call_sites.insert(name.tokid);
            }
        }
    }

    /// Expand every macro use inside a token list. Function-like macros are
    /// expanded when their parenthesis is inside the list.
    fn expand_list(
        &mut self,
        cx: &mut Analysis,
        toks: Vec<PpTok>,
        hide: &HashSet<String>,
    ) -> Vec<PpTok> {
        let mut out: Vec<PpTok> = Vec::new();
        let mut i = 0;
        while i < toks.len() {
            let t = &toks[i];
            if t.kind != PpKind::Ident || hide.contains(&t.spelling) {
                out.push(t.clone());
                i += 1;
                continue;
            }
            let Some(def) = self.macros.get(&t.spelling).cloned() else {
                out.push(t.clone());
                i += 1;
                continue;
            };

            let mut sub_hide = hide.clone();
            sub_hide.insert(def.name.clone());

            if !def.is_function_like() {
                self.merge_tokens(cx, t, &def.name_tok);
                out.extend(self.expand_list(cx, def.body.clone(), &sub_hide));
                i += 1;
                continue;
            }

            // Function-like: the invocation must be complete in the list
            let mut j = i + 1;
            while j < toks.len() && toks[j].is_space() {
                j += 1;
            }
            if j >= toks.len() || !toks[j].is_punct("(") {
                out.push(t.clone());
                i += 1;
                continue;
            }
            let mut depth = 1usize;
            let mut k = j + 1;
            let mut args: Vec<Vec<PpTok>> = vec![Vec::new()];
            let mut complete = false;
            while k < toks.len() {
                let a = &toks[k];
                if a.is_punct("(") {
                    depth += 1;
                    args.last_mut().unwrap().push(a.clone());
                } else if a.is_punct(")") {
                    depth -= 1;
                    if depth == 0 {
                        complete = true;
                        k += 1;
                        break;
                    }
                    args.last_mut().unwrap().push(a.clone());
                } else if a.is_punct(",") && depth == 1 {
                    args.push(Vec::new());
                } else {
                    args.last_mut().unwrap().push(a.clone());
                }
                k += 1;
            }
            if !complete {
                out.push(t.clone());
                i += 1;
                continue;
            }

            let params = def.params.as_ref().unwrap();
            let arg_ok = if def.variadic {
                args.len() >= params.len().saturating_sub(1)
            } else {
                args.len() == params.len()
                    || (params.is_empty()
                        && args.len() == 1
                        && args[0].iter().all(|t| t.is_space()))
            };
            if !arg_ok {
                out.push(t.clone());
                i += 1;
                continue;
            }

            self.merge_tokens(cx, t, &def.name_tok);
            self.record_macro_call(cx, &def, t);
            let (raw, expanded) = self.bind_args(cx, &def, args);
            let substituted = substitute(&def, &raw, &expanded);
            out.extend(self.expand_list(cx, substituted, &sub_hide));
            i = k;
        }
        out
    }
}
