//! The analysis session
//!
//! A single [`Analysis`] value owns every process-wide registry: files,
//! equivalence classes, the call graph, projects, the cross-unit linkage
//! table, and the diagnostic counters. Pass 1 streams the workspace file
//! through the preprocessor, parsing each compilation unit as its `process`
//! pragma pushes it, and running the include-dependency pass as each unit
//! pops. Pass 2 re-reads every file to materialize identifiers and fold
//! the metric summaries.

use crate::core::error::{Diagnostics, Result};
use crate::cpp::pdtoken::{Event, Preprocessor};
use crate::cpp::pltoken::PpTok;
use crate::ec::attr::Projects;
use crate::ec::eclass::EcId;
use crate::ec::EcStore;
use crate::graph::CallGraph;
use crate::metrics::file::FileMetric;
use crate::metrics::fun::FunMetric;
use crate::metrics::id::IdSummary;
use crate::metrics::MetricSummary;
use crate::post;
use crate::post::identifier::IdProp;
use crate::query::IdQuery;
use crate::source::fileid::{FileId, FileRegistry};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Every process-wide registry, threaded through the pipeline as one
/// value.
#[derive(Default)]
pub struct Analysis {
    pub files: FileRegistry,
    pub ecs: EcStore,
    pub calls: CallGraph,
    pub projects: Projects,
    /// External-linkage identifiers, unified across compilation units
    pub linkage: HashMap<String, EcId>,
    pub diags: Diagnostics,
    pub ro_prefixes: Vec<PathBuf>,
    pub workspace_file: Option<FileId>,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Pass 1: preprocess and parse every compilation unit the workspace
/// names.
pub fn process_pass1(
    cx: &mut Analysis,
    workspace: &Path,
    monitor: Option<&IdQuery>,
) -> Result<()> {
    let mut pp = Preprocessor::new(cx, workspace, false)?;
    let mut units: Vec<(FileId, Vec<PpTok>)> = Vec::new();
    loop {
        match pp.next_event(cx)? {
            Event::Tok(t) => {
                if let Some((_, toks)) = units.last_mut() {
                    toks.push(t);
                }
            }
            Event::UnitStart(fid) => units.push((fid, Vec::new())),
            Event::UnitEnd(_) => {
                if let Some((fid, toks)) = units.pop() {
                    crate::parse::parse_unit(cx, toks, fid);
                    post::garbage_collect(cx, monitor, fid);
                }
            }
            Event::Eof => break,
        }
    }
    Ok(())
}

/// `-E`: print the post-preprocessing token stream and stop.
pub fn emit_preprocessed(cx: &mut Analysis, workspace: &Path, out: &mut dyn Write) -> Result<()> {
    let mut pp = Preprocessor::new(cx, workspace, true)?;
    loop {
        match pp.next_event(cx)? {
            Event::Tok(t) => write!(out, "{}", t.spelling)?,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

/// Everything pass 2 produces.
pub struct PostResult {
    pub ids: IdProp,
    pub id_sum: IdSummary,
    pub file_sum: MetricSummary,
    pub fun_sum: MetricSummary,
}

/// Pass 2: analyze every file against the class map, compute cross-file
/// flags, and fold the workspace summaries.
pub fn post_process(cx: &mut Analysis, monitor: Option<&IdQuery>) -> Result<PostResult> {
    let mut ids = IdProp::new();
    let mut id_sum = IdSummary::new();
    for fid in cx.files.files(false) {
        info!("post-processing {}", cx.files.get(fid).path().display());
        post::file_analyze(cx, monitor, &mut ids, &mut id_sum, fid)?;
    }
    post::identifier::compute_xfile(cx, &mut ids, &mut id_sum);

    let mut file_sum = MetricSummary::new(FileMetric::COUNT);
    for fid in cx.files.files(false) {
        file_sum.add(&cx.files.get(fid).metrics.values());
    }
    let mut fun_sum = MetricSummary::new(FunMetric::COUNT);
    for (_, node) in cx.calls.iter() {
        if node.is_defined() && !node.is_macro {
            fun_sum.add(&node.metrics.values(node.fanin(), node.fanout()));
        }
    }

    Ok(PostResult {
        ids,
        id_sum,
        file_sum,
        fun_sum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec::attr::{ATTR_FUNCTION, ATTR_LSCOPE, ATTR_MACRO, ATTR_ORDINARY};
    use crate::graph::call::Direction;
    use std::fs;
    use tempfile::TempDir;

    /// Write the given (name, contents) files and a workspace file that
    /// processes every `.c` file in its own block, then run pass 1.
    fn analyze(files: &[(&str, &str)]) -> (Analysis, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(name), text).unwrap();
        }
        let mut ws = String::new();
        for (name, _) in files.iter().filter(|(n, _)| n.ends_with(".c")) {
            ws.push_str("#pragma block_enter\n");
            ws.push_str(&format!(
                "#pragma process \"{}\"\n",
                dir.path().join(name).display()
            ));
            ws.push_str("#pragma block_exit\n");
        }
        let ws_path = dir.path().join("workspace.ws");
        fs::write(&ws_path, ws).unwrap();

        let mut cx = Analysis::new();
        process_pass1(&mut cx, &ws_path, None).unwrap();
        (cx, dir)
    }

    fn analyze_post(files: &[(&str, &str)]) -> (Analysis, PostResult, TempDir) {
        let (mut cx, dir) = analyze(files);
        let post = post_process(&mut cx, None).unwrap();
        (cx, post, dir)
    }

    fn fid_of(cx: &Analysis, dir: &TempDir, name: &str) -> FileId {
        let want = fs::canonicalize(dir.path().join(name)).unwrap();
        cx.files
            .files(false)
            .into_iter()
            .find(|&f| cx.files.get(f).path() == want)
            .expect("file participated in the analysis")
    }

    fn ident<'a>(post: &'a PostResult, name: &str) -> (EcId, &'a crate::post::Identifier) {
        post.ids
            .iter()
            .find(|(_, i)| i.name == name)
            .map(|(&ec, i)| (ec, i))
            .unwrap_or_else(|| panic!("identifier {name} not found"))
    }

    #[test]
    fn static_candidate_scenario() {
        let src = "int helper(void) { return 1; }\n\
                   int main(void) { return helper(); }\n";
        let (cx, post, _dir) = analyze_post(&[("a.c", src)]);

        let (ec, id) = ident(&post, "helper");
        assert!(cx.ecs.test_attr(ec, ATTR_LSCOPE));
        assert!(cx.ecs.test_attr(ec, ATTR_ORDINARY));
        assert!(cx.ecs.test_attr(ec, ATTR_FUNCTION));
        assert!(!id.crosses_file);

        let q = IdQuery::from_spec("T:writable:obj:pscope").unwrap();
        assert!(q.eval(&cx.ecs, &cx.files, ec, "helper", id.crosses_file));
        // main is also a candidate by attributes, but helper must be there
        let matches: Vec<&str> = post
            .ids
            .iter()
            .filter(|(&e, i)| q.eval(&cx.ecs, &cx.files, e, &i.name, i.crosses_file))
            .map(|(_, i)| i.name.as_str())
            .collect();
        assert!(matches.contains(&"helper"));
    }

    #[test]
    fn macro_mediated_link_scenario() {
        let a = "#define FOO bar\n\
                 int main(void) { return FOO; }\n";
        let b = "int bar;\n";
        let (cx, post, dir) = analyze_post(&[("a.c", a), ("b.c", b)]);

        let (ec, id) = ident(&post, "bar");
        assert!(id.crosses_file);
        let files = cx.ecs.sorted_files(ec);
        assert_eq!(files.len(), 2);
        let a_fid = fid_of(&cx, &dir, "a.c");
        let b_fid = fid_of(&cx, &dir, "b.c");
        assert!(files.contains(&a_fid));
        assert!(files.contains(&b_fid));
        // Definition in b.c, macro body occurrence in a.c, and the
        // expanded use site resolves through the same class (the use site
        // spells FOO, so its own bytes belong to FOO's class; the macro
        // body token carries bar's).
        let members = &cx.ecs.data(ec).members;
        assert!(members.iter().any(|t| t.file == a_fid));
        assert!(members.iter().any(|t| t.file == b_fid));
    }

    #[test]
    fn macro_use_site_unifies_with_definition() {
        let a = "#define FOO bar\n\
                 int main(void) { return FOO; }\n";
        let b = "int bar;\n";
        let (cx, post, _dir) = analyze_post(&[("a.c", a), ("b.c", b)]);

        // FOO's class has the definition name and the invocation site
        let (foo_ec, _) = ident(&post, "FOO");
        assert!(cx.ecs.test_attr(foo_ec, ATTR_MACRO));
        assert_eq!(cx.ecs.data(foo_ec).members.len(), 2);
    }

    #[test]
    fn unused_include_scenario() {
        let util = "extern int util_fn(int x);\n";
        let a = "#include \"util.h\"\nint main(void) { return 0; }\n";
        let b = "#include \"util.h\"\nint main2(void) { return util_fn(1); }\n";
        let (cx, _post, dir) = analyze_post(&[("util.h", util), ("a.c", a), ("b.c", b)]);

        let a_fid = fid_of(&cx, &dir, "a.c");
        let b_fid = fid_of(&cx, &dir, "b.c");
        let u_fid = fid_of(&cx, &dir, "util.h");

        let a_inc = &cx.files.get(a_fid).includes()[&u_fid];
        assert!(a_inc.direct);
        assert!(!a_inc.required, "a.c references nothing from util.h");
        assert_eq!(a_inc.lines.iter().copied().collect::<Vec<_>>(), vec![1]);

        let b_inc = &cx.files.get(b_fid).includes()[&u_fid];
        assert!(b_inc.direct);
        assert!(b_inc.required, "b.c calls util_fn");

        // Required flag on the file itself is the OR over units
        assert!(cx.files.get(u_fid).required());
    }

    #[test]
    fn include_accounting_marks_transitive_includes() {
        let inner = "extern int deep_fn(void);\n";
        let outer = "#include \"inner.h\"\n";
        let a = "#include \"outer.h\"\nint main(void) { return deep_fn(); }\n";
        let (cx, _post, dir) =
            analyze_post(&[("inner.h", inner), ("outer.h", outer), ("a.c", a)]);

        let a_fid = fid_of(&cx, &dir, "a.c");
        let outer_fid = fid_of(&cx, &dir, "outer.h");
        let inner_fid = fid_of(&cx, &dir, "inner.h");

        // outer.h: directly included, contributes nothing itself
        let d = &cx.files.get(a_fid).includes()[&outer_fid];
        assert!(d.direct);
        // inner.h: transitively included and required
        let t = &cx.files.get(a_fid).includes()[&inner_fid];
        assert!(!t.direct);
        assert!(t.required);
        // And outer.h's own map records the direct inclusion of inner.h
        assert!(cx.files.get(outer_fid).includes()[&inner_fid].direct);
    }

    #[test]
    fn cross_unit_linkage_unifies_declarations() {
        let a = "int shared(void) { return 0; }\n";
        let b = "extern int shared(void);\n\
                 int main(void) { return shared(); }\n";
        let (cx, post, _dir) = analyze_post(&[("a.c", a), ("b.c", b)]);
        let (ec, id) = ident(&post, "shared");
        assert!(id.crosses_file);
        assert_eq!(cx.ecs.sorted_files(ec).len(), 2);
    }

    #[test]
    fn struct_members_unify_across_use_sites() {
        let src = "struct point { int x; int y; };\n\
                   int get_x(struct point *p) { return p->x; }\n\
                   int sum(struct point q) { return q.x + q.y; }\n";
        let (cx, post, _dir) = analyze_post(&[("a.c", src)]);
        let (ec_x, _) = ident(&post, "x");
        // Declaration, p->x, q.x
        assert_eq!(cx.ecs.data(ec_x).members.len(), 3);
        let (ec_y, _) = ident(&post, "y");
        assert_eq!(cx.ecs.data(ec_y).members.len(), 2);
    }

    #[test]
    fn labels_unify_with_gotos() {
        let src = "int f(int n) {\n\
                   again: if (n) goto again;\n\
                   return n; }\n";
        let (cx, post, _dir) = analyze_post(&[("a.c", src)]);
        let (ec, _) = ident(&post, "again");
        assert_eq!(cx.ecs.data(ec).members.len(), 2);
    }

    #[test]
    fn cyclomatic_scenario() {
        let src = "int f(int a, int b) {\n\
                   if (a) { b = 1; }\n\
                   for (a = 0; a < 3; a = a + 1) { b = b + a; }\n\
                   switch (b) {\n\
                   case 0: b = 2; break;\n\
                   case 1: b = 3; break;\n\
                   case 2: b = 4; break;\n\
                   }\n\
                   return b; }\n";
        let (cx, _post, _dir) = analyze_post(&[("a.c", src)]);
        let (_, node) = cx
            .calls
            .iter()
            .find(|(_, n)| n.name == "f")
            .expect("function node");
        assert_eq!(node.metric(FunMetric::Ccycl1), 4.0);
        assert_eq!(node.metric(FunMetric::Ccycl2), 4.0);
        assert_eq!(node.metric(FunMetric::Ccycl3), 6.0);
    }

    #[test]
    fn call_graph_edges_and_transitive_walks() {
        let src = "int c(void) { return 1; }\n\
                   int b(void) { return c(); }\n\
                   int a(void) { return b(); }\n";
        let (mut cx, _post, _dir) = analyze_post(&[("a.c", src)]);
        let a = cx.calls.iter().find(|(_, n)| n.name == "a").unwrap().0;
        let c = cx.calls.iter().find(|(_, n)| n.name == "c").unwrap().0;
        let down = cx.calls.transitive(a, Direction::Callees);
        assert!(down.contains(&c));
        let up = cx.calls.transitive(c, Direction::Callers);
        assert!(up.contains(&a));
        assert_eq!(cx.calls.get(c).fanin(), 1);
    }

    #[test]
    fn conditional_exclusion_hides_identifiers() {
        let src = "#define ON 1\n\
                   #if ON\n\
                   int kept;\n\
                   #else\n\
                   int dropped;\n\
                   #endif\n";
        let (_cx, post, _dir) = analyze_post(&[("a.c", src)]);
        assert!(post.ids.values().any(|i| i.name == "kept"));
        assert!(!post.ids.values().any(|i| i.name == "dropped"));
    }

    #[test]
    fn keywords_do_not_survive_post_processing() {
        let src = "int main(void) { return 0; }\n";
        let (_cx, post, _dir) = analyze_post(&[("a.c", src)]);
        assert!(!post.ids.values().any(|i| i.name == "int"));
        assert!(!post.ids.values().any(|i| i.name == "return"));
        assert!(!post.ids.values().any(|i| i.name == "void"));
        assert!(post.ids.values().any(|i| i.name == "main"));
    }

    #[test]
    fn provenance_every_identifier_spells_its_source_range() {
        let src = "#define TWICE(x) ((x) + (x))\n\
                   int v;\n\
                   int main(void) { return TWICE(v); }\n";
        let (cx, post, _dir) = analyze_post(&[("a.c", src)]);
        for (&ec, ident) in &post.ids {
            let data = cx.ecs.data(ec);
            for t in &data.members {
                let bytes = cx.files.read(t.file).unwrap();
                let lo = t.offset as usize;
                let hi = lo + data.len as usize;
                assert_eq!(
                    &bytes[lo..hi],
                    ident.name.as_bytes(),
                    "member of {} does not spell itself",
                    ident.name
                );
            }
        }
    }

    #[test]
    fn monitor_filter_restricts_surviving_classes() {
        let src = "int alpha; int beta;\n\
                   int main(void) { return alpha + beta; }\n";
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.c"), src).unwrap();
        let ws = format!(
            "#pragma block_enter\n#pragma process \"{}\"\n#pragma block_exit\n",
            dir.path().join("a.c").display()
        );
        let ws_path = dir.path().join("w.ws");
        fs::write(&ws_path, &ws).unwrap();

        // Monitor keeping nothing: every class is discarded
        let monitor = IdQuery::from_spec("L:unused:xfile").unwrap();
        let mut cx = Analysis::new();
        process_pass1(&mut cx, &ws_path, Some(&monitor)).unwrap();
        let post = post_process(&mut cx, Some(&monitor)).unwrap();
        assert!(post.ids.is_empty());
        assert_eq!(cx.ecs.map_size(), 0);
    }

    #[test]
    fn projects_widen_attribute_space_and_mark_classes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.c"), "int in_proj;\n").unwrap();
        let ws = format!(
            "#pragma project \"demo\"\n#pragma block_enter\n#pragma process \"{}\"\n#pragma block_exit\n",
            dir.path().join("a.c").display()
        );
        let ws_path = dir.path().join("w.ws");
        fs::write(&ws_path, &ws).unwrap();

        let mut cx = Analysis::new();
        process_pass1(&mut cx, &ws_path, None).unwrap();
        let post = post_process(&mut cx, None).unwrap();
        let proj = cx.projects.lookup("demo").unwrap();
        let (ec, _) = post
            .ids
            .iter()
            .find(|(_, i)| i.name == "in_proj")
            .map(|(&e, i)| (e, i))
            .unwrap();
        assert!(cx.ecs.test_attr(ec, proj));
    }

    #[test]
    fn rename_rewrites_every_member_in_writable_files() {
        use crate::core::config::RewriteConfig;
        let x = "int foo;\nint useit(void) { return foo; }\n";
        let y = "extern int foo;\nint other(void) { return foo + 1; }\n";
        let (cx, mut post, dir) = analyze_post(&[("x.c", x), ("y.c", y)]);

        let ec = *post
            .ids
            .iter()
            .find(|(_, i)| i.name == "foo")
            .map(|(e, _)| e)
            .unwrap();
        post.ids.get_mut(&ec).unwrap().set_replacement("foo2".into());

        let hooks = RewriteConfig {
            checkout_hook: String::new(),
            checkin_hook: String::new(),
        };
        let stats = crate::refactor::write_quit(&cx, &post.ids, &hooks).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.replacements, 4);

        let new_x = fs::read_to_string(dir.path().join("x.c")).unwrap();
        let new_y = fs::read_to_string(dir.path().join("y.c")).unwrap();
        assert_eq!(new_x, "int foo2;\nint useit(void) { return foo2; }\n");
        assert_eq!(new_y, "extern int foo2;\nint other(void) { return foo2 + 1; }\n");
        assert!(!dir.path().join("x.c.repl").exists());
    }

    #[test]
    fn rename_skips_read_only_files() {
        use crate::core::config::RewriteConfig;
        let x = "int foo;\nint useit(void) { return foo; }\n";
        let y = "extern int foo;\n";
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.c"), x).unwrap();
        fs::write(dir.path().join("y.c"), y).unwrap();
        let mut perms = fs::metadata(dir.path().join("y.c")).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(dir.path().join("y.c"), perms).unwrap();

        let mut ws = String::new();
        for name in ["x.c", "y.c"] {
            ws.push_str(&format!(
                "#pragma block_enter\n#pragma process \"{}\"\n#pragma block_exit\n",
                dir.path().join(name).display()
            ));
        }
        let ws_path = dir.path().join("w.ws");
        fs::write(&ws_path, &ws).unwrap();

        let mut cx = Analysis::new();
        process_pass1(&mut cx, &ws_path, None).unwrap();
        let mut post = post_process(&mut cx, None).unwrap();

        let ec = *post
            .ids
            .iter()
            .find(|(_, i)| i.name == "foo")
            .map(|(e, _)| e)
            .unwrap();
        post.ids.get_mut(&ec).unwrap().set_replacement("foo2".into());

        let hooks = RewriteConfig {
            checkout_hook: String::new(),
            checkin_hook: String::new(),
        };
        let stats = crate::refactor::write_quit(&cx, &post.ids, &hooks).unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.replacements, 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("y.c")).unwrap(),
            y,
            "read-only file must be untouched"
        );
    }

    #[test]
    fn rename_to_itself_round_trips_byte_identical() {
        use crate::core::config::RewriteConfig;
        let src = "#define FOO bar\n\
                   int bar;\n\
                   struct s { int field; };\n\
                   int main(void) { struct s v; v.field = FOO; return v.field; }\n";
        let (cx, mut post, dir) = analyze_post(&[("a.c", src)]);
        let original = fs::read(dir.path().join("a.c")).unwrap();

        // Rename every identifier to its own name
        let keys: Vec<EcId> = post.ids.keys().copied().collect();
        for k in keys {
            let name = post.ids[&k].name.clone();
            post.ids.get_mut(&k).unwrap().set_replacement(name);
        }

        let hooks = RewriteConfig {
            checkout_hook: String::new(),
            checkin_hook: String::new(),
        };
        crate::refactor::write_quit(&cx, &post.ids, &hooks).unwrap();
        let rewritten = fs::read(dir.path().join("a.c")).unwrap();
        assert_eq!(original, rewritten);
    }

    #[test]
    fn preprocessed_output_carries_literal_quotes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.c"),
            "#define GREET \"hi\"\nchar *s = GREET;\n",
        )
        .unwrap();
        let ws = format!(
            "#pragma block_enter\n#pragma process \"{}\"\n#pragma block_exit\n",
            dir.path().join("a.c").display()
        );
        let ws_path = dir.path().join("w.ws");
        fs::write(&ws_path, &ws).unwrap();

        let mut cx = Analysis::new();
        let mut out = Vec::new();
        emit_preprocessed(&mut cx, &ws_path, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("char *s = \"hi\";"));
        assert!(!text.contains("GREET"));
    }
}
