//! Projects, display options, metric summaries, and the exit endpoints

use crate::ec::attr::ATTR_BASE;
use crate::metrics::file::FileMetric;
use crate::metrics::fun::FunMetric;
use crate::refactor;
use crate::web::html;
use crate::web::pages::local_access;
use crate::web::server::AppState;
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Html;
use axum::Form;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;

// -------------------------------------------------------------------
// Projects
// -------------------------------------------------------------------

pub async fn sproject_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let mut items: Vec<String> = vec![
        "<a href=\"setproj.html?projid=0\">All projects</a>".to_string(),
    ];
    for (pid, name) in s.cx.projects.iter() {
        items.push(format!(
            "<a href=\"setproj.html?projid={pid}\">{}</a>",
            html::escape(name)
        ));
    }
    Html(html::page(
        "Select active project",
        &html::list(items),
        s.project_note().as_deref(),
    ))
}

pub async fn setproj_page(
    State(st): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    if let Err(page) = local_access(&addr) {
        return Html(page);
    }
    let mut s = st.session.write().unwrap();
    let projid: usize = params
        .get("projid")
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);
    s.current_project = (projid >= ATTR_BASE).then_some(projid);
    let current_project = s.current_project;
    s.cx.projects.set_current(current_project);
    Html(html::page(
        "Active project set",
        "<p>The active project has been changed.</p>",
        s.project_note().as_deref(),
    ))
}

// -------------------------------------------------------------------
// Options
// -------------------------------------------------------------------

pub async fn options_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let check = |v: bool| if v { " checked" } else { "" };
    let body = format!(
        "<form action=\"soptions.html\" method=\"post\">\n\
         <input type=\"checkbox\" name=\"remove_fp\" value=\"1\"{}>Remove common path prefix in file lists<br>\n\
         <input type=\"checkbox\" name=\"show_true\" value=\"1\"{}>Show only true identifier properties<br>\n\
         <input type=\"checkbox\" name=\"show_line_number\" value=\"1\"{}>Show line numbers in source listings<br>\n\
         <input type=\"checkbox\" name=\"file_icase\" value=\"1\"{}>Case-insensitive file name matching<br>\n\
         <input type=\"checkbox\" name=\"sort_rev\" value=\"1\"{}>Sort identifiers in reverse order<br>\n\
         Tab width <input type=\"text\" name=\"tab_width\" size=\"3\" value=\"{}\"><br>\n\
         <input type=\"submit\" value=\"Set options\">\n\
         </form>",
        check(s.opts.remove_fp),
        check(s.opts.show_true),
        check(s.opts.show_line_number),
        check(s.opts.file_icase),
        check(s.opts.sort_rev),
        s.opts.tab_width,
    );
    Html(html::page(
        "Global options",
        &body,
        s.project_note().as_deref(),
    ))
}

#[derive(Deserialize)]
pub struct OptionsForm {
    pub remove_fp: Option<String>,
    pub show_true: Option<String>,
    pub show_line_number: Option<String>,
    pub file_icase: Option<String>,
    pub sort_rev: Option<String>,
    pub tab_width: Option<String>,
}

pub async fn soptions_page(
    State(st): State<AppState>,
    Form(form): Form<OptionsForm>,
) -> Html<String> {
    let mut s = st.session.write().unwrap();
    s.opts.remove_fp = form.remove_fp.is_some();
    s.opts.show_true = form.show_true.is_some();
    s.opts.show_line_number = form.show_line_number.is_some();
    s.opts.file_icase = form.file_icase.is_some();
    s.opts.sort_rev = form.sort_rev.is_some();
    if let Some(w) = form.tab_width.as_deref().and_then(|w| w.parse().ok()) {
        if w > 0 {
            s.opts.tab_width = w;
        }
    }
    Html(html::page(
        "Options set",
        "<p>The global options have been updated.</p>",
        s.project_note().as_deref(),
    ))
}

// -------------------------------------------------------------------
// Metric summaries
// -------------------------------------------------------------------

fn summary_table(
    names: &[&'static str],
    sum: &crate::metrics::MetricSummary,
) -> String {
    let mut t = String::from(
        "<table border=\"1\">\n<tr><th>Metric</th><th>Total</th><th>Min</th><th>Max</th></tr>\n",
    );
    for (i, name) in names.iter().enumerate() {
        let (min, max) = if sum.is_empty() {
            (0.0, 0.0)
        } else {
            (sum.min[i], sum.max[i])
        };
        t.push_str(&format!(
            "<tr><td>{name}</td><td>{}</td><td>{min}</td><td>{max}</td></tr>\n",
            sum.total[i]
        ));
    }
    t.push_str("</table>\n");
    t
}

pub async fn fmetrics_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let names: Vec<&'static str> = FileMetric::all().iter().map(|m| m.label()).collect();
    let body = format!(
        "<p>{} files</p>\n{}",
        s.file_sum.count,
        summary_table(&names, &s.file_sum)
    );
    Html(html::page(
        "File metrics",
        &body,
        s.project_note().as_deref(),
    ))
}

pub async fn idmetrics_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let mut rows = vec![
        format!("Identifier occurrences: {}", s.id_sum.occurrences),
        format!("Distinct identifiers: {}", s.id_sum.unique),
        format!("Identifiers crossing file boundaries: {}", s.id_sum.cross_file),
        format!("Unused identifiers: {}", s.id_sum.unused),
    ];
    rows.extend(
        s.id_sum
            .rows()
            .into_iter()
            .map(|(name, count)| format!("{name}: {count}")),
    );
    let names: Vec<&'static str> = FunMetric::all().iter().map(|m| m.label()).collect();
    let body = format!(
        "{}\n<h2>Function metrics ({} defined functions)</h2>\n{}",
        html::list(rows),
        s.fun_sum.count,
        summary_table(&names, &s.fun_sum)
    );
    Html(html::page(
        "Identifier metrics",
        &body,
        s.project_note().as_deref(),
    ))
}

// -------------------------------------------------------------------
// Exit
// -------------------------------------------------------------------

/// Apply every queued substitution, report, and shut the server down.
pub async fn sexit_page(
    State(st): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Html<String> {
    if let Err(page) = local_access(&addr) {
        return Html(page);
    }
    let s = st.session.write().unwrap();
    let result = refactor::write_quit(&s.cx, &s.ids, &s.hooks);
    drop(s);

    let body = match result {
        Ok(stats) => {
            let _ = st.shutdown.send(true);
            format!(
                "<p>A total of {} replacements were made in {} files.</p><p>Bye...</p>",
                stats.replacements, stats.files
            )
        }
        Err(e) => format!(
            "<p>Replacement failed: {}</p><p>The originals are intact.</p>",
            html::escape(&e.to_string())
        ),
    };
    Html(html::page("scour exiting", &body, None))
}

/// Abandon queued substitutions and shut the server down.
pub async fn qexit_page(
    State(st): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Html<String> {
    if let Err(page) = local_access(&addr) {
        return Html(page);
    }
    let _ = st.shutdown.send(true);
    Html(html::page(
        "scour exiting",
        "<p>No changes were saved.</p><p>Bye...</p>",
        None,
    ))
}
