//! Per-file pages: summary, raw source, and query-hyperlinked source

use crate::ec::attr::ATTR_IDENTIFIER;
use crate::metrics::file::FileMetric;
use crate::query::IdQuery;
use crate::source::fileid::FileId;
use crate::source::tokid::Tokid;
use crate::web::html;
use crate::web::server::{AppState, Session};
use axum::extract::{Query, State};
use axum::response::Html;
use std::collections::HashMap;

pub async fn file_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let Some(fid) = s.file_param(&params) else {
        return Html(html::error_page("missing or invalid file id"));
    };
    let rec = s.cx.files.get(fid);
    let path = rec.path().to_string_lossy();

    let mut props = vec![
        format!("Read-only: {}", if rec.read_only() { "Yes" } else { "No" }),
        format!(
            "Compilation unit: {}",
            if rec.compilation_unit() { "Yes" } else { "No" }
        ),
        format!("Required: {}", if rec.required() { "Yes" } else { "No" }),
    ];
    for m in FileMetric::all() {
        props.push(format!("{}: {}", m.label(), rec.metrics.get(m)));
    }

    let ops = html::list([
        format!("<a href=\"src.html?id={}\">Source code</a>", fid.0),
        format!(
            "<a href=\"qsrc.html?id={}&match=Y\">Source code with identifier hyperlinks</a>",
            fid.0
        ),
        format!(
            "<a href=\"qinc.html?id={}&includes=1\">Files this file includes</a>",
            fid.0
        ),
        format!(
            "<a href=\"qinc.html?id={}&includes=1&direct=1&unused=1\">Unused directly included files</a>",
            fid.0
        ),
        format!("<a href=\"qinc.html?id={}\">Files including this file</a>", fid.0),
    ]);

    let body = format!(
        "<p><code>{}</code></p>\n{}\n<h2>Operations</h2>\n{}",
        html::escape(&path),
        html::list(props),
        ops
    );
    Html(html::page(
        &format!("File: {}", file_name(&path)),
        &body,
        s.project_note().as_deref(),
    ))
}

pub async fn src_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let Some(fid) = s.file_param(&params) else {
        return Html(html::error_page("missing or invalid file id"));
    };
    let body = match render_source(&s, fid, None) {
        Ok(b) => b,
        Err(e) => return Html(html::error_page(&e)),
    };
    let path = s.cx.files.get(fid).path().to_string_lossy().into_owned();
    Html(html::page(
        &format!("Source: {}", file_name(&path)),
        &body,
        s.project_note().as_deref(),
    ))
}

pub async fn qsrc_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let Some(fid) = s.file_param(&params) else {
        return Html(html::error_page("missing or invalid file id"));
    };
    let query = match IdQuery::from_params(&params, s.opts.file_icase, s.current_project) {
        Ok(q) => q,
        Err(e) => return Html(html::error_page(&e.to_string())),
    };
    let body = match render_source(&s, fid, Some(&query)) {
        Ok(b) => b,
        Err(e) => return Html(html::error_page(&e)),
    };
    let path = s.cx.files.get(fid).path().to_string_lossy().into_owned();
    Html(html::page(
        &format!("Source with queried identifiers: {}", file_name(&path)),
        &body,
        s.project_note().as_deref(),
    ))
}

fn file_name(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Stream a file into HTML. With a query, identifiers whose class matches
/// become hyperlinks to their identifier page.
fn render_source(
    s: &Session,
    fid: FileId,
    query: Option<&IdQuery>,
) -> std::result::Result<String, String> {
    let bytes = s.cx.files.read(fid).map_err(|e| e.to_string())?;
    let tab = s.opts.tab_width.max(1);

    let mut out = String::from("<hr><pre>");
    let mut line = 1usize;
    let mut at_bol = true;
    let mut column = 0usize;
    let mut pos = 0usize;

    while pos < bytes.len() {
        if at_bol {
            out.push_str(&format!("<a name=\"{line}\"></a>"));
            if s.opts.show_line_number {
                out.push_str(&format!("{line:5} "));
            }
            at_bol = false;
        }

        let t = Tokid::new(fid, pos as u64);
        if let Some(ec) = s.cx.ecs.lookup_ro(t) {
            if s.cx.ecs.test_attr(ec, ATTR_IDENTIFIER) {
                if let Some(ident) = s.ids.get(&ec) {
                    let len = s.cx.ecs.data(ec).len as usize;
                    let evaluate = query.is_some_and(|q| q.need_eval());
                    let matched = match query {
                        Some(q) if evaluate => {
                            q.eval(&s.cx.ecs, &s.cx.files, ec, &ident.name, ident.crosses_file)
                        }
                        Some(_) => true,
                        None => false,
                    };
                    if matched {
                        out.push_str(&html::id_link(ec, &ident.name));
                    } else {
                        out.push_str(&html::escape(&ident.name));
                    }
                    column += len;
                    pos += len;
                    continue;
                }
            }
        }

        let c = bytes[pos] as char;
        match c {
            '\n' => {
                out.push('\n');
                line += 1;
                column = 0;
                at_bol = true;
            }
            '\t' => {
                let spaces = tab - (column % tab);
                out.push_str(&" ".repeat(spaces));
                column += spaces;
            }
            _ => {
                out.push_str(&html::escape(&c.to_string()));
                column += 1;
            }
        }
        pos += 1;
    }
    out.push_str("</pre><hr>");
    Ok(out)
}
