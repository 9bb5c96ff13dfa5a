//! Query forms and result pages for identifiers, files, and functions

use crate::ec::attr::{attr_name, ATTR_BASE};
use crate::metrics::file::FileMetric;
use crate::metrics::fun::FunMetric;
use crate::query::{FileQuery, FunQuery, IdQuery};
use crate::web::html;
use crate::web::server::AppState;
use axum::extract::{Query, State};
use axum::response::Html;
use std::collections::HashMap;

/// Byte length of the directory prefix shared by every path.
fn common_dir_prefix(paths: &[String]) -> usize {
    let Some(first) = paths.first() else { return 0 };
    let mut prefix = first.as_str();
    for p in &paths[1..] {
        while !p.starts_with(prefix) {
            let mut cut = prefix.len() - 1;
            while !prefix.is_char_boundary(cut) {
                cut -= 1;
            }
            prefix = &prefix[..cut];
        }
    }
    match prefix.rfind('/') {
        Some(i) => i + 1,
        None => 0,
    }
}

fn equality_selection(name: &str) -> String {
    format!(
        "<select name=\"{name}\">\
         <option value=\"0\">ignore</option>\
         <option value=\"1\">==</option>\
         <option value=\"2\">!=</option>\
         <option value=\"3\">&lt;</option>\
         <option value=\"4\">&gt;</option>\
         </select>"
    )
}

fn match_radio() -> &'static str {
    "<p>\
     <input type=\"radio\" name=\"match\" value=\"Y\" checked>Match any of the above\n\
     <input type=\"radio\" name=\"match\" value=\"L\">Match all of the above\n\
     <input type=\"radio\" name=\"match\" value=\"E\">Exclude marked\n\
     <input type=\"radio\" name=\"match\" value=\"T\">Exact match\n\
     </p>"
}

// -------------------------------------------------------------------
// Identifier queries
// -------------------------------------------------------------------

pub async fn iquery_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let mut boxes = String::new();
    for a in 1..ATTR_BASE {
        boxes.push_str(&format!(
            "<input type=\"checkbox\" name=\"a{a}\" value=\"1\">{}<br>\n",
            attr_name(a)
        ));
    }
    let body = format!(
        "<form action=\"xiquery.html\" method=\"get\">\n\
         <input type=\"checkbox\" name=\"writable\" value=\"1\">Writable<br>\n\
         <input type=\"checkbox\" name=\"ro\" value=\"1\">Read-only<br>\n\
         <input type=\"checkbox\" name=\"unused\" value=\"1\">Unused<br>\n\
         <input type=\"checkbox\" name=\"xfile\" value=\"1\">Crosses file boundary<br>\n\
         {boxes}{radio}<hr>\n\
         Identifier names should \
         <input type=\"checkbox\" name=\"xire\" value=\"1\">not \
         match RE <input type=\"text\" name=\"ire\" size=\"20\" maxlength=\"256\"><br>\n\
         Identifiers should appear in files matching RE \
         <input type=\"text\" name=\"fre\" size=\"20\" maxlength=\"256\"><hr>\n\
         <input type=\"submit\" name=\"qi\" value=\"Show identifiers\">\n\
         <input type=\"submit\" name=\"qf\" value=\"Show files\">\n\
         </form>",
        boxes = boxes,
        radio = match_radio()
    );
    Html(html::page(
        "Identifier query",
        &body,
        s.project_note().as_deref(),
    ))
}

pub async fn xiquery_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let query = match IdQuery::from_params(&params, s.opts.file_icase, s.current_project) {
        Ok(q) => q,
        Err(e) => return Html(html::error_page(&e.to_string())),
    };

    let start = std::time::Instant::now();
    let mut matched: Vec<(crate::ec::eclass::EcId, &crate::post::Identifier)> = s
        .ids
        .iter()
        .filter(|(&ec, ident)| {
            query.eval(&s.cx.ecs, &s.cx.files, ec, &ident.name, ident.crosses_file)
        })
        .map(|(&ec, ident)| (ec, ident))
        .collect();
    matched.sort_by(|a, b| {
        let ord = a.1.name.cmp(&b.1.name);
        if s.opts.sort_rev {
            ord.reverse()
        } else {
            ord
        }
    });
    tracing::debug!(
        results = matched.len(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "identifier query evaluated"
    );

    let body = if params.contains_key("qf") {
        // The files containing matching identifiers
        let mut files: std::collections::BTreeSet<crate::source::fileid::FileId> =
            Default::default();
        for (ec, _) in &matched {
            files.extend(s.cx.ecs.sorted_files(*ec));
        }
        html::list(files.iter().map(|&f| {
            html::file_link(f, &s.cx.files.get(f).path().to_string_lossy())
        }))
    } else {
        html::list(
            matched
                .iter()
                .map(|(ec, ident)| html::id_link(*ec, &ident.name)),
        )
    };

    let body = format!(
        "<p>{} matches (<a href=\"xiquery.html?{}&qi=1\">link to this query</a>)</p>\n{}",
        matched.len(),
        query.url(),
        body
    );
    Html(html::page(
        "Identifier query results",
        &body,
        s.project_note().as_deref(),
    ))
}

// -------------------------------------------------------------------
// File queries
// -------------------------------------------------------------------

pub async fn fquery_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let mut grid = String::from("<table>\n");
    for (i, m) in FileMetric::all().iter().enumerate() {
        grid.push_str(&format!(
            "<tr><td>{}</td><td>{}</td>\
             <td><input type=\"text\" name=\"n{i}\" size=\"5\" maxlength=\"10\"></td></tr>\n",
            m.label(),
            equality_selection(&format!("c{i}"))
        ));
    }
    grid.push_str("</table>\n");
    let body = format!(
        "<form action=\"xfquery.html\" method=\"get\">\n\
         <input type=\"checkbox\" name=\"writable\" value=\"1\">Writable<br>\n\
         <input type=\"checkbox\" name=\"ro\" value=\"1\">Read-only<br>\n\
         {grid}{radio}<hr>\n\
         File names should match RE \
         <input type=\"text\" name=\"fre\" size=\"20\" maxlength=\"256\"><hr>\n\
         <input type=\"submit\" name=\"qf\" value=\"Show files\">\n\
         </form>",
        grid = grid,
        radio = match_radio()
    );
    Html(html::page("File query", &body, s.project_note().as_deref()))
}

pub async fn xfquery_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let query = match FileQuery::from_params(&params, s.opts.file_icase) {
        Ok(q) => q,
        Err(e) => return Html(html::error_page(&e.to_string())),
    };

    let matched: Vec<_> = s
        .cx
        .files
        .files(false)
        .into_iter()
        .filter(|&f| Some(f) != s.cx.workspace_file && query.eval(s.cx.files.get(f)))
        .collect();

    let paths: Vec<String> = matched
        .iter()
        .map(|&f| s.cx.files.get(f).path().to_string_lossy().into_owned())
        .collect();
    let prefix = if s.opts.remove_fp {
        common_dir_prefix(&paths)
    } else {
        0
    };

    let body = format!(
        "<p>{} matches (<a href=\"xfquery.html?{}&qf=1\">link to this query</a>)</p>\n{}",
        matched.len(),
        query.url(),
        html::list(
            matched
                .iter()
                .zip(&paths)
                .map(|(&f, p)| html::file_link(f, &p[prefix..]))
        )
    );
    Html(html::page(
        "File query results",
        &body,
        s.project_note().as_deref(),
    ))
}

// -------------------------------------------------------------------
// Function queries
// -------------------------------------------------------------------

pub async fn funquery_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let mut grid = String::from("<table>\n");
    for (i, m) in FunMetric::all().iter().enumerate() {
        grid.push_str(&format!(
            "<tr><td>{}</td><td>{}</td>\
             <td><input type=\"text\" name=\"n{i}\" size=\"5\" maxlength=\"10\"></td></tr>\n",
            m.label(),
            equality_selection(&format!("c{i}"))
        ));
    }
    grid.push_str(&format!(
        "<tr><td>Number of direct callers</td><td>{}</td>\
         <td><input type=\"text\" name=\"ncaller\" size=\"5\"></td></tr>\n\
         <tr><td>Number of direct callees</td><td>{}</td>\
         <td><input type=\"text\" name=\"ncallee\" size=\"5\"></td></tr>\n</table>\n",
        equality_selection("ncallerop"),
        equality_selection("ncalleeop")
    ));
    let body = format!(
        "<form action=\"xfunquery.html\" method=\"get\">\n\
         <input type=\"checkbox\" name=\"macro\" value=\"1\">Function-like macro<br>\n\
         <input type=\"checkbox\" name=\"defined\" value=\"1\">Defined in the workspace<br>\n\
         {grid}{radio}<hr>\n\
         Function names should \
         <input type=\"checkbox\" name=\"xfnre\" value=\"1\">not \
         match RE <input type=\"text\" name=\"fnre\" size=\"20\" maxlength=\"256\"><hr>\n\
         <input type=\"submit\" name=\"qfun\" value=\"Show functions\">\n\
         </form>",
        grid = grid,
        radio = match_radio()
    );
    Html(html::page(
        "Function query",
        &body,
        s.project_note().as_deref(),
    ))
}

pub async fn xfunquery_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let query = match FunQuery::from_params(&params) {
        Ok(q) => q,
        Err(e) => return Html(html::error_page(&e.to_string())),
    };

    let mut matched: Vec<_> = s
        .cx
        .calls
        .iter()
        .filter(|(_, node)| query.eval(node))
        .collect();
    matched.sort_by(|a, b| a.1.name.cmp(&b.1.name));

    let body = format!(
        "<p>{} matches (<a href=\"xfunquery.html?{}&qfun=1\">link to this query</a>)</p>\n{}",
        matched.len(),
        query.url(),
        html::list(matched.iter().map(|(id, node)| html::fun_link(*id, &node.name)))
    );
    Html(html::page(
        "Function query results",
        &body,
        s.project_note().as_deref(),
    ))
}
