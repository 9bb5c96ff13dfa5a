//! Function pages: details, caller/callee lists, and the call graph

use crate::graph::call::Direction;
use crate::metrics::fun::FunMetric;
use crate::web::html;
use crate::web::server::AppState;
use axum::extract::{Query, State};
use axum::response::Html;
use std::collections::HashMap;

pub async fn fun_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let Some(id) = s.call_param(&params) else {
        return Html(html::error_page("missing or invalid function id"));
    };
    let node = s.cx.calls.get(id);

    let mut props = vec![
        format!(
            "Kind: {}",
            if node.is_macro {
                "function-like macro"
            } else {
                "function"
            }
        ),
        format!("Defined: {}", if node.is_defined() { "Yes" } else { "No" }),
        format!("Direct callers: {}", node.fanin()),
        format!("Direct callees: {}", node.fanout()),
        format!("Call sites: {}", node.call_sites.len()),
    ];
    {
        let t = node.declaration;
        let line = s.line_of(t);
        let path = s.cx.files.get(t.file).path().to_string_lossy().into_owned();
        props.push(format!(
            "Declared: {}",
            html::src_link(t.file, line, &format!("{path}:{line}"))
        ));
    }
    if let Some(t) = node.definition {
        let line = s.line_of(t);
        let path = s.cx.files.get(t.file).path().to_string_lossy().into_owned();
        props.push(format!(
            "Defined: {}",
            html::src_link(t.file, line, &format!("{path}:{line}"))
        ));
    }

    let metrics = if node.is_defined() && !node.is_macro {
        let rows: Vec<String> = FunMetric::all()
            .iter()
            .map(|&m| format!("{}: {}", m.label(), node.metric(m)))
            .collect();
        format!("<h2>Metrics</h2>\n{}", html::list(rows))
    } else {
        String::new()
    };

    let ops = html::list([
        format!("<a href=\"funlist.html?f={}&n=u\">Direct callers</a>", id.0),
        format!("<a href=\"funlist.html?f={}&n=U\">All callers</a>", id.0),
        format!("<a href=\"funlist.html?f={}&n=d\">Direct callees</a>", id.0),
        format!("<a href=\"funlist.html?f={}&n=D\">All callees</a>", id.0),
    ]);

    let body = format!(
        "<h2><code>{}</code></h2>\n{}\n{}\n<h2>Call lists</h2>\n{}",
        html::escape(&node.name),
        html::list(props),
        metrics,
        ops
    );
    Html(html::page(
        &format!("Function: {}", node.name),
        &body,
        s.project_note().as_deref(),
    ))
}

pub async fn funlist_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let mut s = st.session.write().unwrap();
    let Some(id) = s.call_param(&params) else {
        return Html(html::error_page("missing or invalid function id"));
    };
    let spec = params.get("n").map(String::as_str).unwrap_or("u");
    let (dir, transitive, title) = match spec {
        "u" => (Direction::Callers, false, "Direct callers"),
        "U" => (Direction::Callers, true, "All callers"),
        "d" => (Direction::Callees, false, "Direct callees"),
        "D" => (Direction::Callees, true, "All callees"),
        _ => return Html(html::error_page("bad list specification")),
    };

    let ids: Vec<crate::graph::call::CallId> = if transitive {
        s.cx.calls.transitive(id, dir)
    } else {
        let node = s.cx.calls.get(id);
        match dir {
            Direction::Callers => node.callers.iter().copied().collect(),
            Direction::Callees => node.callees.iter().copied().collect(),
        }
    };

    let mut named: Vec<(crate::graph::call::CallId, String)> = ids
        .into_iter()
        .map(|i| (i, s.cx.calls.get(i).name.clone()))
        .collect();
    named.sort_by(|a, b| a.1.cmp(&b.1));

    let name = s.cx.calls.get(id).name.clone();
    let body = format!(
        "<p>{count} functions</p>\n{}",
        html::list(named.iter().map(|(i, n)| html::fun_link(*i, n))),
        count = named.len(),
    );
    Html(html::page(
        &format!("{title} of {name}"),
        &body,
        s.project_note().as_deref(),
    ))
}

/// The whole call graph as plain text.
pub async fn cgraph_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let mut text = String::new();
    for (_, node) in s.cx.calls.iter() {
        for &callee in &node.callees {
            text.push_str(&format!(
                "{} calls {}\n",
                node.name,
                s.cx.calls.get(callee).name
            ));
        }
    }
    let body = format!("<pre>{}</pre>", html::escape(&text));
    Html(html::page("Call graph", &body, s.project_note().as_deref()))
}
