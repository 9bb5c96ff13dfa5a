//! The top-level menu

use crate::web::html;
use crate::web::server::AppState;
use axum::extract::State;
use axum::response::Html;

pub async fn index_page(State(st): State<AppState>) -> Html<String> {
    let s = st.session.read().unwrap();
    let body = format!(
        "<h2>Files</h2>\n{}\
         <h2>Identifiers</h2>\n{}\
         <h2>Functions and macros</h2>\n{}\
         <h2>Operations</h2>\n{}",
        html::list([
            "<a href=\"xfquery.html?match=Y&qf=1\">All files</a>".to_string(),
            "<a href=\"fquery.html\">Specify file query</a>".to_string(),
            "<a href=\"fmetrics.html\">File metrics</a>".to_string(),
        ]),
        html::list([
            "<a href=\"xiquery.html?match=Y&qi=1\">All identifiers</a>".to_string(),
            "<a href=\"xiquery.html?match=L&writable=1&unused=1&qi=1\">Unused writable identifiers</a>"
                .to_string(),
            "<a href=\"xiquery.html?match=L&writable=1&xfile=1&qi=1\">Writable identifiers crossing files</a>"
                .to_string(),
            "<a href=\"iquery.html\">Specify identifier query</a>".to_string(),
            "<a href=\"idmetrics.html\">Identifier metrics</a>".to_string(),
        ]),
        html::list([
            "<a href=\"xfunquery.html?match=Y&qfun=1\">All functions</a>".to_string(),
            "<a href=\"funquery.html\">Specify function query</a>".to_string(),
            "<a href=\"cgraph.html\">Call graph</a>".to_string(),
        ]),
        html::list([
            "<a href=\"sproject.html\">Select active project</a>".to_string(),
            "<a href=\"options.html\">Global options</a>".to_string(),
            "<a href=\"sexit.html\">Exit applying changes</a>".to_string(),
            "<a href=\"qexit.html\">Exit abandoning changes</a>".to_string(),
        ]),
    );
    Html(html::page("scour main page", &body, s.project_note().as_deref()))
}
