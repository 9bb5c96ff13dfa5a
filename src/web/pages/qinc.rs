//! Include-relation queries for one file

use crate::web::html;
use crate::web::server::AppState;
use axum::extract::{Query, State};
use axum::response::Html;
use std::collections::HashMap;

pub async fn qinc_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let Some(fid) = s.file_param(&params) else {
        return Html(html::error_page("missing or invalid file id"));
    };
    let rec = s.cx.files.get(fid);
    let pathname = rec.path().to_string_lossy().into_owned();

    let writable = params.contains_key("writable");
    let direct = params.contains_key("direct");
    let unused = params.contains_key("unused");
    let includes = params.contains_key("includes");

    let map = if includes {
        rec.includes()
    } else {
        rec.included_by()
    };

    let mut items = Vec::new();
    for (&other, det) in map {
        let orec = s.cx.files.get(other);
        if writable && orec.read_only() {
            continue;
        }
        if direct && !det.direct {
            continue;
        }
        if unused && det.required {
            continue;
        }
        let mut item = html::file_link(other, &orec.path().to_string_lossy());
        if det.direct {
            let lines: Vec<String> = det.lines.iter().map(|l| l.to_string()).collect();
            item.push_str(&format!(" - line {}", lines.join(" ")));
        }
        if !det.required {
            item.push_str(" (not required)");
        }
        items.push(item);
    }

    let title = if includes {
        format!("Files included by {pathname}")
    } else {
        format!("Files including {pathname}")
    };
    let body = format!("<p>{} files</p>\n{}", items.len(), html::list(items));
    Html(html::page(&title, &body, s.project_note().as_deref()))
}
