//! The identifier page: properties, occurrences, and the rename form

use crate::ec::attr::{attr_name, ATTR_BASE};
use crate::web::html;
use crate::web::pages::local_access;
use crate::web::server::AppState;
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Html;
use axum::Form;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;

pub async fn id_page(
    State(st): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let s = st.session.read().unwrap();
    let Some(ec) = s.ec_param(&params) else {
        return Html(html::error_page("missing or obsolete identifier id"));
    };
    let ident = &s.ids[&ec];
    let data = s.cx.ecs.data(ec);

    let mut props: Vec<String> = Vec::new();
    for a in 0..ATTR_BASE {
        let val = data.attrs.test(a);
        if s.opts.show_true && !val {
            continue;
        }
        props.push(format!(
            "{}: {}",
            attr_name(a),
            if val { "Yes" } else { "No" }
        ));
    }
    for (pid, pname) in s.cx.projects.iter() {
        if data.attrs.test(pid) {
            props.push(format!("Member of project: {}", html::escape(pname)));
        }
    }
    props.push(format!(
        "Crosses file boundary: {}",
        if ident.crosses_file { "Yes" } else { "No" }
    ));
    props.push(format!(
        "Unused: {}",
        if s.cx.ecs.is_unused(ec) { "Yes" } else { "No" }
    ));
    props.push(format!("Matched tokens: {}", data.members.len()));

    let files = html::list(s.cx.ecs.sorted_files(ec).into_iter().map(|f| {
        html::file_link(f, &s.cx.files.get(f).path().to_string_lossy())
    }));

    let occurrences = html::list(data.members.iter().take(100).map(|t| {
        let line = s.line_of(*t);
        let path = s.cx.files.get(t.file).path().to_string_lossy().into_owned();
        html::src_link(t.file, line, &format!("{path}:{line}"))
    }));

    let rename = if ident.replaced {
        format!(
            "<p>Substitution to <code>{}</code> is queued.</p>",
            html::escape(ident.new_name.as_deref().unwrap_or(""))
        )
    } else {
        String::new()
    };

    let body = format!(
        "<h2>Identifier: <code>{name}</code></h2>\n{props}\
         <h2>Files</h2>\n{files}\
         <h2>Occurrences</h2>\n{occurrences}\
         {rename}\
         <h2>Substitute</h2>\n\
         <form action=\"id.html?id={id}\" method=\"post\">\n\
         <input type=\"hidden\" name=\"id\" value=\"{id}\">\n\
         New name <input type=\"text\" name=\"sname\" size=\"20\" maxlength=\"256\">\n\
         <input type=\"submit\" value=\"Substitute identifier\">\n\
         </form>",
        name = html::escape(&ident.name),
        props = html::list(props),
        files = files,
        occurrences = occurrences,
        rename = rename,
        id = ec.0,
    );
    Html(html::page(
        &format!("Identifier: {}", ident.name),
        &body,
        s.project_note().as_deref(),
    ))
}

#[derive(Deserialize)]
pub struct RenameForm {
    pub id: u32,
    pub sname: String,
}

fn valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && crate::parse::ctoken::keyword(s).is_none()
}

/// POST handler: queue a rename for every member of the class.
pub async fn id_set_name(
    State(st): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(form): Form<RenameForm>,
) -> Html<String> {
    if let Err(page) = local_access(&addr) {
        return Html(page);
    }
    let mut s = st.session.write().unwrap();
    let Some(ec) = s.cx.ecs.resolve(form.id) else {
        return Html(html::error_page("missing or obsolete identifier id"));
    };
    let new_name = form.sname.trim().to_string();
    if !valid_identifier(&new_name) {
        return Html(html::error_page(&format!(
            "'{new_name}' is not a valid identifier"
        )));
    }
    let Some(ident) = s.ids.get_mut(&ec) else {
        return Html(html::error_page("missing or obsolete identifier id"));
    };
    let old = ident.name.clone();
    ident.set_replacement(new_name.clone());
    let body = format!(
        "<p>Substitution of <code>{}</code> with <code>{}</code> is queued; \
         it will be applied when you <a href=\"sexit.html\">exit applying changes</a>.</p>\n\
         <p><a href=\"id.html?id={}\">Back to the identifier</a></p>",
        html::escape(&old),
        html::escape(&new_name),
        ec.0
    );
    Html(html::page(
        "Substitution queued",
        &body,
        s.project_note().as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(valid_identifier("foo2"));
        assert!(valid_identifier("_x"));
        assert!(!valid_identifier(""));
        assert!(!valid_identifier("2foo"));
        assert!(!valid_identifier("a-b"));
        assert!(!valid_identifier("while"));
    }
}
