//! HTML generation helpers

use crate::ec::eclass::EcId;
use crate::graph::call::CallId;
use crate::source::fileid::FileId;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Escape text for HTML body context.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// A complete page with the standard head and footer.
pub fn page(title: &str, body: &str, project_note: Option<&str>) -> String {
    let note = match project_note {
        Some(p) => format!("<p><b>Project {} is currently selected</b></p>\n", escape(p)),
        None => String::new(),
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n\
         <meta name=\"generator\" content=\"scour {VERSION}\">\n\
         <title>{title}</title>\n</head>\n<body>\n\
         <h1>{title}</h1>\n{body}\n{note}\
         <p><a href=\"index.html\">Main page</a></p>\n\
         <hr><font size=\"-1\">scour {VERSION}</font>\n\
         </body>\n</html>\n",
        title = escape(title),
        body = body,
    )
}

pub fn error_page(message: &str) -> String {
    page("Error", &format!("<p>{}</p>", escape(message)), None)
}

pub fn file_link(id: FileId, path: &str) -> String {
    format!("<a href=\"file.html?id={}\">{}</a>", id.0, escape(path))
}

pub fn id_link(ec: EcId, name: &str) -> String {
    format!("<a href=\"id.html?id={}\">{}</a>", ec.0, escape(name))
}

pub fn fun_link(id: CallId, name: &str) -> String {
    format!("<a href=\"fun.html?f={}\">{}</a>", id.0, escape(name))
}

pub fn src_link(id: FileId, line: usize, text: &str) -> String {
    format!(
        "<a href=\"src.html?id={}#{}\">{}</a>",
        id.0,
        line,
        escape(text)
    )
}

/// An unordered list from pre-rendered items.
pub fn list(items: impl IntoIterator<Item = String>) -> String {
    let mut out = String::from("<ul>\n");
    for i in items {
        out.push_str("<li>");
        out.push_str(&i);
        out.push_str("</li>\n");
    }
    out.push_str("</ul>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_html_metacharacters() {
        assert_eq!(escape("a < b && c > \"d\""), "a &lt; b &amp;&amp; c &gt; &quot;d&quot;");
    }

    #[test]
    fn page_wraps_title_and_footer() {
        let p = page("Files", "<p>body</p>", Some("kernel"));
        assert!(p.contains("<title>Files</title>"));
        assert!(p.contains("Project kernel is currently selected"));
        assert!(p.contains("index.html"));
    }
}
