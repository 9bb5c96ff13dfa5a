//! The `-r` warning report
//!
//! Canned identifier queries plus unused-include warnings, printed to
//! stderr in `path:line: message` form. A single include directive can
//! resolve to different files across compilation configurations, so
//! include warnings coalesce per source line and fire only when no file
//! included at that line is required.

use crate::post::identifier::IdProp;
use crate::query::IdQuery;
use crate::source::fileid::FileId;
use crate::workspace::Analysis;
use std::collections::{BTreeMap, BTreeSet};

const ID_REPORTS: [(&str, &str); 4] = [
    (
        "unused project scoped writable identifier",
        "L:writable:unused:lscope",
    ),
    (
        "unused file scoped writable identifier",
        "L:writable:unused:cscope",
    ),
    ("unused writable macro", "L:writable:unused:macro"),
    (
        "writable identifier should be made static",
        "T:writable:obj:pscope",
    ),
];

/// One include site: the files ever included at this line, and whether
/// any of them was required.
struct SiteInfo {
    required: bool,
    files: BTreeSet<FileId>,
}

pub fn warning_report(cx: &Analysis, ids: &IdProp) {
    for (message, spec) in ID_REPORTS {
        let query = IdQuery::from_spec(spec).expect("canned report query");
        for (&ec, ident) in ids {
            if !query.eval(&cx.ecs, &cx.files, ec, &ident.name, ident.crosses_file) {
                continue;
            }
            let Some(&t) = cx.ecs.data(ec).members.iter().next() else {
                continue;
            };
            let rec = cx.files.get(t.file);
            eprintln!(
                "{}:{}: {}: {}",
                rec.path().display(),
                rec.line_number(t.offset),
                ident.name,
                message
            );
        }
    }

    for unit in cx.files.files(true) {
        let rec = cx.files.get(unit);
        if rec.read_only() || Some(unit) == cx.workspace_file {
            continue;
        }
        let mut sites: BTreeMap<usize, SiteInfo> = BTreeMap::new();
        for (&inc, det) in rec.includes() {
            if !det.direct {
                continue;
            }
            for &line in &det.lines {
                sites
                    .entry(line)
                    .and_modify(|s| {
                        s.required |= det.required;
                        s.files.insert(inc);
                    })
                    .or_insert_with(|| SiteInfo {
                        required: det.required,
                        files: [inc].into_iter().collect(),
                    });
            }
        }
        for (line, site) in &sites {
            if site.required {
                continue;
            }
            for &f in &site.files {
                eprintln!(
                    "{}:{}: unused included file {}",
                    rec.path().display(),
                    line,
                    cx.files.get(f).path().display()
                );
            }
        }
    }
}
