//! Identifier post-processing
//!
//! After pass 1, every participating file is re-read byte by byte against
//! the equivalence-class map. Classes that were never classified as
//! identifiers (keywords get classes too) are destroyed, classes rejected
//! by the monitoring filter are destroyed, and the survivors are
//! materialized into the identifier table with their spelled-out text.
//! Line-end offsets and the per-file identifier metrics are collected on
//! the same scan.

use crate::core::error::Result;
use crate::ec::attr::ATTR_IDENTIFIER;
use crate::ec::eclass::EcId;
use crate::metrics::file::FileMetric;
use crate::metrics::id::IdSummary;
use crate::query::IdQuery;
use crate::source::fileid::FileId;
use crate::source::tokid::Tokid;
use crate::workspace::Analysis;
use std::collections::{BTreeMap, HashSet};

/// Per-class projection used by the query and refactoring layers.
#[derive(Debug, Clone)]
pub struct Identifier {
    pub name: String,
    pub new_name: Option<String>,
    pub replaced: bool,
    pub crosses_file: bool,
}

impl Identifier {
    pub fn new(name: String) -> Self {
        Self {
            name,
            new_name: None,
            replaced: false,
            crosses_file: false,
        }
    }

    /// Queue a rename; takes effect at `write_quit`.
    pub fn set_replacement(&mut self, new_name: String) {
        self.new_name = Some(new_name);
        self.replaced = true;
    }
}

/// Process-wide identifier table keyed by class root.
pub type IdProp = BTreeMap<EcId, Identifier>;

/// Analyze one file: populate `ids`, drop dead classes, build the
/// line-end index, and fill identifier metrics.
/// Returns true when the file contains an unused identifier.
pub fn file_analyze(
    cx: &mut Analysis,
    monitor: Option<&IdQuery>,
    ids: &mut IdProp,
    id_sum: &mut IdSummary,
    fid: FileId,
) -> Result<bool> {
    let bytes = cx.files.read(fid)?;
    let mut has_unused = false;
    let mut unique_here: HashSet<EcId> = HashSet::new();
    let mut nline = 0u64;
    let mut pos = 0usize;

    while pos < bytes.len() {
        let t = Tokid::new(fid, pos as u64);
        if let Some(ec) = cx.ecs.lookup(t) {
            if let Some(mon) = monitor.filter(|m| m.need_eval()) {
                if !mon.eval(&cx.ecs, &cx.files, ec, "", false) {
                    cx.ecs.remove(ec);
                    // Fall through to plain character handling
                    if bytes[pos] == b'\n' {
                        nline += 1;
                        cx.files.get_mut(fid).add_line_end(pos as u64);
                    }
                    pos += 1;
                    continue;
                }
            }
            if cx.ecs.test_attr(ec, ATTR_IDENTIFIER) {
                let len = cx.ecs.data(ec).len as usize;
                let name = String::from_utf8_lossy(&bytes[pos..(pos + len).min(bytes.len())])
                    .into_owned();
                ids.entry(ec).or_insert_with(|| Identifier::new(name));
                id_sum.add_occurrence();
                if unique_here.insert(ec) {
                    cx.files.get_mut(fid).metrics.inc(FileMetric::Nuid);
                }
                if cx.ecs.is_unused(ec) {
                    has_unused = true;
                }
                pos += len;
                continue;
            }
            // A class for a non-identifier token (keyword); clear it
            cx.ecs.remove(ec);
        }
        if bytes[pos] == b'\n' {
            nline += 1;
            cx.files.get_mut(fid).add_line_end(pos as u64);
        }
        pos += 1;
    }

    let m = &mut cx.files.get_mut(fid).metrics;
    m.add(FileMetric::Nchar, bytes.len() as u64);
    m.add(FileMetric::Nline, nline);
    Ok(has_unused)
}

/// Compute the cross-file flag of every surviving identifier and fold the
/// identifier summary.
pub fn compute_xfile(cx: &Analysis, ids: &mut IdProp, id_sum: &mut IdSummary) {
    for (&ec, ident) in ids.iter_mut() {
        ident.crosses_file = cx.ecs.sorted_files(ec).len() > 1;
        id_sum.add_unique(&cx.ecs, ec, ident.crosses_file);
    }
}
