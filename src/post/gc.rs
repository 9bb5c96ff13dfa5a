//! Include-dependency post-pass
//!
//! Runs once per compilation unit, right after its parse. Under the
//! monitoring filter it drops rejected classes (unsound by design: a class
//! discarded here might have been unified by a later unit). It then works
//! out which of the files touched by this unit actually contribute a used
//! definition, recording transitive inclusions and requiredness in the
//! unit root's include map.

use crate::ec::eclass::EcId;
use crate::query::IdQuery;
use crate::source::fileid::FileId;
use crate::workspace::Analysis;
use std::collections::HashSet;
use tracing::debug;

pub fn garbage_collect(cx: &mut Analysis, monitor: Option<&IdQuery>, root: FileId) {
    cx.files.get_mut(root).set_compilation_unit(true);

    let mut touched: Vec<FileId> = Vec::new();
    let mut dropped = 0usize;
    let mut seen = 0usize;

    for fid in cx.files.files(false) {
        if cx.files.get(fid).gc_done() {
            continue;
        }
        cx.files.get_mut(fid).set_required(false);
        touched.push(fid);

        if let Some(mon) = monitor.filter(|m| m.need_eval()) {
            for (t, _) in cx.ecs.mapped_tokids_in_file(fid) {
                if let Some(ec) = cx.ecs.lookup(t) {
                    seen += 1;
                    if !mon.eval(&cx.ecs, &cx.files, ec, "", false) {
                        cx.ecs.remove(ec);
                        dropped += 1;
                    }
                }
            }
        }
        cx.files.get_mut(fid).set_gc_done(true);
    }
    if monitor.is_some() {
        debug!("monitor dropped {dropped} of {seen} classes");
    }

    // Classes with a member in the root: the set of things this unit uses
    let mut root_classes: HashSet<EcId> = HashSet::new();
    for (t, _) in cx.ecs.mapped_tokids_in_file(root) {
        if let Some(ec) = cx.ecs.lookup(t) {
            root_classes.insert(ec);
        }
    }

    // Requiredness for every file this unit pulled in: the files newly
    // touched plus everything already recorded as a direct include.
    let mut candidates: HashSet<FileId> = touched.into_iter().collect();
    candidates.extend(cx.files.get(root).includes().keys().copied());

    let mut ordered: Vec<FileId> = candidates.into_iter().collect();
    ordered.sort();
    for fid in ordered {
        if fid == root || Some(fid) == cx.workspace_file {
            continue;
        }
        let mut required = false;
        for (t, _) in cx.ecs.mapped_tokids_in_file(fid) {
            if let Some(ec) = cx.ecs.lookup(t) {
                if root_classes.contains(&ec) {
                    required = true;
                    break;
                }
            }
        }
        cx.files.record_unit_dependency(root, fid, required);
    }
}
