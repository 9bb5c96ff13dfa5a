//! Transactional source rewriting
//!
//! Executes every queued rename: streams each affected writable file byte
//! by byte, substituting replaced identifier spans, into a sibling `.repl`
//! file, then swaps it in with checkout/checkin hooks around the rename.
//! A failure at any step leaves the original file intact.

use crate::core::config::RewriteConfig;
use crate::core::error::{Error, Result};
use crate::ec::attr::ATTR_IDENTIFIER;
use crate::post::identifier::IdProp;
use crate::source::fileid::FileId;
use crate::source::tokid::Tokid;
use crate::workspace::Analysis;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of a rewrite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub replacements: usize,
    pub files: usize,
}

/// Apply every pending replacement. Files are processed in id order;
/// read-only files are never touched.
pub fn write_quit(cx: &Analysis, ids: &IdProp, hooks: &RewriteConfig) -> Result<RewriteStats> {
    let mut process: BTreeSet<FileId> = BTreeSet::new();
    for (&ec, ident) in ids {
        if !ident.replaced {
            continue;
        }
        for f in cx.ecs.sorted_files(ec) {
            if !cx.files.get(f).read_only() {
                process.insert(f);
            }
        }
    }

    let mut replacements = 0;
    for &fid in &process {
        replacements += file_replace(cx, ids, hooks, fid)?;
    }
    Ok(RewriteStats {
        replacements,
        files: process.len(),
    })
}

/// Rewrite one file; returns the number of substitutions made.
fn file_replace(cx: &Analysis, ids: &IdProp, hooks: &RewriteConfig, fid: FileId) -> Result<usize> {
    let rec = cx.files.get(fid);
    let path = rec.path().to_path_buf();
    let bytes = cx.files.read(fid)?;
    info!("processing file {}", path.display());

    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut pos = 0usize;
    let mut count = 0usize;

    while pos < bytes.len() {
        let t = Tokid::new(fid, pos as u64);
        if let Some(ec) = cx.ecs.lookup_ro(t) {
            if cx.ecs.test_attr(ec, ATTR_IDENTIFIER) {
                if let Some(ident) = ids.get(&ec).filter(|i| i.replaced) {
                    let len = cx.ecs.data(ec).len as usize;
                    let new_text = ident.new_name.as_deref().unwrap_or(&ident.name);
                    out.extend_from_slice(new_text.as_bytes());
                    pos += len;
                    count += 1;
                    continue;
                }
            }
        }
        out.push(bytes[pos]);
        pos += 1;
    }

    if count == 0 {
        return Ok(0);
    }

    let repl_path = repl_name(&path);
    if repl_path.exists() {
        return Err(Error::Rewrite {
            path: path.clone(),
            message: format!("scratch file {} already exists", repl_path.display()),
        });
    }
    std::fs::write(&repl_path, &out)?;

    run_hook(&hooks.checkout_hook, &path);
    if let Err(e) = std::fs::rename(&repl_path, &path) {
        let _ = std::fs::remove_file(&repl_path);
        return Err(Error::Rewrite {
            path,
            message: format!("cannot replace original: {e}"),
        });
    }
    run_hook(&hooks.checkin_hook, &path);
    Ok(count)
}

/// The deterministic scratch name next to the original.
fn repl_name(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".repl");
    PathBuf::from(os)
}

fn run_hook(cmd: &str, path: &Path) {
    if cmd.is_empty() {
        return;
    }
    match std::process::Command::new(cmd).arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("hook {cmd} exited with {status}"),
        Err(e) => warn!("hook {cmd} not run: {e}"),
    }
}
