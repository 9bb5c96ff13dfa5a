//! File identity registry
//!
//! Interns canonical paths to dense ids and owns everything the workspace
//! knows per file: access policy, compilation-unit and requiredness flags,
//! the line-end index built during post-processing, the include dependency
//! maps, per-file project attributes, and the file metric counters.

use crate::core::error::{Error, Result};
use crate::ec::attr::AttrSet;
use crate::metrics::file::FileMetrics;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Dense handle for a participating source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

/// How one file includes another.
#[derive(Debug, Clone, Default)]
pub struct IncDetails {
    /// A `#include` for this file is textually written in the includer
    pub direct: bool,
    /// The included file contributes a definition used by the includer's
    /// compilation
    pub required: bool,
    /// Source lines (1-based) of the directly-written include directives
    pub lines: BTreeSet<usize>,
}

#[derive(Debug)]
pub struct FileRecord {
    path: PathBuf,
    read_only: bool,
    compilation_unit: bool,
    required: bool,
    gc_done: bool,
    line_ends: Vec<u64>,
    includes: BTreeMap<FileId, IncDetails>,
    included_by: BTreeMap<FileId, IncDetails>,
    pub attrs: AttrSet,
    pub metrics: FileMetrics,
}

impl FileRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn compilation_unit(&self) -> bool {
        self.compilation_unit
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn gc_done(&self) -> bool {
        self.gc_done
    }

    pub fn includes(&self) -> &BTreeMap<FileId, IncDetails> {
        &self.includes
    }

    pub fn included_by(&self) -> &BTreeMap<FileId, IncDetails> {
        &self.included_by
    }

    pub fn set_compilation_unit(&mut self, v: bool) {
        self.compilation_unit = v;
    }

    pub fn set_required(&mut self, v: bool) {
        self.required = v;
    }

    pub fn set_gc_done(&mut self, v: bool) {
        self.gc_done = v;
    }

    /// Append a line-end byte offset; offsets must arrive in order.
    pub fn add_line_end(&mut self, offset: u64) {
        debug_assert!(self.line_ends.last().map_or(true, |&l| l < offset));
        self.line_ends.push(offset);
    }

    /// 1-based line number containing `offset`, from the line-end index.
    pub fn line_number(&self, offset: u64) -> usize {
        self.line_ends.partition_point(|&end| end < offset) + 1
    }

    pub fn line_count(&self) -> usize {
        self.line_ends.len()
    }
}

/// Process-wide registry of interned files.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Vec<FileRecord>,
    by_path: HashMap<PathBuf, FileId>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `path`, creating a record on first reference.
    ///
    /// The stored path is canonical, so the same file reached through
    /// different relative spellings interns to one id. A file is read-only
    /// if the filesystem says so or a workspace `ro_prefix` covers it.
    pub fn intern(&mut self, path: &Path, ro_prefixes: &[PathBuf]) -> Result<FileId> {
        let canonical = std::fs::canonicalize(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(&id) = self.by_path.get(&canonical) {
            return Ok(id);
        }

        let fs_readonly = std::fs::metadata(&canonical)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false);
        let policy_readonly = ro_prefixes.iter().any(|p| canonical.starts_with(p));

        let id = FileId(self.files.len() as u32);
        self.files.push(FileRecord {
            path: canonical.clone(),
            read_only: fs_readonly || policy_readonly,
            compilation_unit: false,
            required: false,
            gc_done: false,
            line_ends: Vec::new(),
            includes: BTreeMap::new(),
            included_by: BTreeMap::new(),
            attrs: AttrSet::new(),
            metrics: FileMetrics::new(),
        });
        self.by_path.insert(canonical, id);
        Ok(id)
    }

    pub fn get(&self, id: FileId) -> &FileRecord {
        &self.files[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: FileId) -> &mut FileRecord {
        &mut self.files[id.0 as usize]
    }

    pub fn lookup(&self, id: FileId) -> Option<&FileRecord> {
        self.files.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Snapshot of file ids in definition order.
    pub fn files(&self, only_compilation_units: bool) -> Vec<FileId> {
        (0..self.files.len() as u32)
            .map(FileId)
            .filter(|&id| !only_compilation_units || self.get(id).compilation_unit)
            .collect()
    }

    /// Read the file's current on-disk contents.
    pub fn read(&self, id: FileId) -> Result<Vec<u8>> {
        let path = &self.get(id).path;
        std::fs::read(path).map_err(|source| Error::Open {
            path: path.clone(),
            source,
        })
    }

    /// Record a directly-written include: `includer` line `line` resolves
    /// to `included`.
    pub fn add_include(&mut self, includer: FileId, included: FileId, line: usize) {
        let entry = self.get_mut(includer).includes.entry(included).or_default();
        entry.direct = true;
        entry.lines.insert(line);
        let back = self.get_mut(included).included_by.entry(includer).or_default();
        back.direct = true;
        back.lines.insert(line);
    }

    /// Record a transitive inclusion discovered during the dependency
    /// post-pass, or update the requiredness of an existing entry.
    pub fn record_unit_dependency(&mut self, root: FileId, file: FileId, required: bool) {
        let entry = self.get_mut(root).includes.entry(file).or_default();
        entry.required = required;
        let back = self.get_mut(file).included_by.entry(root).or_default();
        back.required = required;
        if required {
            self.get_mut(file).required = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn interning_is_idempotent_across_spellings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.c");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"int x;\n")
            .unwrap();

        let mut reg = FileRegistry::new();
        let a = reg.intern(&path, &[]).unwrap();
        let dotted = dir.path().join(".").join("a.c");
        let b = reg.intern(&dotted, &[]).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn missing_file_reports_open_error() {
        let mut reg = FileRegistry::new();
        let err = reg.intern(Path::new("/no/such/file.c"), &[]).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn ro_prefix_marks_files_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sys.h");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"typedef int t;\n")
            .unwrap();

        let mut reg = FileRegistry::new();
        let prefix = std::fs::canonicalize(dir.path()).unwrap();
        let id = reg.intern(&path, &[prefix]).unwrap();
        assert!(reg.get(id).read_only());
    }

    #[test]
    fn line_number_is_a_binary_search_over_line_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.c");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"ab\ncd\nef\n")
            .unwrap();

        let mut reg = FileRegistry::new();
        let id = reg.intern(&path, &[]).unwrap();
        let rec = reg.get_mut(id);
        // Offsets of the newline characters
        rec.add_line_end(2);
        rec.add_line_end(5);
        rec.add_line_end(8);
        assert_eq!(rec.line_number(0), 1);
        assert_eq!(rec.line_number(2), 1);
        assert_eq!(rec.line_number(3), 2);
        assert_eq!(rec.line_number(7), 3);
    }

    #[test]
    fn include_maps_record_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.c", "u.h"] {
            std::fs::File::create(dir.path().join(name))
                .unwrap()
                .write_all(b"\n")
                .unwrap();
        }
        let mut reg = FileRegistry::new();
        let a = reg.intern(&dir.path().join("a.c"), &[]).unwrap();
        let u = reg.intern(&dir.path().join("u.h"), &[]).unwrap();

        reg.add_include(a, u, 3);
        reg.add_include(a, u, 9);
        let det = &reg.get(a).includes()[&u];
        assert!(det.direct);
        assert_eq!(det.lines.iter().copied().collect::<Vec<_>>(), vec![3, 9]);
        assert!(reg.get(u).included_by()[&a].direct);

        reg.record_unit_dependency(a, u, false);
        assert!(!reg.get(a).includes()[&u].required);
        assert!(!reg.get(u).required());
        reg.record_unit_dependency(a, u, true);
        assert!(reg.get(u).required());
    }
}
