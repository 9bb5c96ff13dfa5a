//! File queries: writable/read-only selection plus a per-metric
//! comparison grid and a file name regex.

use crate::core::error::Result;
use crate::metrics::file::FileMetric;
use crate::query::{compile_re, CmpOp, MatchMode};
use crate::source::fileid::FileRecord;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FileQuery {
    valid: bool,
    match_mode: MatchMode,
    writable: bool,
    readonly: bool,
    /// One `(operator, operand)` slot per file metric
    metric_preds: Vec<(usize, CmpOp, f64)>,
    fname_re: Option<Regex>,
    fname_src: String,
}

impl FileQuery {
    /// Build from the fquery form: `match`, `writable`, `ro`, `fre`, and
    /// per-metric `c<N>` (operator index) + `n<N>` (operand) pairs.
    pub fn from_params(params: &HashMap<String, String>, icase: bool) -> Result<Self> {
        let mode = params.get("match").map(String::as_str).unwrap_or("Y");
        let mut q = FileQuery {
            valid: true,
            match_mode: MatchMode::parse(mode)?,
            writable: params.contains_key("writable"),
            readonly: params.contains_key("ro"),
            ..Default::default()
        };
        for i in 0..FileMetric::COUNT {
            let op = params
                .get(&format!("c{i}"))
                .and_then(|s| s.parse::<usize>().ok())
                .map(CmpOp::from_index)
                .unwrap_or(CmpOp::Ignore);
            let val = params
                .get(&format!("n{i}"))
                .and_then(|s| s.parse::<f64>().ok());
            if let (false, Some(v)) = (op == CmpOp::Ignore, val) {
                q.metric_preds.push((i, op, v));
            }
        }
        if let Some(fre) = params.get("fre").filter(|s| !s.is_empty()) {
            q.fname_re = Some(compile_re(fre, icase)?);
            q.fname_src = fre.clone();
        }
        Ok(q)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn need_eval(&self) -> bool {
        true
    }

    pub fn eval(&self, rec: &FileRecord) -> bool {
        let mut criteria = Vec::new();
        if self.writable {
            criteria.push(!rec.read_only());
        }
        if self.readonly {
            criteria.push(rec.read_only());
        }
        for &(i, op, operand) in &self.metric_preds {
            let m = FileMetric::from_index(i).expect("metric index in range");
            criteria.push(op.apply(rec.metrics.get(m) as f64, operand));
        }
        if !self.match_mode.combine(&criteria) {
            return false;
        }
        if let Some(re) = &self.fname_re {
            if !re.is_match(&rec.path().to_string_lossy()) {
                return false;
            }
        }
        true
    }

    pub fn url(&self) -> String {
        let mut parts = vec![format!("match={}", self.match_mode.letter())];
        if self.writable {
            parts.push("writable=1".to_string());
        }
        if self.readonly {
            parts.push("ro=1".to_string());
        }
        for &(i, op, v) in &self.metric_preds {
            parts.push(format!("c{i}={}", op.index()));
            parts.push(format!("n{i}={v}"));
        }
        if !self.fname_src.is_empty() {
            parts.push(format!("fre={}", urlencoding::encode(&self.fname_src)));
        }
        parts.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fileid::FileRegistry;
    use std::io::Write;

    fn registry_with_file(text: &[u8]) -> (FileRegistry, crate::source::fileid::FileId, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.c");
        std::fs::File::create(&path).unwrap().write_all(text).unwrap();
        let mut reg = FileRegistry::new();
        let id = reg.intern(&path, &[]).unwrap();
        (reg, id, dir)
    }

    #[test]
    fn metric_grid_predicates() {
        let (mut reg, id, _dir) = registry_with_file(b"int x;\n");
        reg.get_mut(id).metrics.add(FileMetric::Nchar, 100);

        let mut params = HashMap::new();
        params.insert("match".to_string(), "L".to_string());
        params.insert(format!("c{}", FileMetric::Nchar.index()), "4".to_string()); // >
        params.insert(format!("n{}", FileMetric::Nchar.index()), "50".to_string());
        let q = FileQuery::from_params(&params, false).unwrap();
        assert!(q.eval(reg.get(id)));

        params.insert(format!("n{}", FileMetric::Nchar.index()), "200".to_string());
        let q = FileQuery::from_params(&params, false).unwrap();
        assert!(!q.eval(reg.get(id)));
    }

    #[test]
    fn writable_selection_and_name_regex() {
        let (reg, id, _dir) = registry_with_file(b"\n");
        let mut params = HashMap::new();
        params.insert("match".to_string(), "L".to_string());
        params.insert("writable".to_string(), "1".to_string());
        params.insert("fre".to_string(), r"\.c$".to_string());
        let q = FileQuery::from_params(&params, false).unwrap();
        assert!(q.eval(reg.get(id)));

        params.insert("fre".to_string(), r"\.h$".to_string());
        let q = FileQuery::from_params(&params, false).unwrap();
        assert!(!q.eval(reg.get(id)));
    }
}
