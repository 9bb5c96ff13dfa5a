//! Function queries over the call graph: kind selection, per-metric
//! comparisons, and caller/callee count predicates.

use crate::core::error::Result;
use crate::graph::call::CallNode;
use crate::metrics::fun::FunMetric;
use crate::query::{compile_re, CmpOp, MatchMode};
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FunQuery {
    valid: bool,
    match_mode: MatchMode,
    /// Function-like macros
    macros: bool,
    /// Functions with a definition in the workspace
    defined: bool,
    metric_preds: Vec<(usize, CmpOp, f64)>,
    ncaller: (CmpOp, f64),
    ncallee: (CmpOp, f64),
    name_re: Option<Regex>,
    name_src: String,
    name_neg: bool,
}

impl FunQuery {
    /// Build from the funquery form: `match`, `macro`, `defined`, `fnre`,
    /// `xfnre`, per-metric `c<N>`/`n<N>`, and `ncallerop`/`ncaller`,
    /// `ncalleeop`/`ncallee`.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mode = params.get("match").map(String::as_str).unwrap_or("Y");
        let mut q = FunQuery {
            valid: true,
            match_mode: MatchMode::parse(mode)?,
            macros: params.contains_key("macro"),
            defined: params.contains_key("defined"),
            name_neg: params.contains_key("xfnre"),
            ..Default::default()
        };
        for i in 0..FunMetric::COUNT {
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
        let count_pred = |opk: &str, nk: &str| -> (CmpOp, f64) {
            let op = params
                .get(opk)
                .and_then(|s| s.parse::<usize>().ok())
                .map(CmpOp::from_index)
                .unwrap_or(CmpOp::Ignore);
            let val = params.get(nk).and_then(|s| s.parse::<f64>().ok());
            match val {
                Some(v) => (op, v),
                None => (CmpOp::Ignore, 0.0),
            }
        };
        q.ncaller = count_pred("ncallerop", "ncaller");
        q.ncallee = count_pred("ncalleeop", "ncallee");
        if let Some(re) = params.get("fnre").filter(|s| !s.is_empty()) {
            q.name_re = Some(compile_re(re, false)?);
            q.name_src = re.clone();
        }
        Ok(q)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn need_eval(&self) -> bool {
        true
    }

    pub fn eval(&self, node: &CallNode) -> bool {
        let mut criteria = Vec::new();
        if self.macros {
            criteria.push(node.is_macro);
        }
        if self.defined {
            criteria.push(node.is_defined());
        }
        for &(i, op, operand) in &self.metric_preds {
            let m = FunMetric::from_index(i).expect("metric index in range");
            // Body metrics only mean something for defined functions
            criteria.push(node.is_defined() && op.apply(node.metric(m), operand));
        }
        if self.ncaller.0 != CmpOp::Ignore {
            criteria.push(self.ncaller.0.apply(node.fanin() as f64, self.ncaller.1));
        }
        if self.ncallee.0 != CmpOp::Ignore {
            criteria.push(self.ncallee.0.apply(node.fanout() as f64, self.ncallee.1));
        }
        if !self.match_mode.combine(&criteria) {
            return false;
        }
        if let Some(re) = &self.name_re {
            if re.is_match(&node.name) == self.name_neg {
                return false;
            }
        }
        true
    }

    pub fn url(&self) -> String {
        let mut parts = vec![format!("match={}", self.match_mode.letter())];
        if self.macros {
            parts.push("macro=1".to_string());
        }
        if self.defined {
            parts.push("defined=1".to_string());
        }
        if self.name_neg {
            parts.push("xfnre=1".to_string());
        }
        for &(i, op, v) in &self.metric_preds {
            parts.push(format!("c{i}={}", op.index()));
            parts.push(format!("n{i}={v}"));
        }
        if self.ncaller.0 != CmpOp::Ignore {
            parts.push(format!("ncallerop={}", self.ncaller.0.index()));
            parts.push(format!("ncaller={}", self.ncaller.1));
        }
        if self.ncallee.0 != CmpOp::Ignore {
            parts.push(format!("ncalleeop={}", self.ncallee.0.index()));
            parts.push(format!("ncallee={}", self.ncallee.1));
        }
        if !self.name_src.is_empty() {
            parts.push(format!("fnre={}", urlencoding::encode(&self.name_src)));
        }
        parts.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec::eclass::EcStore;
    use crate::graph::call::CallGraph;
    use crate::source::fileid::FileId;
    use crate::source::tokid::Tokid;

    fn node_with_callers(n: usize) -> (CallGraph, crate::graph::call::CallId) {
        let mut ecs = EcStore::new();
        let mut g = CallGraph::new();
        let ec = ecs.ec_for(Tokid::new(FileId(0), 0), 4, false, None);
        let f = g.get_or_insert(&mut ecs, ec, "main_loop", Tokid::new(FileId(0), 0), false);
        g.get_mut(f).definition = Some(Tokid::new(FileId(0), 0));
        for i in 0..n {
            let cec = ecs.ec_for(Tokid::new(FileId(0), 100 + i as u64 * 10), 4, false, None);
            let c = g.get_or_insert(
                &mut ecs,
                cec,
                &format!("caller{i}"),
                Tokid::new(FileId(0), 100),
                false,
            );
            g.add_edge(c, f);
        }
        (g, f)
    }

    #[test]
    fn caller_count_predicate() {
        let (g, f) = node_with_callers(3);
        let mut params = HashMap::new();
        params.insert("match".to_string(), "L".to_string());
        params.insert("ncallerop".to_string(), "4".to_string()); // >
        params.insert("ncaller".to_string(), "2".to_string());
        let q = FunQuery::from_params(&params).unwrap();
        assert!(q.eval(g.get(f)));

        params.insert("ncaller".to_string(), "5".to_string());
        let q = FunQuery::from_params(&params).unwrap();
        assert!(!q.eval(g.get(f)));
    }

    #[test]
    fn name_regex_and_defined_flag() {
        let (g, f) = node_with_callers(0);
        let mut params = HashMap::new();
        params.insert("match".to_string(), "L".to_string());
        params.insert("defined".to_string(), "1".to_string());
        params.insert("fnre".to_string(), "^main".to_string());
        let q = FunQuery::from_params(&params).unwrap();
        assert!(q.eval(g.get(f)));

        params.insert("fnre".to_string(), "^helper".to_string());
        let q = FunQuery::from_params(&params).unwrap();
        assert!(!q.eval(g.get(f)));
    }
}
