//! Identifier queries
//!
//! Built either from a web parameter map (the iquery form) or from a
//! compact string spec such as `L:writable:unused:lscope`, the form the
//! `-m` monitor flag and the warning report use.

use crate::core::error::{Error, Result};
use crate::ec::attr::{attr_spec_name, ATTR_EXACT, ATTR_READONLY};
use crate::ec::eclass::{EcId, EcStore};
use crate::query::{compile_re, MatchMode};
use crate::source::fileid::FileRegistry;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct IdQuery {
    valid: bool,
    /// Do not evaluate; return `default_ret` for every candidate
    lazy: bool,
    default_ret: bool,
    match_mode: MatchMode,
    /// Marked attribute positions
    attrs: Vec<usize>,
    writable: bool,
    readonly: bool,
    unused: bool,
    xfile: bool,
    name_re: Option<Regex>,
    name_src: String,
    name_neg: bool,
    fname_re: Option<Regex>,
    fname_src: String,
    project: Option<usize>,
}

impl IdQuery {
    /// A query that matches every identifier without evaluation.
    pub fn match_all() -> Self {
        Self {
            valid: true,
            lazy: true,
            default_ret: true,
            ..Default::default()
        }
    }

    /// Parse a compact spec: match-mode letter, then colon-separated
    /// criteria (attribute names, `writable`, `ro`, `unused`, `xfile`).
    pub fn from_spec(spec: &str) -> Result<Self> {
        let mut parts = spec.split(':');
        let mode = parts.next().unwrap_or("");
        let mut q = IdQuery {
            valid: true,
            match_mode: MatchMode::parse(mode)?,
            ..Default::default()
        };
        for term in parts {
            match term {
                "writable" => q.writable = true,
                "ro" | "readonly" => q.readonly = true,
                "unused" => q.unused = true,
                "xfile" => q.xfile = true,
                other => match attr_spec_name(other) {
                    Some(a) => q.attrs.push(a),
                    None => {
                        return Err(Error::Query {
                            message: format!("unknown query term '{other}'"),
                        })
                    }
                },
            }
        }
        Ok(q)
    }

    /// Build from web form parameters (`match`, `ire`, `fre`, `xire`,
    /// `writable`, `ro`, `unused`, `xfile`, and `a<N>` attribute boxes).
    pub fn from_params(
        params: &HashMap<String, String>,
        icase: bool,
        project: Option<usize>,
    ) -> Result<Self> {
        let mode = params.get("match").map(String::as_str).unwrap_or("Y");
        let mut q = IdQuery {
            valid: true,
            match_mode: MatchMode::parse(mode)?,
            writable: params.contains_key("writable"),
            readonly: params.contains_key("ro"),
            unused: params.contains_key("unused"),
            xfile: params.contains_key("xfile"),
            name_neg: params.contains_key("xire"),
            project,
            ..Default::default()
        };
        for k in params.keys() {
            if let Some(idx) = k.strip_prefix('a').and_then(|s| s.parse::<usize>().ok()) {
                q.attrs.push(idx);
            }
        }
        q.attrs.sort_unstable();
        if let Some(ire) = params.get("ire").filter(|s| !s.is_empty()) {
            q.name_re = Some(compile_re(ire, false)?);
            q.name_src = ire.clone();
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
        !self.lazy
    }

    /// Evaluate against one equivalence class.
    pub fn eval(
        &self,
        ecs: &EcStore,
        files: &FileRegistry,
        ec: EcId,
        name: &str,
        xfile: bool,
    ) -> bool {
        if !self.valid {
            return false;
        }
        if self.lazy {
            return self.default_ret;
        }
        let data = ecs.data(ec);

        let matched = if self.match_mode == MatchMode::Exact {
            // Class attributes must equal the marked set over the
            // comparable positions; flags are constraints.
            let mut ok = ATTR_EXACT
                .iter()
                .all(|&a| data.attrs.test(a) == self.attrs.contains(&a));
            if self.writable {
                ok = ok && !data.attrs.test(ATTR_READONLY);
            }
            if self.readonly {
                ok = ok && data.attrs.test(ATTR_READONLY);
            }
            if self.unused {
                ok = ok && ecs.is_unused(ec);
            }
            // Cross-file is implicitly false unless marked
            ok && xfile == self.xfile
        } else {
            let mut criteria: Vec<bool> = self
                .attrs
                .iter()
                .map(|&a| data.attrs.test(a))
                .collect();
            if self.writable {
                criteria.push(!data.attrs.test(ATTR_READONLY));
            }
            if self.readonly {
                criteria.push(data.attrs.test(ATTR_READONLY));
            }
            if self.unused {
                criteria.push(ecs.is_unused(ec));
            }
            if self.xfile {
                criteria.push(xfile);
            }
            self.match_mode.combine(&criteria)
        };
        if !matched {
            return false;
        }

        if let Some(re) = &self.name_re {
            if re.is_match(name) == self.name_neg {
                return false;
            }
        }
        if let Some(re) = &self.fname_re {
            let any = data
                .members
                .iter()
                .any(|t| re.is_match(&files.get(t.file).path().to_string_lossy()));
            if !any {
                return false;
            }
        }
        if let Some(p) = self.project {
            if !data.attrs.test(p) {
                return false;
            }
        }
        true
    }

    /// Regenerate the query as URL parameters.
    pub fn url(&self) -> String {
        let mut parts = vec![format!("match={}", self.match_mode.letter())];
        for a in &self.attrs {
            parts.push(format!("a{a}=1"));
        }
        for (flag, name) in [
            (self.writable, "writable"),
            (self.readonly, "ro"),
            (self.unused, "unused"),
            (self.xfile, "xfile"),
            (self.name_neg, "xire"),
        ] {
            if flag {
                parts.push(format!("{name}=1"));
            }
        }
        if !self.name_src.is_empty() {
            parts.push(format!("ire={}", urlencoding::encode(&self.name_src)));
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
    use crate::ec::attr::{ATTR_IDENTIFIER, ATTR_LSCOPE, ATTR_MACRO, ATTR_ORDINARY};
    use crate::source::tokid::Tokid;
    use std::io::Write;

    fn store_with(attrs: &[usize], members: usize) -> (EcStore, EcId) {
        let mut s = EcStore::new();
        let mut ec = s.ec_for(Tokid::new(crate::source::fileid::FileId(0), 0), 3, false, None);
        for i in 1..members {
            let other = s.ec_for(
                Tokid::new(crate::source::fileid::FileId(0), (i * 10) as u64),
                3,
                false,
                None,
            );
            ec = s.merge(ec, other);
        }
        for &a in attrs {
            s.set_attr(ec, a);
        }
        (s, ec)
    }

    fn registry() -> (FileRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.c");
        std::fs::File::create(&path).unwrap().write_all(b"x").unwrap();
        let mut reg = FileRegistry::new();
        reg.intern(&path, &[]).unwrap();
        (reg, dir)
    }

    #[test]
    fn spec_all_of_matches_unused_project_scoped() {
        let q = IdQuery::from_spec("L:writable:unused:lscope").unwrap();
        assert!(q.is_valid());
        let (s, ec) = store_with(&[ATTR_IDENTIFIER, ATTR_ORDINARY, ATTR_LSCOPE], 1);
        let (files, _dir) = registry();
        assert!(q.eval(&s, &files, ec, "x", false));
        // A used (two-member) class no longer matches
        let (s2, ec2) = store_with(&[ATTR_IDENTIFIER, ATTR_ORDINARY, ATTR_LSCOPE], 2);
        assert!(!q.eval(&s2, &files, ec2, "x", false));
    }

    #[test]
    fn exact_match_is_the_static_candidate_query() {
        let q = IdQuery::from_spec("T:writable:obj:pscope").unwrap();
        let (files, _dir) = registry();
        // helper: ordinary, project scope, also a function; the function
        // marker is outside the compared set
        let (s, ec) = store_with(
            &[
                ATTR_IDENTIFIER,
                ATTR_ORDINARY,
                crate::ec::attr::ATTR_FUNCTION,
                ATTR_LSCOPE,
            ],
            2,
        );
        assert!(q.eval(&s, &files, ec, "helper", false));
        // Cross-file identifiers are implicitly excluded
        assert!(!q.eval(&s, &files, ec, "helper", true));
        // A macro does not exact-match the ordinary/pscope set
        let (s2, ec2) = store_with(&[ATTR_IDENTIFIER, ATTR_MACRO, ATTR_LSCOPE], 2);
        assert!(!q.eval(&s2, &files, ec2, "helper", false));
    }

    #[test]
    fn name_regex_with_negation() {
        let mut params = HashMap::new();
        params.insert("match".to_string(), "Y".to_string());
        params.insert("ire".to_string(), "^foo".to_string());
        let q = IdQuery::from_params(&params, false, None).unwrap();
        let (s, ec) = store_with(&[ATTR_IDENTIFIER], 1);
        let (files, _dir) = registry();
        assert!(q.eval(&s, &files, ec, "foobar", false));
        assert!(!q.eval(&s, &files, ec, "bar", false));

        params.insert("xire".to_string(), "1".to_string());
        let q = IdQuery::from_params(&params, false, None).unwrap();
        assert!(!q.eval(&s, &files, ec, "foobar", false));
        assert!(q.eval(&s, &files, ec, "bar", false));
    }

    #[test]
    fn lazy_query_matches_everything_without_eval() {
        let q = IdQuery::match_all();
        assert!(q.is_valid());
        assert!(!q.need_eval());
        let (s, ec) = store_with(&[], 1);
        let (files, _dir) = registry();
        assert!(q.eval(&s, &files, ec, "anything", true));
    }

    #[test]
    fn unknown_spec_terms_are_rejected(){
        assert!(IdQuery::from_spec("L:writable:frobnicate").is_err());
        assert!(IdQuery::from_spec("Q:writable").is_err());
    }

    #[test]
    fn url_round_trips_the_marked_state() {
        let q = IdQuery::from_spec("L:writable:unused").unwrap();
        let url = q.url();
        assert!(url.contains("match=L"));
        assert!(url.contains("writable=1"));
        assert!(url.contains("unused=1"));
    }
}
