//! Per-function metrics
//!
//! Counted metrics accumulate while the parser walks a function body; the
//! derived ones are computed on demand from the counters and the call
//! graph's fan-in/fan-out.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunMetric {
    // Counted during the body walk
    Nstmt,
    Nparam,
    Nif,
    Nswitch,
    Nfor,
    Nwhile,
    Ndo,
    Ncase,
    /// Branching operators: `&&`, `||`, `?:`
    Ncc2op,
    Nop,
    Nuop,
    Nid,
    Nuid,
    Nnconst,
    Nclit,
    // Derived
    Fanin,
    Fanout,
    Ccycl1,
    Ccycl2,
    Ccycl3,
    Cstruc,
    Chal,
    Iflow,
}

impl FunMetric {
    pub const COUNTED: usize = 15;
    pub const COUNT: usize = 23;

    pub fn all() -> [FunMetric; Self::COUNT] {
        use FunMetric::*;
        [
            Nstmt, Nparam, Nif, Nswitch, Nfor, Nwhile, Ndo, Ncase, Ncc2op, Nop, Nuop, Nid, Nuid,
            Nnconst, Nclit, Fanin, Fanout, Ccycl1, Ccycl2, Ccycl3, Cstruc, Chal, Iflow,
        ]
    }

    pub fn from_index(i: usize) -> Option<FunMetric> {
        Self::all().get(i).copied()
    }

    pub fn index(self) -> usize {
        Self::all().iter().position(|&m| m == self).unwrap()
    }

    pub fn name(self) -> &'static str {
        use FunMetric::*;
        match self {
            Nstmt => "NSTMT",
            Nparam => "NPARAM",
            Nif => "NIF",
            Nswitch => "NSWITCH",
            Nfor => "NFOR",
            Nwhile => "NWHILE",
            Ndo => "NDO",
            Ncase => "NCASE",
            Ncc2op => "NCC2OP",
            Nop => "NOP",
            Nuop => "NUOP",
            Nid => "NID",
            Nuid => "NUID",
            Nnconst => "NNCONST",
            Nclit => "NCLIT",
            Fanin => "FANIN",
            Fanout => "FANOUT",
            Ccycl1 => "CCYCL1",
            Ccycl2 => "CCYCL2",
            Ccycl3 => "CCYCL3",
            Cstruc => "CSTRUC",
            Chal => "CHAL",
            Iflow => "IFLOW",
        }
    }

    pub fn label(self) -> &'static str {
        use FunMetric::*;
        match self {
            Nstmt => "Number of statements",
            Nparam => "Number of parameters",
            Nif => "Number of if statements",
            Nswitch => "Number of switch statements",
            Nfor => "Number of for statements",
            Nwhile => "Number of while statements",
            Ndo => "Number of do statements",
            Ncase => "Number of case labels",
            Ncc2op => "Number of branching operators",
            Nop => "Number of operators",
            Nuop => "Number of unique operators",
            Nid => "Number of identifier tokens",
            Nuid => "Number of unique identifiers",
            Nnconst => "Number of numeric constants",
            Nclit => "Number of character literals",
            Fanin => "Fan-in (number of calling functions)",
            Fanout => "Fan-out (number of called functions)",
            Ccycl1 => "Cyclomatic complexity (control statements)",
            Ccycl2 => "Extended cyclomatic complexity (includes branching operators)",
            Ccycl3 => "Maximum cyclomatic complexity (includes all switch branches)",
            Cstruc => "Structure complexity (Henry and Kafura)",
            Chal => "Halstead volume",
            Iflow => "Information flow metric (Henry and Selig)",
        }
    }
}

/// Counter block attached to each defined function or function-like macro.
#[derive(Debug, Clone, Default)]
pub struct FunMetrics {
    counts: [u64; FunMetric::COUNTED],
    operators: BTreeSet<String>,
    id_ecs: BTreeSet<u32>,
    summarized: bool,
}

impl FunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&mut self, m: FunMetric) {
        debug_assert!(m.index() < FunMetric::COUNTED);
        self.counts[m.index()] += 1;
    }

    pub fn count(&self, m: FunMetric) -> u64 {
        self.counts[m.index()]
    }

    pub fn set_count(&mut self, m: FunMetric, v: u64) {
        self.counts[m.index()] = v;
    }

    /// Record an operator occurrence.
    pub fn add_operator(&mut self, op: &str) {
        self.counts[FunMetric::Nop.index()] += 1;
        self.operators.insert(op.to_string());
    }

    /// Record an identifier occurrence; `ec` is its class index.
    pub fn add_id(&mut self, ec: u32) {
        self.counts[FunMetric::Nid.index()] += 1;
        self.id_ecs.insert(ec);
    }

    /// Fold the unique-operand sets into their counters; runs once.
    pub fn summarize(&mut self) {
        if self.summarized {
            return;
        }
        self.summarized = true;
        self.counts[FunMetric::Nuop.index()] = self.operators.len() as u64;
        self.counts[FunMetric::Nuid.index()] = self.id_ecs.len() as u64;
        self.operators.clear();
        self.id_ecs.clear();
    }

    /// Value of any metric; fan-in/fan-out come from the call graph.
    pub fn get(&self, m: FunMetric, fanin: u64, fanout: u64) -> f64 {
        use FunMetric::*;
        match m {
            Fanin => fanin as f64,
            Fanout => fanout as f64,
            Ccycl1 => {
                (self.count(Nif)
                    + self.count(Nswitch)
                    + self.count(Nfor)
                    + self.count(Nwhile)
                    + self.count(Ndo)
                    + 1) as f64
            }
            Ccycl2 => self.get(Ccycl1, fanin, fanout) + self.count(Ncc2op) as f64,
            Ccycl3 => {
                self.get(Ccycl2, fanin, fanout) - self.count(Nswitch) as f64
                    + self.count(Ncase) as f64
            }
            Cstruc => ((fanin * fanout) as f64).powi(2),
            Iflow => self.get(Cstruc, fanin, fanout) * self.get(Ccycl1, fanin, fanout),
            Chal => {
                // Numeric constants and character literals count as unique
                // operands
                let logarg = (self.count(Nuop)
                    + self.count(Nuid)
                    + self.count(Nnconst)
                    + self.count(Nclit)) as f64;
                if logarg == 0.0 {
                    0.0
                } else {
                    (self.count(Nop) + self.count(Nid) + self.count(Nnconst) + self.count(Nclit))
                        as f64
                        * logarg.log2()
                }
            }
            counted => self.count(counted) as f64,
        }
    }

    pub fn values(&self, fanin: u64, fanout: u64) -> Vec<f64> {
        FunMetric::all()
            .iter()
            .map(|&m| self.get(m, fanin, fanout))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclomatic_variants() {
        let mut m = FunMetrics::new();
        // One if, one for, one switch with three case labels
        m.inc(FunMetric::Nif);
        m.inc(FunMetric::Nfor);
        m.inc(FunMetric::Nswitch);
        for _ in 0..3 {
            m.inc(FunMetric::Ncase);
        }
        assert_eq!(m.get(FunMetric::Ccycl1, 0, 0), 4.0);
        assert_eq!(m.get(FunMetric::Ccycl2, 0, 0), 4.0);
        assert_eq!(m.get(FunMetric::Ccycl3, 0, 0), 6.0);
    }

    #[test]
    fn nested_control_statements_all_count() {
        let mut m = FunMetrics::new();
        m.inc(FunMetric::Nif);
        m.inc(FunMetric::Nif);
        m.inc(FunMetric::Nwhile);
        m.inc(FunMetric::Ncc2op);
        assert_eq!(m.get(FunMetric::Ccycl1, 0, 0), 4.0);
        assert_eq!(m.get(FunMetric::Ccycl2, 0, 0), 5.0);
    }

    #[test]
    fn structure_and_information_flow() {
        let m = FunMetrics::new();
        assert_eq!(m.get(FunMetric::Cstruc, 3, 2), 36.0);
        // ccycl1 of an empty body is 1
        assert_eq!(m.get(FunMetric::Iflow, 3, 2), 36.0);
    }

    #[test]
    fn halstead_volume() {
        let mut m = FunMetrics::new();
        m.add_operator("+");
        m.add_operator("+");
        m.add_operator("*");
        m.add_id(1);
        m.add_id(2);
        m.add_id(1);
        m.summarize();
        // N = 3 ops + 3 ids, n = 2 unique ops + 2 unique ids
        let expected = 6.0 * 4.0_f64.log2();
        assert!((m.get(FunMetric::Chal, 0, 0) - expected).abs() < 1e-9);
    }

    #[test]
    fn halstead_of_empty_body_is_zero() {
        let mut m = FunMetrics::new();
        m.summarize();
        assert_eq!(m.get(FunMetric::Chal, 0, 0), 0.0);
    }
}
