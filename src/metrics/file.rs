//! Per-file metrics

/// Metrics kept for every source file.
///
/// Queryable through the file query grid; summarized across the workspace
/// by [`crate::metrics::MetricSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMetric {
    /// Number of characters
    Nchar,
    /// Number of lines
    Nline,
    /// Number of statements (post-preprocessing semicolons)
    Nstatement,
    /// Number of string literals
    Nstring,
    /// Number of include directives
    Nincl,
    /// Number of identifier tokens
    Nid,
    /// Number of unique identifiers
    Nuid,
}

impl FileMetric {
    pub const COUNT: usize = 7;

    pub fn all() -> [FileMetric; Self::COUNT] {
        use FileMetric::*;
        [Nchar, Nline, Nstatement, Nstring, Nincl, Nid, Nuid]
    }

    pub fn from_index(i: usize) -> Option<FileMetric> {
        Self::all().get(i).copied()
    }

    pub fn index(self) -> usize {
        Self::all().iter().position(|&m| m == self).unwrap()
    }

    pub fn name(self) -> &'static str {
        match self {
            FileMetric::Nchar => "NCHAR",
            FileMetric::Nline => "NLINE",
            FileMetric::Nstatement => "NSTMT",
            FileMetric::Nstring => "NSTRING",
            FileMetric::Nincl => "NINCL",
            FileMetric::Nid => "NID",
            FileMetric::Nuid => "NUID",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileMetric::Nchar => "Number of characters",
            FileMetric::Nline => "Number of lines",
            FileMetric::Nstatement => "Number of statements",
            FileMetric::Nstring => "Number of string literals",
            FileMetric::Nincl => "Number of include directives",
            FileMetric::Nid => "Number of identifier tokens",
            FileMetric::Nuid => "Number of unique identifiers",
        }
    }
}

/// Counter block attached to each file record.
#[derive(Debug, Clone, Default)]
pub struct FileMetrics {
    counts: [u64; FileMetric::COUNT],
}

impl FileMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, m: FileMetric) -> u64 {
        self.counts[m.index()]
    }

    pub fn add(&mut self, m: FileMetric, n: u64) {
        self.counts[m.index()] += n;
    }

    pub fn inc(&mut self, m: FileMetric) {
        self.add(m, 1);
    }

    pub fn values(&self) -> Vec<f64> {
        self.counts.iter().map(|&c| c as f64).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_indices_round_trip() {
        for (i, m) in FileMetric::all().iter().enumerate() {
            assert_eq!(m.index(), i);
            assert_eq!(FileMetric::from_index(i), Some(*m));
        }
        assert_eq!(FileMetric::from_index(FileMetric::COUNT), None);
    }

    #[test]
    fn counters_accumulate() {
        let mut m = FileMetrics::new();
        m.inc(FileMetric::Nline);
        m.add(FileMetric::Nchar, 40);
        m.inc(FileMetric::Nline);
        assert_eq!(m.get(FileMetric::Nline), 2);
        assert_eq!(m.get(FileMetric::Nchar), 40);
        assert_eq!(m.get(FileMetric::Nstring), 0);
    }
}
