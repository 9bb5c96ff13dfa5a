//! Workspace-wide identifier counts

use crate::ec::attr::{attr_name, ATTR_BASE};
use crate::ec::eclass::{EcId, EcStore};

/// Aggregate identifier statistics, filled during post-processing.
#[derive(Debug, Default)]
pub struct IdSummary {
    /// Identifier token occurrences seen in source
    pub occurrences: u64,
    /// Distinct equivalence classes
    pub unique: u64,
    /// Classes spanning more than one file
    pub cross_file: u64,
    /// Classes with a single member and file or project scope
    pub unused: u64,
    /// Distinct classes carrying each base attribute
    per_attr: [u64; ATTR_BASE],
}

impl IdSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per identifier occurrence during file analysis.
    pub fn add_occurrence(&mut self) {
        self.occurrences += 1;
    }

    /// Called once per surviving class after analysis.
    pub fn add_unique(&mut self, ecs: &EcStore, ec: EcId, cross_file: bool) {
        self.unique += 1;
        if cross_file {
            self.cross_file += 1;
        }
        if ecs.is_unused(ec) {
            self.unused += 1;
        }
        let data = ecs.data(ec);
        for (i, slot) in self.per_attr.iter_mut().enumerate() {
            if data.attrs.test(i) {
                *slot += 1;
            }
        }
    }

    /// (attribute name, distinct class count) rows for display.
    pub fn rows(&self) -> Vec<(&'static str, u64)> {
        (0..ATTR_BASE).map(|i| (attr_name(i), self.per_attr[i])).collect()
    }
}
