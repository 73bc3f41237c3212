//! Bindings and run reports of the annotation engine.

use crate::data::domain::FieldId;

/// Fields bound on one partition's row-table.
#[derive(Clone, Debug, PartialEq)]
pub struct Bindings {
    /// Input variables, in configured order.
    pub features: Vec<FieldId>,
    pub event: FieldId,
    pub max_score: FieldId,
    pub max_index: FieldId,
}

/// Outcome of annotating one partition.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionReport {
    pub name: String,
    pub rows: usize,
    /// Rows routed to each fold, indexed by fold.
    pub rows_per_fold: Vec<usize>,
    pub dur_ms: u128,
}

/// Outcome of a committed run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    pub partitions: Vec<PartitionReport>,
}

impl RunReport {
    pub fn rows(&self) -> usize {
        self.partitions.iter().map(|p| p.rows).sum()
    }
}
