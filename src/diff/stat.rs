//! diff::stat
//!
//! Aggregation of a diff entry stream into counts and percentages,
//! and whole-table change summaries.
//!
//! All percentages are computed against the old-side totals (old row
//! count for row percentages, old cell count for cell percentages), so
//! "2 Rows Added (100.00%)" over a 2-row table reads as "the table
//! doubled". A zero denominator yields 0.00% rather than an error.

use serde::{Deserialize, Serialize};

use crate::core::snapshot::TableState;
use crate::core::types::TableName;
use crate::core::value::Value;

use super::row_diff::{DiffKind, RowDiff};

/// Aggregated counts for one table's row diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub rows_unmodified: u64,
    pub rows_added: u64,
    pub rows_deleted: u64,
    pub rows_modified: u64,
    pub cells_added: u64,
    pub cells_deleted: u64,
    pub cells_modified: u64,
    pub old_row_count: u64,
    pub new_row_count: u64,
    pub old_cell_count: u64,
    pub new_cell_count: u64,
}

impl DiffStats {
    /// Aggregate a computed row diff, without re-running the
    /// differencer.
    ///
    /// `old_col_count` and `new_col_count` are the column counts of the
    /// two schemas, used for the cell totals.
    pub fn from_diff(diff: &RowDiff, old_col_count: usize, new_col_count: usize) -> Self {
        let mut stats = DiffStats {
            rows_unmodified: diff.rows_unmodified,
            old_row_count: diff.old_row_count,
            new_row_count: diff.new_row_count,
            old_cell_count: diff.old_row_count * old_col_count as u64,
            new_cell_count: diff.new_row_count * new_col_count as u64,
            ..Default::default()
        };

        for entry in &diff.entries {
            match entry.kind {
                DiffKind::Added => {
                    stats.rows_added += entry.count;
                    if let Some(row) = &entry.to {
                        stats.cells_added += entry.count * row.non_null_cells();
                    }
                }
                DiffKind::Deleted => {
                    stats.rows_deleted += entry.count;
                    if let Some(row) = &entry.from {
                        stats.cells_deleted += entry.count * row.non_null_cells();
                    }
                }
                DiffKind::Modified => {
                    stats.rows_modified += entry.count;
                    if let (Some(from), Some(to)) = (&entry.from, &entry.to) {
                        stats.tally_modified_cells(from.values(), to.values());
                    }
                }
            }
        }
        stats
    }

    /// Classify the cell-level change inside one modified row. The two
    /// images are positionally aligned by the differencer.
    fn tally_modified_cells<'a>(
        &mut self,
        from: impl Iterator<Item = &'a Value>,
        to: impl Iterator<Item = &'a Value>,
    ) {
        for (old, new) in from.zip(to) {
            match (old.is_null(), new.is_null()) {
                (true, true) => {}
                (true, false) => self.cells_added += 1,
                (false, true) => self.cells_deleted += 1,
                (false, false) => {
                    if old != new {
                        self.cells_modified += 1;
                    }
                }
            }
        }
    }

    pub fn rows_unmodified_pct(&self) -> f64 {
        pct(self.rows_unmodified, self.old_row_count)
    }

    pub fn rows_added_pct(&self) -> f64 {
        pct(self.rows_added, self.old_row_count)
    }

    pub fn rows_deleted_pct(&self) -> f64 {
        pct(self.rows_deleted, self.old_row_count)
    }

    pub fn rows_modified_pct(&self) -> f64 {
        pct(self.rows_modified, self.old_row_count)
    }

    pub fn cells_added_pct(&self) -> f64 {
        pct(self.cells_added, self.old_cell_count)
    }

    pub fn cells_deleted_pct(&self) -> f64 {
        pct(self.cells_deleted, self.old_cell_count)
    }

    pub fn cells_modified_pct(&self) -> f64 {
        pct(self.cells_modified, self.old_cell_count)
    }

    /// Render the stat block, one line per count plus the entry-count
    /// footers.
    pub fn render(&self) -> Vec<String> {
        vec![
            format!(
                "{} Rows Unmodified ({:.2}%)",
                self.rows_unmodified,
                self.rows_unmodified_pct()
            ),
            format!("{} Rows Added ({:.2}%)", self.rows_added, self.rows_added_pct()),
            format!(
                "{} Rows Deleted ({:.2}%)",
                self.rows_deleted,
                self.rows_deleted_pct()
            ),
            format!(
                "{} Rows Modified ({:.2}%)",
                self.rows_modified,
                self.rows_modified_pct()
            ),
            format!("{} Cells Added ({:.2}%)", self.cells_added, self.cells_added_pct()),
            format!(
                "{} Cells Deleted ({:.2}%)",
                self.cells_deleted,
                self.cells_deleted_pct()
            ),
            format!(
                "{} Cells Modified ({:.2}%)",
                self.cells_modified,
                self.cells_modified_pct()
            ),
            format!(
                "({} Row Entries vs {} Row Entries)",
                self.old_row_count, self.new_row_count
            ),
            format!(
                "({} Cell Entries vs {} Cell Entries)",
                self.old_cell_count, self.new_cell_count
            ),
        ]
    }
}

fn pct(n: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        n as f64 * 100.0 / denominator as f64
    }
}

/// Whole-table change classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableDiffType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl std::fmt::Display for TableDiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TableDiffType::Added => "added",
            TableDiffType::Modified => "modified",
            TableDiffType::Deleted => "deleted",
            TableDiffType::Renamed => "renamed",
        };
        write!(f, "{}", s)
    }
}

/// One row of the table-level summary: which table changed, how, and
/// whether data and schema changed independently.
///
/// A pure rename (same schema, same rows, new name) is classified
/// `renamed` with both booleans false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDeltaSummary {
    /// The table's name on the new side (old side, when deleted).
    pub table: TableName,
    /// The old name, when it differs from `table`.
    pub from_table: Option<TableName>,
    pub diff_type: TableDiffType,
    pub data_change: bool,
    pub schema_change: bool,
}

impl TableDeltaSummary {
    /// Classify one table's change between two snapshots.
    ///
    /// Returns `None` when the table exists on neither side.
    pub fn classify(
        from: Option<(&TableName, &TableState)>,
        to: Option<(&TableName, &TableState)>,
    ) -> Option<TableDeltaSummary> {
        match (from, to) {
            (None, None) => None,
            (None, Some((name, state))) => Some(TableDeltaSummary {
                table: name.clone(),
                from_table: None,
                diff_type: TableDiffType::Added,
                data_change: !state.rows().is_empty(),
                schema_change: true,
            }),
            (Some((name, state)), None) => Some(TableDeltaSummary {
                table: name.clone(),
                from_table: None,
                diff_type: TableDiffType::Deleted,
                data_change: !state.rows().is_empty(),
                schema_change: true,
            }),
            (Some((from_name, from_state)), Some((to_name, to_state))) => {
                let renamed = from_name != to_name;
                Some(TableDeltaSummary {
                    table: to_name.clone(),
                    from_table: renamed.then(|| from_name.clone()),
                    diff_type: if renamed {
                        TableDiffType::Renamed
                    } else {
                        TableDiffType::Modified
                    },
                    data_change: from_state.rows().content_hash() != to_state.rows().content_hash(),
                    schema_change: from_state.schema().content_hash()
                        != to_state.schema().content_hash(),
                })
            }
        }
    }
}
