//! conflict
//!
//! The conflict store: a per-table record of unresolved merge
//! conflicts, kept until explicitly resolved.
//!
//! # Lifecycle
//!
//! A failed merge records its conflicts here and leaves the working
//! snapshot holding the `ours` image of each conflicted table. A table
//! with any unresolved conflict is "in conflict": it blocks commits and
//! rejects writes to the conflicting rows, while non-conflicting rows
//! stay writable. [`ConflictStore::resolve`] applies an ours/theirs
//! policy to the working snapshot and clears the table's record.
//!
//! # Granularity
//!
//! Keyed tables conflict row by row, with base/ours/theirs images per
//! key. Schema disagreements, delete-versus-modify races, and keyless
//! count ambiguities have no row identity to hang a record on, so they
//! are table-level conflicts resolved by swapping the whole table.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::row::RowSetError;
use crate::core::snapshot::{Snapshot, SnapshotError, TableState};
use crate::core::types::TableName;
use crate::core::value::{Row, RowKey};

/// Errors from conflict store operations.
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("table '{0}' has no recorded conflicts")]
    NoConflicts(TableName),

    #[error("table '{0}' is not present in the working snapshot")]
    UnknownTable(TableName),

    #[error(transparent)]
    RowSet(#[from] RowSetError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Which side wins when resolving a table's conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    Ours,
    Theirs,
}

/// One conflicted row of a keyed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowConflict {
    pub key: RowKey,
    pub base: Option<Row>,
    pub ours: Option<Row>,
    pub theirs: Option<Row>,
}

/// Why a whole table is in conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableConflictKind {
    /// One side deleted the table while the other modified it.
    DeletedModified,
    /// Both sides changed the same keyless row content to different
    /// occurrence counts; without row identity there is nothing finer
    /// to report.
    KeylessAmbiguity,
    /// The parents' schema edits could not be combined: colliding
    /// column definitions, or diverging indexes, checks, or foreign
    /// keys.
    SchemaIncompatible,
}

impl std::fmt::Display for TableConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TableConflictKind::DeletedModified => "table with same name deleted and modified",
            TableConflictKind::KeylessAmbiguity => "keyless rows changed on both sides",
            TableConflictKind::SchemaIncompatible => "schema definitions conflict between parents",
        };
        write!(f, "{}", s)
    }
}

/// Everything recorded against one table after a failed merge.
///
/// `ours_state`/`theirs_state` are the full table images from the two
/// merge parents; `None` means the side deleted the table. They back
/// table-level resolution.
#[derive(Debug, Clone, Default)]
pub struct ConflictSet {
    pub rows: Vec<RowConflict>,
    pub table_conflict: Option<TableConflictKind>,
    pub ours_state: Option<TableState>,
    pub theirs_state: Option<TableState>,
}

impl ConflictSet {
    /// Number of conflicts in this set: one per row, plus one for a
    /// table-level conflict.
    pub fn count(&self) -> usize {
        self.rows.len() + usize::from(self.table_conflict.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether a write touching `key` must be rejected.
    pub fn blocks_key(&self, key: &RowKey) -> bool {
        self.table_conflict.is_some() || self.rows.iter().any(|c| &c.key == key)
    }
}

/// All unresolved conflicts, indexed by table.
#[derive(Debug, Clone, Default)]
pub struct ConflictStore {
    tables: BTreeMap<TableName, ConflictSet>,
}

impl ConflictStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a table's conflicts, replacing any prior record.
    ///
    /// Empty sets are discarded rather than stored.
    pub fn record(&mut self, table: TableName, set: ConflictSet) {
        if !set.is_empty() {
            self.tables.insert(table, set);
        }
    }

    /// The conflict set for one table.
    pub fn conflicts(&self, table: &TableName) -> Option<&ConflictSet> {
        self.tables.get(table)
    }

    /// Whether the table has unresolved conflicts.
    pub fn is_in_conflict(&self, table: &TableName) -> bool {
        self.tables.contains_key(table)
    }

    /// Whether a write to `key` in `table` must be rejected.
    pub fn blocks_write(&self, table: &TableName, key: &RowKey) -> bool {
        self.tables
            .get(table)
            .map(|set| set.blocks_key(key))
            .unwrap_or(false)
    }

    /// Iterate conflicted tables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableName, &ConflictSet)> {
        self.tables.iter()
    }

    /// Total conflict count across all tables.
    pub fn total(&self) -> usize {
        self.tables.values().map(|s| s.count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Resolve one table's conflicts against the working snapshot.
    ///
    /// The working snapshot holds `ours` for conflicted tables, so the
    /// `Ours` policy only clears the record. `Theirs` swaps in the
    /// other parent's values: whole-table image for table-level
    /// conflicts, per-key row values (or deletion, when theirs dropped
    /// the row) for row conflicts.
    ///
    /// # Errors
    ///
    /// Returns `NoConflicts` if the table has no record. A failed
    /// resolution leaves the record in place, so the table stays in
    /// conflict and a retry is possible.
    pub fn resolve(
        &mut self,
        table: &TableName,
        policy: ResolutionPolicy,
        working: &Snapshot,
    ) -> Result<Snapshot, ConflictError> {
        let set = self
            .tables
            .get(table)
            .ok_or_else(|| ConflictError::NoConflicts(table.clone()))?;

        // build the resolved snapshot fully before touching the record
        let resolved = if policy == ResolutionPolicy::Ours {
            working.clone()
        } else if set.table_conflict.is_some() {
            match &set.theirs_state {
                Some(state) => working.with_table(table.clone(), state.clone()),
                None => working.without_table(table),
            }
        } else {
            let state = working
                .table(table)
                .ok_or_else(|| ConflictError::UnknownTable(table.clone()))?;
            let (schema, mut rows) = state.clone().into_parts();
            for conflict in &set.rows {
                match &conflict.theirs {
                    Some(row) => rows.insert(&schema, row.clone())?,
                    None => {
                        // theirs deleted the row; ours may have kept or
                        // already dropped it
                        let _ = rows.delete_key(&conflict.key);
                    }
                }
            }
            working.with_table(table.clone(), TableState::new(schema, rows)?)
        };

        self.tables.remove(table);
        Ok(resolved)
    }
}
