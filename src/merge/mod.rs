//! merge
//!
//! The three-way merge engine.
//!
//! # Per-table state machine
//!
//! For each table named by any of base/ours/theirs:
//! 1. Unchanged on both sides: keep base.
//! 2. Changed on one side only: take that side.
//! 3. Changed to the same result on both: take either.
//! 4. Changed differently: merge schemas, then rows re-keyed under the
//!    merged schema; divergent rows become conflicts.
//! 5. Deleted on one side, modified on the other: table-level conflict.
//!
//! Divergent primary-key definitions abort the whole merge with an
//! error instead of a conflict record, because row identity itself is
//! undefined under any combined definition.
//!
//! A table with conflicts keeps ours' values in the merged snapshot and
//! its conflict set is returned for the caller to persist; the merge
//! itself never touches a conflict store or the commit graph.

pub mod cherry_pick;
pub mod row_merge;
pub mod schema_merge;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::conflict::{ConflictSet, TableConflictKind};
use crate::core::snapshot::{Snapshot, SnapshotError, TableState};
use crate::core::types::TableName;

pub use cherry_pick::{cherry_pick_snapshot, CherryPickError};
pub use row_merge::{merge_rows, RowMergeError, RowMergeOutcome};
pub use schema_merge::{merge_schemas, SchemaMergeError};

/// Errors that abort a merge outright.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("table '{table}': {source}")]
    PrimaryKeyMismatch {
        table: TableName,
        source: SchemaMergeError,
    },

    #[error("table '{table}': {source}")]
    RowMerge {
        table: TableName,
        source: RowMergeError,
    },

    #[error("table '{table}': {source}")]
    RowSet {
        table: TableName,
        source: crate::core::row::RowSetError,
    },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// The result of a three-way merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// The merged snapshot; conflicted tables hold ours' values.
    pub merged: Snapshot,
    /// Unpersisted conflicts by table; empty for a clean merge.
    pub conflicts: BTreeMap<TableName, ConflictSet>,
    /// Set when the merge was resolved by moving ours forward to
    /// theirs without building a new snapshot.
    pub fast_forward: bool,
    /// The first schema-level disagreement, when one was recorded as a
    /// table conflict.
    pub schema_conflict: Option<SchemaMergeError>,
}

impl MergeOutcome {
    /// Total conflict count across all tables.
    pub fn conflict_count(&self) -> usize {
        self.conflicts.values().map(|s| s.count()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Merge `ours` and `theirs` against their common ancestor `base`.
///
/// Pure snapshot-level merge: commit-graph concerns (merge base
/// discovery, fast-forward detection, commit creation) belong to the
/// caller.
///
/// # Errors
///
/// Returns `PrimaryKeyMismatch` when the two sides changed a table's
/// primary-key definition divergently; everything else surfaces as
/// conflicts in the outcome.
pub fn merge_snapshots(
    base: &Snapshot,
    ours: &Snapshot,
    theirs: &Snapshot,
) -> Result<MergeOutcome, MergeError> {
    let mut names: BTreeSet<TableName> = BTreeSet::new();
    names.extend(base.table_names().cloned());
    names.extend(ours.table_names().cloned());
    names.extend(theirs.table_names().cloned());

    let mut outcome = MergeOutcome::default();
    let mut merged = Snapshot::empty();

    for name in names {
        let b = base.table(&name);
        let o = ours.table(&name);
        let t = theirs.table(&name);

        match merge_table(&name, b, o, t)? {
            TableOutcome::Absent => {}
            TableOutcome::Keep(state) => {
                merged = merged.with_table(name, state);
            }
            TableOutcome::Conflicted { state, set, schema } => {
                if let Some(state) = state {
                    merged = merged.with_table(name.clone(), state);
                }
                if outcome.schema_conflict.is_none() {
                    outcome.schema_conflict = schema;
                }
                outcome.conflicts.insert(name, set);
            }
        }
    }

    outcome.merged = merged;
    Ok(outcome)
}

enum TableOutcome {
    /// The table does not exist in the merged snapshot.
    Absent,
    Keep(TableState),
    Conflicted {
        /// Ours' image, or `None` when ours deleted the table.
        state: Option<TableState>,
        set: ConflictSet,
        schema: Option<SchemaMergeError>,
    },
}

fn merge_table(
    name: &TableName,
    base: Option<&TableState>,
    ours: Option<&TableState>,
    theirs: Option<&TableState>,
) -> Result<TableOutcome, MergeError> {
    let (ours, theirs) = match (ours, theirs) {
        // deleted (or never existed) on both sides
        (None, None) => return Ok(TableOutcome::Absent),
        (Some(o), None) => {
            return Ok(match base {
                // ours added it
                None => TableOutcome::Keep(o.clone()),
                Some(b) => {
                    if o.content_hash() == b.content_hash() {
                        // theirs deleted an untouched table
                        TableOutcome::Absent
                    } else {
                        TableOutcome::Conflicted {
                            state: Some(o.clone()),
                            set: deleted_modified(Some(o), None),
                            schema: None,
                        }
                    }
                }
            });
        }
        (None, Some(t)) => {
            return Ok(match base {
                None => TableOutcome::Keep(t.clone()),
                Some(b) => {
                    if t.content_hash() == b.content_hash() {
                        TableOutcome::Absent
                    } else {
                        TableOutcome::Conflicted {
                            state: None,
                            set: deleted_modified(None, Some(t)),
                            schema: None,
                        }
                    }
                }
            });
        }
        (Some(o), Some(t)) => (o, t),
    };

    // cheap convergence checks before any real merging
    if ours.content_hash() == theirs.content_hash() {
        return Ok(TableOutcome::Keep(ours.clone()));
    }
    if let Some(b) = base {
        if ours.content_hash() == b.content_hash() {
            return Ok(TableOutcome::Keep(theirs.clone()));
        }
        if theirs.content_hash() == b.content_hash() {
            return Ok(TableOutcome::Keep(ours.clone()));
        }
    }

    let merged_schema = match merge_schemas(base.map(TableState::schema), ours.schema(), theirs.schema())
    {
        Ok(schema) => schema,
        Err(err @ SchemaMergeError::PrimaryKeyMismatch) => {
            return Err(MergeError::PrimaryKeyMismatch {
                table: name.clone(),
                source: err,
            });
        }
        Err(err) => {
            return Ok(TableOutcome::Conflicted {
                state: Some(ours.clone()),
                set: ConflictSet {
                    table_conflict: Some(TableConflictKind::SchemaIncompatible),
                    ours_state: Some(ours.clone()),
                    theirs_state: Some(theirs.clone()),
                    ..Default::default()
                },
                schema: Some(err),
            });
        }
    };

    let rows = merge_rows(&merged_schema, base, ours, theirs).map_err(|source| {
        MergeError::RowMerge {
            table: name.clone(),
            source,
        }
    })?;

    if rows.keyless_ambiguity {
        return Ok(TableOutcome::Conflicted {
            state: Some(ours.clone()),
            set: ConflictSet {
                table_conflict: Some(TableConflictKind::KeylessAmbiguity),
                ours_state: Some(ours.clone()),
                theirs_state: Some(theirs.clone()),
                ..Default::default()
            },
            schema: None,
        });
    }

    let state = TableState::new(merged_schema.clone(), rows.rows)?;

    if rows.conflicts.is_empty() {
        return Ok(TableOutcome::Keep(state));
    }

    // Conflicted keys already hold ours' values in the merged rows, so
    // the merged state is what the working snapshot must carry; the
    // theirs image backs whole-table resolution.
    let theirs_resolved = resolve_side_state(name, &merged_schema, theirs)?;
    Ok(TableOutcome::Conflicted {
        state: Some(state.clone()),
        set: ConflictSet {
            rows: rows.conflicts,
            ours_state: Some(state),
            theirs_state: Some(theirs_resolved),
            ..Default::default()
        },
        schema: None,
    })
}

fn deleted_modified(ours: Option<&TableState>, theirs: Option<&TableState>) -> ConflictSet {
    ConflictSet {
        table_conflict: Some(TableConflictKind::DeletedModified),
        ours_state: ours.cloned(),
        theirs_state: theirs.cloned(),
        ..Default::default()
    }
}

/// One parent's table image translated under the merged schema, so
/// conflict resolution swaps value-compatible states.
fn resolve_side_state(
    name: &TableName,
    merged_schema: &crate::core::schema::Schema,
    side: &TableState,
) -> Result<TableState, MergeError> {
    if side.schema() == merged_schema {
        return Ok(side.clone());
    }
    let to_err = |source: crate::core::schema::SchemaError| MergeError::RowMerge {
        table: name.clone(),
        source: source.into(),
    };
    let mut rows = crate::core::row::RowSet::new_for(merged_schema);
    match side.rows() {
        crate::core::row::RowSet::Keyed(map) => {
            for row in map.values() {
                let translated = side
                    .schema()
                    .translate_row(row, merged_schema)
                    .map_err(to_err)?;
                rows.insert(merged_schema, translated)
                    .map_err(|source| MergeError::RowSet {
                        table: name.clone(),
                        source,
                    })?;
            }
        }
        crate::core::row::RowSet::Keyless(map) => {
            for entry in map.values() {
                for _ in 0..entry.count {
                    let translated = side
                        .schema()
                        .translate_row(&entry.row, merged_schema)
                        .map_err(to_err)?;
                    rows.insert(merged_schema, translated)
                        .map_err(|source| MergeError::RowSet {
                            table: name.clone(),
                            source,
                        })?;
                }
            }
        }
    }
    Ok(TableState::new(merged_schema.clone(), rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row::RowSet;
    use crate::core::schema::{Column, Schema, TypeDesc};
    use crate::core::types::ColumnTag;
    use crate::core::value::{Row, RowKey, Value};

    fn schema() -> Schema {
        Schema::new(
            vec![
                Column::not_null(1u64, "pk", TypeDesc::int()),
                Column::new(2u64, "v", TypeDesc::int()),
            ],
            vec![ColumnTag(1)],
        )
        .unwrap()
    }

    fn state(rows: &[(i64, i64)]) -> TableState {
        let schema = schema();
        let mut set = RowSet::new_for(&schema);
        for (pk, v) in rows {
            set.insert(&schema, Row::new(vec![Value::Int(*pk), Value::Int(*v)]))
                .unwrap();
        }
        TableState::new(schema, set).unwrap()
    }

    fn name(s: &str) -> TableName {
        TableName::new(s).unwrap()
    }

    fn snapshot(tables: &[(&str, TableState)]) -> Snapshot {
        let mut snap = Snapshot::empty();
        for (n, s) in tables {
            snap = snap.with_table(name(n), s.clone());
        }
        snap
    }

    #[test]
    fn untouched_tables_pass_through() {
        let base = snapshot(&[("t", state(&[(1, 1)]))]);
        let outcome = merge_snapshots(&base, &base, &base).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.merged.content_hash(), base.content_hash());
    }

    #[test]
    fn one_sided_change_taken() {
        let base = snapshot(&[("t", state(&[(1, 1)]))]);
        let theirs = snapshot(&[("t", state(&[(1, 2)]))]);

        let outcome = merge_snapshots(&base, &base, &theirs).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.merged.content_hash(), theirs.content_hash());
    }

    #[test]
    fn disjoint_table_edits_union() {
        let base = snapshot(&[("a", state(&[(1, 1)])), ("b", state(&[(1, 1)]))]);
        let ours = snapshot(&[("a", state(&[(1, 2)])), ("b", state(&[(1, 1)]))]);
        let theirs = snapshot(&[("a", state(&[(1, 1)])), ("b", state(&[(1, 3)]))]);

        let outcome = merge_snapshots(&base, &ours, &theirs).unwrap();
        assert!(outcome.is_clean());
        let merged_a = outcome.merged.table(&name("a")).unwrap();
        let merged_b = outcome.merged.table(&name("b")).unwrap();
        assert_eq!(
            merged_a.rows().get(&RowKey::new(vec![Value::Int(1)])),
            Some(&Row::new(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(
            merged_b.rows().get(&RowKey::new(vec![Value::Int(1)])),
            Some(&Row::new(vec![Value::Int(1), Value::Int(3)]))
        );
    }

    #[test]
    fn divergent_row_edit_conflicts_and_keeps_ours() {
        let base = snapshot(&[("t", state(&[(1, 1)]))]);
        let ours = snapshot(&[("t", state(&[(1, 2)]))]);
        let theirs = snapshot(&[("t", state(&[(1, 3)]))]);

        let outcome = merge_snapshots(&base, &ours, &theirs).unwrap();
        assert_eq!(outcome.conflict_count(), 1);
        let set = &outcome.conflicts[&name("t")];
        assert_eq!(set.rows.len(), 1);
        assert_eq!(
            set.rows[0].base,
            Some(Row::new(vec![Value::Int(1), Value::Int(1)]))
        );

        let merged_t = outcome.merged.table(&name("t")).unwrap();
        assert_eq!(
            merged_t.rows().get(&RowKey::new(vec![Value::Int(1)])),
            Some(&Row::new(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn table_added_on_one_side_kept() {
        let base = Snapshot::empty();
        let ours = snapshot(&[("t", state(&[(1, 1)]))]);

        let outcome = merge_snapshots(&base, &ours, &base).unwrap();
        assert!(outcome.is_clean());
        assert!(outcome.merged.has_table(&name("t")));
    }

    #[test]
    fn delete_of_untouched_table_wins() {
        let base = snapshot(&[("t", state(&[(1, 1)]))]);
        let ours = Snapshot::empty();

        let outcome = merge_snapshots(&base, &ours, &base).unwrap();
        assert!(outcome.is_clean());
        assert!(!outcome.merged.has_table(&name("t")));
    }

    #[test]
    fn delete_versus_modify_is_table_conflict() {
        let base = snapshot(&[("t", state(&[(1, 1)]))]);
        let ours = snapshot(&[("t", state(&[(1, 2)]))]);
        let theirs = Snapshot::empty();

        let outcome = merge_snapshots(&base, &ours, &theirs).unwrap();
        let set = &outcome.conflicts[&name("t")];
        assert_eq!(set.table_conflict, Some(TableConflictKind::DeletedModified));
        assert!(outcome.merged.has_table(&name("t")));
    }

    #[test]
    fn divergent_pk_definitions_abort() {
        let base = snapshot(&[("t", state(&[]))]);
        let repkeyed = Schema::new(
            schema().columns().to_vec(),
            vec![ColumnTag(1), ColumnTag(2)],
        )
        .unwrap();
        let theirs = snapshot(&[("t", TableState::empty(repkeyed))]);
        let ours = snapshot(&[("t", state(&[(1, 1)]))]);

        assert!(matches!(
            merge_snapshots(&base, &ours, &theirs),
            Err(MergeError::PrimaryKeyMismatch { .. })
        ));
    }

    #[test]
    fn schema_collision_recorded_not_fatal() {
        let base = snapshot(&[("t", state(&[]))]);
        let mut ours_cols = schema().columns().to_vec();
        ours_cols[1].ty = TypeDesc::varchar(32);
        let ours_schema = Schema::new(ours_cols, vec![ColumnTag(1)]).unwrap();
        let mut their_cols = schema().columns().to_vec();
        their_cols[1].name = "w".into();
        let their_schema = Schema::new(their_cols, vec![ColumnTag(1)]).unwrap();

        let ours = snapshot(&[("t", TableState::empty(ours_schema))]);
        let theirs = snapshot(&[("t", TableState::empty(their_schema))]);

        let outcome = merge_snapshots(&base, &ours, &theirs).unwrap();
        assert_eq!(outcome.conflict_count(), 1);
        assert!(matches!(
            outcome.schema_conflict,
            Some(SchemaMergeError::TagCollision(_))
        ));
        let set = &outcome.conflicts[&name("t")];
        assert_eq!(
            set.table_conflict,
            Some(TableConflictKind::SchemaIncompatible)
        );
    }

    #[test]
    fn schema_and_row_merge_combine() {
        // ours adds a column, theirs edits a row
        let base = snapshot(&[("t", state(&[(1, 1)]))]);

        let mut cols = schema().columns().to_vec();
        cols.push(Column::new(3u64, "extra", TypeDesc::int()));
        let wide = Schema::new(cols, vec![ColumnTag(1)]).unwrap();
        let mut rows = RowSet::new_for(&wide);
        rows.insert(
            &wide,
            Row::new(vec![Value::Int(1), Value::Int(1), Value::Null]),
        )
        .unwrap();
        let ours = snapshot(&[("t", TableState::new(wide, rows).unwrap())]);

        let theirs = snapshot(&[("t", state(&[(1, 9)]))]);

        let outcome = merge_snapshots(&base, &ours, &theirs).unwrap();
        assert!(outcome.is_clean());
        let merged_t = outcome.merged.table(&name("t")).unwrap();
        assert_eq!(merged_t.schema().columns().len(), 3);
        assert_eq!(
            merged_t.rows().get(&RowKey::new(vec![Value::Int(1)])),
            Some(&Row::new(vec![Value::Int(1), Value::Int(9), Value::Null]))
        );
    }
}
