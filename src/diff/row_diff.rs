//! diff::row_diff
//!
//! Row-level differencing between two table states.
//!
//! # Algorithm
//!
//! Both row sets iterate in ascending identity order (primary key, or
//! content hash for keyless tables), so the diff is a single merge walk
//! over two sorted streams: an identity present on one side only is an
//! add or delete, and a shared identity with different cells is a
//! modification.
//!
//! # Schema drift
//!
//! The two states may carry different but compatible schemas (renames,
//! column reorders, added or dropped columns). Old-side rows are
//! translated into the new schema's column order before comparison, so
//! every emitted row is positionally aligned with the new schema and a
//! reorder alone produces an empty diff.
//!
//! # Keyless tables
//!
//! A keyless row has no identity beyond its content, so a changed row
//! is indistinguishable from a delete plus an add and keyless diffs
//! never contain modifications. Counts express multiplicity: two
//! occurrences added of the same row is one entry with count 2.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::row::KeylessEntry;
use crate::core::schema::{Schema, SchemaError};
use crate::core::snapshot::TableState;
use crate::core::types::ContentHash;
use crate::core::value::{Row, RowKey};

/// Errors from row differencing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("cannot diff: schemas have different column tag sets")]
    ColumnSetMismatch,

    #[error("cannot diff: row identities are not comparable (primary key definitions differ)")]
    KeyMismatch,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// How a row changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Deleted,
    Modified,
}

/// The identity a diff entry is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKey {
    /// Primary-key tuple, for keyed tables.
    Primary(RowKey),
    /// Row content hash, for keyless tables.
    Hashed(ContentHash),
}

impl std::fmt::Display for DiffKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffKey::Primary(key) => write!(f, "{}", key),
            DiffKey::Hashed(hash) => write!(f, "{}", hash.short(8)),
        }
    }
}

/// One changed row.
///
/// Both row images are in the new schema's column order. `count` is 1
/// for keyed tables; for keyless tables it is the number of occurrences
/// added or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub kind: DiffKind,
    pub key: DiffKey,
    pub from: Option<Row>,
    pub to: Option<Row>,
    pub count: u64,
}

/// The row diff of one table, plus the totals needed for statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDiff {
    /// Entries in ascending identity order.
    pub entries: Vec<DiffEntry>,
    /// Rows present and unchanged on both sides.
    pub rows_unmodified: u64,
    /// Total rows on the old side.
    pub old_row_count: u64,
    /// Total rows on the new side.
    pub new_row_count: u64,
}

impl RowDiff {
    /// Whether no row changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute the row diff from `from` to `to`.
///
/// # Errors
///
/// Returns `ColumnSetMismatch` if the schemas do not cover the same
/// column tags, or `KeyMismatch` if one side is keyless and the other
/// is not, or their primary-key definitions differ.
pub fn diff_table_states(from: &TableState, to: &TableState) -> Result<RowDiff, DiffError> {
    let from_schema = from.schema();
    let to_schema = to.schema();

    if from_schema.tag_set() != to_schema.tag_set() {
        return Err(DiffError::ColumnSetMismatch);
    }
    if from_schema.is_keyless() != to_schema.is_keyless() {
        return Err(DiffError::KeyMismatch);
    }

    if to_schema.is_keyless() {
        diff_keyless(from, to)
    } else {
        if !from_schema.keys_diffable(to_schema) {
            return Err(DiffError::KeyMismatch);
        }
        diff_keyed(from, to)
    }
}

fn diff_keyed(from: &TableState, to: &TableState) -> Result<RowDiff, DiffError> {
    let from_schema = from.schema();
    let to_schema = to.schema();
    // kind checked by the caller
    let from_rows = from.rows().as_keyed().ok_or(DiffError::KeyMismatch)?;
    let to_rows = to.rows().as_keyed().ok_or(DiffError::KeyMismatch)?;

    let mut entries = Vec::new();
    let mut rows_unmodified = 0u64;

    let mut old = from_rows.iter().peekable();
    let mut new = to_rows.iter().peekable();
    loop {
        match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some((key, row)), None) => {
                entries.push(deleted(key, from_schema.translate_row(row, to_schema)?));
                old.next();
            }
            (None, Some((key, row))) => {
                entries.push(added(key, (*row).clone()));
                new.next();
            }
            (Some((old_key, old_row)), Some((new_key, new_row))) => {
                match old_key.cmp(new_key) {
                    std::cmp::Ordering::Less => {
                        entries
                            .push(deleted(old_key, from_schema.translate_row(old_row, to_schema)?));
                        old.next();
                    }
                    std::cmp::Ordering::Greater => {
                        entries.push(added(new_key, (*new_row).clone()));
                        new.next();
                    }
                    std::cmp::Ordering::Equal => {
                        let translated = from_schema.translate_row(old_row, to_schema)?;
                        if &translated == *new_row {
                            rows_unmodified += 1;
                        } else {
                            entries.push(DiffEntry {
                                kind: DiffKind::Modified,
                                key: DiffKey::Primary((*old_key).clone()),
                                from: Some(translated),
                                to: Some((*new_row).clone()),
                                count: 1,
                            });
                        }
                        old.next();
                        new.next();
                    }
                }
            }
        }
    }

    Ok(RowDiff {
        entries,
        rows_unmodified,
        old_row_count: from.rows().row_count(),
        new_row_count: to.rows().row_count(),
    })
}

fn added(key: &RowKey, row: Row) -> DiffEntry {
    DiffEntry {
        kind: DiffKind::Added,
        key: DiffKey::Primary(key.clone()),
        from: None,
        to: Some(row),
        count: 1,
    }
}

fn deleted(key: &RowKey, row: Row) -> DiffEntry {
    DiffEntry {
        kind: DiffKind::Deleted,
        key: DiffKey::Primary(key.clone()),
        from: Some(row),
        to: None,
        count: 1,
    }
}

fn diff_keyless(from: &TableState, to: &TableState) -> Result<RowDiff, DiffError> {
    let to_rows = to.rows().as_keyless().ok_or(DiffError::KeyMismatch)?;

    // A translated row hashes differently, so when the schemas drifted
    // the old side is re-bucketed under the new schema first.
    let from_rows: BTreeMap<ContentHash, KeylessEntry> =
        translate_keyless(from, to.schema())?;

    let mut entries = Vec::new();
    let mut rows_unmodified = 0u64;

    let mut old = from_rows.iter().peekable();
    let mut new = to_rows.iter().peekable();
    loop {
        match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some((hash, entry)), None) => {
                entries.push(keyless_entry(DiffKind::Deleted, hash, entry, entry.count));
                old.next();
            }
            (None, Some((hash, entry))) => {
                entries.push(keyless_entry(DiffKind::Added, hash, entry, entry.count));
                new.next();
            }
            (Some((old_hash, old_entry)), Some((new_hash, new_entry))) => {
                match old_hash.cmp(new_hash) {
                    std::cmp::Ordering::Less => {
                        entries.push(keyless_entry(
                            DiffKind::Deleted,
                            old_hash,
                            old_entry,
                            old_entry.count,
                        ));
                        old.next();
                    }
                    std::cmp::Ordering::Greater => {
                        entries.push(keyless_entry(
                            DiffKind::Added,
                            new_hash,
                            new_entry,
                            new_entry.count,
                        ));
                        new.next();
                    }
                    std::cmp::Ordering::Equal => {
                        rows_unmodified += old_entry.count.min(new_entry.count);
                        if old_entry.count < new_entry.count {
                            entries.push(keyless_entry(
                                DiffKind::Added,
                                new_hash,
                                new_entry,
                                new_entry.count - old_entry.count,
                            ));
                        } else if old_entry.count > new_entry.count {
                            entries.push(keyless_entry(
                                DiffKind::Deleted,
                                old_hash,
                                old_entry,
                                old_entry.count - new_entry.count,
                            ));
                        }
                        old.next();
                        new.next();
                    }
                }
            }
        }
    }

    Ok(RowDiff {
        entries,
        rows_unmodified,
        old_row_count: from.rows().row_count(),
        new_row_count: to.rows().row_count(),
    })
}

fn keyless_entry(kind: DiffKind, hash: &ContentHash, entry: &KeylessEntry, count: u64) -> DiffEntry {
    let (from, to) = match kind {
        DiffKind::Deleted => (Some(entry.row.clone()), None),
        _ => (None, Some(entry.row.clone())),
    };
    DiffEntry {
        kind,
        key: DiffKey::Hashed(hash.clone()),
        from,
        to,
        count,
    }
}

fn translate_keyless(
    from: &TableState,
    target: &Schema,
) -> Result<BTreeMap<ContentHash, KeylessEntry>, SchemaError> {
    let rows = match from.rows().as_keyless() {
        Some(rows) => rows,
        None => return Ok(BTreeMap::new()),
    };
    if from.schema() == target {
        return Ok(rows.clone());
    }
    let mut out: BTreeMap<ContentHash, KeylessEntry> = BTreeMap::new();
    for entry in rows.values() {
        let row = from.schema().translate_row(&entry.row, target)?;
        let hash = row.content_hash();
        out.entry(hash)
            .and_modify(|e| e.count += entry.count)
            .or_insert(KeylessEntry {
                row,
                count: entry.count,
            });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row::RowSet;
    use crate::core::schema::{Column, TypeDesc};
    use crate::core::types::ColumnTag;
    use crate::core::value::Value;

    fn keyed_schema() -> Schema {
        Schema::new(
            vec![
                Column::not_null(1u64, "pk", TypeDesc::int()),
                Column::new(2u64, "v", TypeDesc::int()),
            ],
            vec![ColumnTag(1)],
        )
        .unwrap()
    }

    fn keyed_state(rows: &[(i64, i64)]) -> TableState {
        let schema = keyed_schema();
        let mut set = RowSet::new_for(&schema);
        for (pk, v) in rows {
            set.insert(&schema, Row::new(vec![Value::Int(*pk), Value::Int(*v)]))
                .unwrap();
        }
        TableState::new(schema, set).unwrap()
    }

    fn keyless_state(rows: &[(i64, i64)]) -> TableState {
        let schema = Schema::keyless(vec![
            Column::new(1u64, "a", TypeDesc::int()),
            Column::new(2u64, "b", TypeDesc::int()),
        ])
        .unwrap();
        let mut set = RowSet::new_for(&schema);
        for (a, b) in rows {
            set.insert(&schema, Row::new(vec![Value::Int(*a), Value::Int(*b)]))
                .unwrap();
        }
        TableState::new(schema, set).unwrap()
    }

    mod keyed {
        use super::*;

        #[test]
        fn identical_states_diff_empty() {
            let diff =
                diff_table_states(&keyed_state(&[(1, 10), (2, 20)]), &keyed_state(&[(1, 10), (2, 20)]))
                    .unwrap();
            assert!(diff.is_empty());
            assert_eq!(diff.rows_unmodified, 2);
        }

        #[test]
        fn add_delete_modify_classified() {
            let from = keyed_state(&[(1, 10), (2, 20), (3, 30)]);
            let to = keyed_state(&[(2, 20), (3, 99), (4, 40)]);
            let diff = diff_table_states(&from, &to).unwrap();

            let kinds: Vec<DiffKind> = diff.entries.iter().map(|e| e.kind).collect();
            assert_eq!(
                kinds,
                vec![DiffKind::Deleted, DiffKind::Modified, DiffKind::Added]
            );
            assert_eq!(diff.rows_unmodified, 1);
            assert_eq!(diff.old_row_count, 3);
            assert_eq!(diff.new_row_count, 3);
        }

        #[test]
        fn entries_sorted_by_key() {
            let from = keyed_state(&[(5, 0)]);
            let to = keyed_state(&[(1, 0), (9, 0)]);
            let diff = diff_table_states(&from, &to).unwrap();

            let keys: Vec<String> = diff.entries.iter().map(|e| e.key.to_string()).collect();
            assert_eq!(keys, vec!["(1)", "(5)", "(9)"]);
        }

        #[test]
        fn modified_entry_carries_both_images() {
            let diff = diff_table_states(&keyed_state(&[(1, 10)]), &keyed_state(&[(1, 11)])).unwrap();
            let entry = &diff.entries[0];
            assert_eq!(entry.from, Some(Row::new(vec![Value::Int(1), Value::Int(10)])));
            assert_eq!(entry.to, Some(Row::new(vec![Value::Int(1), Value::Int(11)])));
        }

        #[test]
        fn rename_and_reorder_alone_is_empty_diff() {
            let from = keyed_state(&[(1, 10)]);
            let renamed = Schema::new(
                vec![
                    Column::new(2u64, "value", TypeDesc::int()),
                    Column::not_null(1u64, "pk", TypeDesc::int()),
                ],
                vec![ColumnTag(1)],
            )
            .unwrap();
            let mut set = RowSet::new_for(&renamed);
            set.insert(&renamed, Row::new(vec![Value::Int(10), Value::Int(1)]))
                .unwrap();
            let to = TableState::new(renamed, set).unwrap();

            let diff = diff_table_states(&from, &to).unwrap();
            assert!(diff.is_empty());
            assert_eq!(diff.rows_unmodified, 1);
        }

        #[test]
        fn incompatible_tag_sets_rejected() {
            let from = keyed_state(&[]);
            let other = Schema::new(
                vec![
                    Column::not_null(1u64, "pk", TypeDesc::int()),
                    Column::new(9u64, "w", TypeDesc::int()),
                ],
                vec![ColumnTag(1)],
            )
            .unwrap();
            let to = TableState::empty(other);
            assert_eq!(
                diff_table_states(&from, &to).unwrap_err(),
                DiffError::ColumnSetMismatch
            );
        }

        #[test]
        fn keyed_vs_keyless_rejected() {
            assert_eq!(
                diff_table_states(&keyed_state(&[]), &keyless_state(&[])).unwrap_err(),
                DiffError::KeyMismatch
            );
        }
    }

    mod keyless {
        use super::*;

        #[test]
        fn no_modifications_only_adds_and_deletes() {
            let from = keyless_state(&[(1, 10)]);
            let to = keyless_state(&[(1, 11)]);
            let diff = diff_table_states(&from, &to).unwrap();

            assert_eq!(diff.entries.len(), 2);
            assert!(diff
                .entries
                .iter()
                .all(|e| e.kind != DiffKind::Modified));
            assert_eq!(diff.rows_unmodified, 0);
        }

        #[test]
        fn duplicate_counts_tracked() {
            let from = keyless_state(&[(1, 1), (1, 1), (1, 1)]);
            let to = keyless_state(&[(1, 1)]);
            let diff = diff_table_states(&from, &to).unwrap();

            assert_eq!(diff.entries.len(), 1);
            assert_eq!(diff.entries[0].kind, DiffKind::Deleted);
            assert_eq!(diff.entries[0].count, 2);
            assert_eq!(diff.rows_unmodified, 1);
        }

        #[test]
        fn equal_multisets_diff_empty() {
            let diff = diff_table_states(
                &keyless_state(&[(1, 1), (1, 1), (2, 2)]),
                &keyless_state(&[(2, 2), (1, 1), (1, 1)]),
            )
            .unwrap();
            assert!(diff.is_empty());
            assert_eq!(diff.rows_unmodified, 3);
        }
    }
}
