//! Property-based tests for content addressing, differencing, and
//! merging.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated table contents.

use std::collections::BTreeMap;

use proptest::prelude::*;

use verso::core::row::RowSet;
use verso::core::schema::{Column, Schema, TypeDesc};
use verso::core::snapshot::{Snapshot, TableState};
use verso::core::types::{ColumnTag, TableName};
use verso::core::value::{Row, RowKey, Value};
use verso::diff::row_diff::{diff_table_states, DiffKind};
use verso::merge::merge_snapshots;

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

fn keyless_schema() -> Schema {
    Schema::keyless(vec![Column::new(1u64, "v", TypeDesc::int())]).unwrap()
}

fn state_of(rows: &BTreeMap<i64, i64>) -> TableState {
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

/// Strategy for a keyed table's content: pk -> value.
fn table_content() -> impl Strategy<Value = BTreeMap<i64, i64>> {
    prop::collection::btree_map(0i64..32, any::<i64>(), 0..12)
}

proptest! {
    /// The content hash is a pure function of the rows, independent of
    /// insertion order.
    #[test]
    fn table_hash_ignores_insertion_order(rows in table_content(), seed in any::<u64>()) {
        let forward = state_of(&rows);

        let mut pairs: Vec<(i64, i64)> = rows.iter().map(|(k, v)| (*k, *v)).collect();
        // cheap deterministic shuffle
        pairs.sort_by_key(|(k, _)| k.wrapping_mul(seed as i64 | 1));

        let schema = schema();
        let mut set = RowSet::new_for(&schema);
        for (pk, v) in &pairs {
            set.insert(&schema, Row::new(vec![Value::Int(*pk), Value::Int(*v)])).unwrap();
        }
        let shuffled = TableState::new(schema, set).unwrap();

        prop_assert_eq!(forward.content_hash(), shuffled.content_hash());
    }

    /// Diffing a state against itself is empty, and every row counts as
    /// unmodified.
    #[test]
    fn self_diff_is_empty(rows in table_content()) {
        let state = state_of(&rows);
        let diff = diff_table_states(&state, &state).unwrap();
        prop_assert!(diff.is_empty());
        prop_assert_eq!(diff.rows_unmodified, rows.len() as u64);
    }

    /// Swapping the diff direction swaps adds and deletes and preserves
    /// the modified and unmodified counts.
    #[test]
    fn diff_direction_symmetry(a in table_content(), b in table_content()) {
        let sa = state_of(&a);
        let sb = state_of(&b);
        let fwd = diff_table_states(&sa, &sb).unwrap();
        let rev = diff_table_states(&sb, &sa).unwrap();

        let count = |diff: &verso::diff::row_diff::RowDiff, kind: DiffKind| {
            diff.entries.iter().filter(|e| e.kind == kind).count()
        };
        prop_assert_eq!(count(&fwd, DiffKind::Added), count(&rev, DiffKind::Deleted));
        prop_assert_eq!(count(&fwd, DiffKind::Deleted), count(&rev, DiffKind::Added));
        prop_assert_eq!(count(&fwd, DiffKind::Modified), count(&rev, DiffKind::Modified));
        prop_assert_eq!(fwd.rows_unmodified, rev.rows_unmodified);
    }

    /// Replaying a diff's entries onto the from-side reproduces the
    /// to-side exactly.
    #[test]
    fn diff_patches_from_into_to(a in table_content(), b in table_content()) {
        let sa = state_of(&a);
        let sb = state_of(&b);
        let diff = diff_table_states(&sa, &sb).unwrap();

        let schema = schema();
        let (_, mut rows) = sa.into_parts();
        for entry in &diff.entries {
            match entry.kind {
                DiffKind::Added | DiffKind::Modified => {
                    rows.insert(&schema, entry.to.clone().unwrap()).unwrap();
                }
                DiffKind::Deleted => {
                    rows.delete(&schema, entry.from.as_ref().unwrap()).unwrap();
                }
            }
        }

        prop_assert_eq!(rows.content_hash(), sb.rows().content_hash());
    }

    /// Merging with one side untouched yields the other side, whatever
    /// it changed.
    #[test]
    fn merge_with_untouched_side_takes_the_other(
        base in table_content(),
        edited in table_content(),
    ) {
        let base_snap = Snapshot::empty().with_table(name("t"), state_of(&base));
        let theirs = Snapshot::empty().with_table(name("t"), state_of(&edited));

        let outcome = merge_snapshots(&base_snap, &base_snap, &theirs).unwrap();
        prop_assert!(outcome.is_clean());
        prop_assert_eq!(outcome.merged.content_hash(), theirs.content_hash());
    }

    /// Edits to disjoint key ranges always merge cleanly, and the
    /// result carries both sides' rows.
    #[test]
    fn disjoint_key_edits_merge_cleanly(
        base in table_content(),
        ours_edits in prop::collection::btree_map(0i64..32, any::<i64>(), 0..6),
        theirs_adds in prop::collection::btree_map(100i64..132, any::<i64>(), 0..6),
    ) {
        let mut ours = base.clone();
        ours.extend(ours_edits.iter().map(|(k, v)| (*k, *v)));
        let mut theirs = base.clone();
        theirs.extend(theirs_adds.iter().map(|(k, v)| (*k, *v)));

        let outcome = merge_snapshots(
            &Snapshot::empty().with_table(name("t"), state_of(&base)),
            &Snapshot::empty().with_table(name("t"), state_of(&ours)),
            &Snapshot::empty().with_table(name("t"), state_of(&theirs)),
        ).unwrap();
        prop_assert!(outcome.is_clean());

        let mut expected = ours;
        expected.extend(theirs_adds.iter().map(|(k, v)| (*k, *v)));
        let merged = outcome.merged.table(&name("t")).unwrap();
        prop_assert_eq!(merged.content_hash(), state_of(&expected).content_hash());
    }

    /// A keyless table is a true multiset: inserting n copies and
    /// deleting k leaves n - k occurrences.
    #[test]
    fn keyless_counts_are_multiset_cardinalities(n in 1u64..20, k in 0u64..20) {
        let k = k.min(n);
        let schema = keyless_schema();
        let mut rows = RowSet::new_for(&schema);
        let row = Row::new(vec![Value::Int(7)]);
        for _ in 0..n {
            rows.insert(&schema, row.clone()).unwrap();
        }
        for _ in 0..k {
            rows.delete(&schema, &row).unwrap();
        }
        prop_assert_eq!(rows.row_count(), n - k);
    }

    /// Row keys order lexicographically by cell, consistent with the
    /// cell values themselves.
    #[test]
    fn row_key_order_follows_cell_order(a in any::<i64>(), b in any::<i64>()) {
        let ka = RowKey::new(vec![Value::Int(a)]);
        let kb = RowKey::new(vec![Value::Int(b)]);
        prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
    }
}
