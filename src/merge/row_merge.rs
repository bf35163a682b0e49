//! merge::row_merge
//!
//! Three-way row merging under an already-merged schema.
//!
//! All three row sets are first translated into the merged schema, then
//! each side is reduced to a change map against the base: per key (or
//! per content hash for keyless tables), what the side did to it. The
//! merged rows are the base plus both change maps; two sides changing
//! the same row to the same result converge, and changing it to
//! different results conflicts.
//!
//! Conflicted keys keep ours' value in the merged rows, matching what
//! the working snapshot must hold while the conflict is unresolved.
//!
//! # Keyless tables
//!
//! A keyless change is a count delta per content hash. Two sides
//! moving the same hash by different deltas cannot be attributed to
//! rows, so the whole table degrades to a single ambiguity conflict
//! instead of row records.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::conflict::RowConflict;
use crate::core::row::{KeylessEntry, RowSet};
use crate::core::schema::{Schema, SchemaError};
use crate::core::snapshot::TableState;
use crate::core::types::ContentHash;
use crate::core::value::{Row, RowKey};

/// Errors from row merging.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowMergeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// The outcome of merging one table's rows.
#[derive(Debug, Clone)]
pub struct RowMergeOutcome {
    /// Merged rows under the merged schema; conflicted keys hold ours'
    /// value.
    pub rows: RowSet,
    /// Row-level conflicts, keyed tables only.
    pub conflicts: Vec<RowConflict>,
    /// Both sides changed the same keyless row content by different
    /// amounts.
    pub keyless_ambiguity: bool,
}

/// Merge two row revisions against their common ancestor.
///
/// `base` is `None` when the table was created independently on both
/// sides. All inputs may carry drifted schemas; rows are translated
/// into `merged_schema` before comparison.
pub fn merge_rows(
    merged_schema: &Schema,
    base: Option<&TableState>,
    ours: &TableState,
    theirs: &TableState,
) -> Result<RowMergeOutcome, RowMergeError> {
    if merged_schema.is_keyless() {
        merge_keyless(merged_schema, base, ours, theirs)
    } else {
        merge_keyed(merged_schema, base, ours, theirs)
    }
}

/// What one side did to a key: `Some(row)` upserts, `None` deletes.
type ChangeMap = BTreeMap<RowKey, Option<Row>>;

fn merge_keyed(
    merged_schema: &Schema,
    base: Option<&TableState>,
    ours: &TableState,
    theirs: &TableState,
) -> Result<RowMergeOutcome, RowMergeError> {
    let base_rows = match base {
        Some(state) => translate_keyed(state, merged_schema)?,
        None => BTreeMap::new(),
    };
    let our_rows = translate_keyed(ours, merged_schema)?;
    let their_rows = translate_keyed(theirs, merged_schema)?;

    let our_changes = change_map(&base_rows, &our_rows);
    let their_changes = change_map(&base_rows, &their_rows);

    let mut merged = base_rows.clone();
    let mut conflicts = Vec::new();

    for (key, change) in &our_changes {
        apply_change(&mut merged, key, change);
    }
    for (key, their_change) in &their_changes {
        match our_changes.get(key) {
            None => apply_change(&mut merged, key, their_change),
            Some(our_change) if our_change == their_change => {}
            Some(our_change) => {
                conflicts.push(RowConflict {
                    key: key.clone(),
                    base: base_rows.get(key).cloned(),
                    ours: our_change.clone(),
                    theirs: their_change.clone(),
                });
            }
        }
    }

    Ok(RowMergeOutcome {
        rows: RowSet::Keyed(merged),
        conflicts,
        keyless_ambiguity: false,
    })
}

fn apply_change(merged: &mut BTreeMap<RowKey, Row>, key: &RowKey, change: &Option<Row>) {
    match change {
        Some(row) => {
            merged.insert(key.clone(), row.clone());
        }
        None => {
            merged.remove(key);
        }
    }
}

fn change_map(base: &BTreeMap<RowKey, Row>, side: &BTreeMap<RowKey, Row>) -> ChangeMap {
    let mut changes = ChangeMap::new();
    for (key, row) in side {
        if base.get(key) != Some(row) {
            changes.insert(key.clone(), Some(row.clone()));
        }
    }
    for key in base.keys() {
        if !side.contains_key(key) {
            changes.insert(key.clone(), None);
        }
    }
    changes
}

fn translate_keyed(
    state: &TableState,
    target: &Schema,
) -> Result<BTreeMap<RowKey, Row>, SchemaError> {
    let rows = match state.rows().as_keyed() {
        Some(rows) => rows,
        None => return Ok(BTreeMap::new()),
    };
    if state.schema() == target {
        return Ok(rows.clone());
    }
    let mut out = BTreeMap::new();
    for row in rows.values() {
        let translated = state.schema().translate_row(row, target)?;
        let key = target.key_of_row(&translated)?;
        out.insert(key, translated);
    }
    Ok(out)
}

fn merge_keyless(
    merged_schema: &Schema,
    base: Option<&TableState>,
    ours: &TableState,
    theirs: &TableState,
) -> Result<RowMergeOutcome, RowMergeError> {
    let base_rows = match base {
        Some(state) => translate_keyless(state, merged_schema)?,
        None => BTreeMap::new(),
    };
    let our_rows = translate_keyless(ours, merged_schema)?;
    let their_rows = translate_keyless(theirs, merged_schema)?;

    let our_deltas = delta_map(&base_rows, &our_rows);
    let their_deltas = delta_map(&base_rows, &their_rows);

    for (hash, their_delta) in &their_deltas {
        if let Some(our_delta) = our_deltas.get(hash) {
            if our_delta != their_delta {
                return Ok(RowMergeOutcome {
                    rows: RowSet::Keyless(our_rows),
                    conflicts: Vec::new(),
                    keyless_ambiguity: true,
                });
            }
        }
    }

    let mut merged = base_rows;
    for (hash, delta) in our_deltas.iter().chain(
        their_deltas
            .iter()
            .filter(|(hash, _)| !our_deltas.contains_key(*hash)),
    ) {
        apply_delta(&mut merged, hash, delta);
    }

    Ok(RowMergeOutcome {
        rows: RowSet::Keyless(merged),
        conflicts: Vec::new(),
        keyless_ambiguity: false,
    })
}

/// Count delta per content hash, with the row image for new hashes.
type DeltaMap = BTreeMap<ContentHash, (i64, Row)>;

fn delta_map(
    base: &BTreeMap<ContentHash, KeylessEntry>,
    side: &BTreeMap<ContentHash, KeylessEntry>,
) -> DeltaMap {
    let mut deltas = DeltaMap::new();
    for (hash, entry) in side {
        let base_count = base.get(hash).map(|e| e.count).unwrap_or(0);
        if entry.count != base_count {
            deltas.insert(
                hash.clone(),
                (entry.count as i64 - base_count as i64, entry.row.clone()),
            );
        }
    }
    for (hash, entry) in base {
        if !side.contains_key(hash) {
            deltas.insert(hash.clone(), (-(entry.count as i64), entry.row.clone()));
        }
    }
    deltas
}

fn apply_delta(
    merged: &mut BTreeMap<ContentHash, KeylessEntry>,
    hash: &ContentHash,
    (delta, row): &(i64, Row),
) {
    let current = merged.get(hash).map(|e| e.count as i64).unwrap_or(0);
    let next = current + delta;
    if next <= 0 {
        merged.remove(hash);
    } else {
        merged.insert(
            hash.clone(),
            KeylessEntry {
                row: row.clone(),
                count: next as u64,
            },
        );
    }
}

fn translate_keyless(
    state: &TableState,
    target: &Schema,
) -> Result<BTreeMap<ContentHash, KeylessEntry>, SchemaError> {
    let rows = match state.rows().as_keyless() {
        Some(rows) => rows,
        None => return Ok(BTreeMap::new()),
    };
    if state.schema() == target {
        return Ok(rows.clone());
    }
    let mut out: BTreeMap<ContentHash, KeylessEntry> = BTreeMap::new();
    for entry in rows.values() {
        let row = state.schema().translate_row(&entry.row, target)?;
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
