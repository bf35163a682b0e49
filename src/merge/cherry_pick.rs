//! merge::cherry_pick
//!
//! Cherry-pick: apply one commit's delta onto the working snapshot.
//!
//! A cherry-pick is a degenerate three-way merge where the base is the
//! picked commit's parent snapshot, theirs is the picked commit's
//! snapshot, and ours is the working snapshot. Unlike a full merge it
//! is stricter about schemas: any table the picked delta touches must
//! carry the same schema in the working snapshot, because replaying a
//! row delta across a schema change silently reinterprets columns.
//!
//! The commit-graph side (single-parent requirement, locating the
//! parent, committing the result under the source message) lives with
//! the session; this module is pure snapshot work.

use thiserror::Error;

use crate::core::snapshot::Snapshot;
use crate::core::types::TableName;

use super::{merge_snapshots, MergeError, MergeOutcome};

/// Errors from cherry-picking.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CherryPickError {
    #[error("cherry-picking a merge commit is not supported")]
    MergeCommit,

    #[error("cherry-picking a root commit is not supported")]
    RootCommit,

    #[error("no changes were made")]
    EmptyDelta,

    #[error("table '{0}' schema does not match; cherry-pick requires matching schemas")]
    SchemaMismatch(TableName),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Apply the delta `base -> source` onto `working`.
///
/// # Errors
///
/// Returns `EmptyDelta` when the picked commit changed nothing, or
/// when its changes are already present in `working`;
/// `SchemaMismatch` when a touched table's working schema differs from
/// the source's.
pub fn cherry_pick_snapshot(
    base: &Snapshot,
    source: &Snapshot,
    working: &Snapshot,
) -> Result<MergeOutcome, CherryPickError> {
    if base.content_hash() == source.content_hash() {
        return Err(CherryPickError::EmptyDelta);
    }

    for (name, expected) in touched_tables(base, source) {
        if let (Some(schema), Some(state)) = (expected, working.table(name)) {
            if state.schema() != schema {
                return Err(CherryPickError::SchemaMismatch(name.clone()));
            }
        }
    }

    let outcome = merge_snapshots(base, working, source)?;
    if outcome.is_clean() && outcome.merged.content_hash() == working.content_hash() {
        return Err(CherryPickError::EmptyDelta);
    }
    Ok(outcome)
}

/// Tables whose state differs between `base` and `source`, with the
/// schema the delta expects (the source's, or the base's for a table
/// the delta drops).
fn touched_tables<'a>(
    base: &'a Snapshot,
    source: &'a Snapshot,
) -> impl Iterator<Item = (&'a TableName, Option<&'a crate::core::schema::Schema>)> {
    let mut names: Vec<&TableName> = base.table_names().chain(source.table_names()).collect();
    names.sort();
    names.dedup();
    names.into_iter().filter_map(move |name| {
        let b = base.table(name);
        let s = source.table(name);
        let changed = match (b, s) {
            (None, None) => false,
            (Some(b), Some(s)) => b.content_hash() != s.content_hash(),
            _ => true,
        };
        changed.then(|| {
            (
                name,
                s.map(|state| state.schema())
                    .or_else(|| b.map(|state| state.schema())),
            )
        })
    })
}
