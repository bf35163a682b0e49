//! merge::schema_merge
//!
//! Three-way schema merging.
//!
//! Columns are merged by tag: a column changed on one side and
//! untouched on the other takes the changed definition, convergent
//! edits agree, and divergent edits collide. A column modified on one
//! side and dropped on the other also collides, because neither parent
//! expresses the other's intent. Indexes, checks, and foreign keys
//! merge the same way, by fragment name, without interpreting their
//! definitions.
//!
//! Primary-key divergence is not a collision but a hard error: row
//! identity itself would be undefined under any merged definition, so
//! the caller must fail the merge outright.

use thiserror::Error;

use crate::core::schema::{Column, Schema, SchemaError, SchemaFragment};
use crate::core::types::ColumnTag;

/// Errors from schema merging.
///
/// `PrimaryKeyMismatch` is fatal to the whole merge; the remaining
/// variants are recorded as a table-level conflict.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaMergeError {
    #[error("the primary key definitions differ between ours and theirs")]
    PrimaryKeyMismatch,

    #[error("conflicting definitions for column tag {0}")]
    TagCollision(ColumnTag),

    #[error("two columns with the name '{0}'")]
    NameCollision(String),

    #[error("conflicting definitions for {kind} '{name}'")]
    FragmentCollision { kind: &'static str, name: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Merge two schema revisions against their common ancestor.
///
/// `base` is `None` when the table was created independently on both
/// sides; every column then counts as an addition, and divergent
/// definitions for the same tag collide.
///
/// Merged column order is ours' order, then columns only theirs added.
pub fn merge_schemas(
    base: Option<&Schema>,
    ours: &Schema,
    theirs: &Schema,
) -> Result<Schema, SchemaMergeError> {
    if !ours.keys_diffable(theirs) {
        return Err(SchemaMergeError::PrimaryKeyMismatch);
    }
    if ours == theirs {
        return Ok(ours.clone());
    }

    let mut merged: Vec<Column> = Vec::new();

    for col in ours.columns() {
        match theirs.column_by_tag(col.tag) {
            Some(their_col) => {
                let base_col = base.and_then(|b| b.column_by_tag(col.tag));
                merged.push(merge_column(base_col, col, their_col)?);
            }
            None => match base.and_then(|b| b.column_by_tag(col.tag)) {
                // theirs never saw it: ours added it
                None => merged.push(col.clone()),
                Some(base_col) => {
                    if col == base_col {
                        // theirs dropped an untouched column
                        continue;
                    }
                    // modified here, dropped there
                    return Err(SchemaMergeError::TagCollision(col.tag));
                }
            },
        }
    }

    for col in theirs.columns() {
        if ours.column_by_tag(col.tag).is_some() {
            continue;
        }
        match base.and_then(|b| b.column_by_tag(col.tag)) {
            None => merged.push(col.clone()),
            Some(base_col) => {
                if col != base_col {
                    return Err(SchemaMergeError::TagCollision(col.tag));
                }
                // ours dropped an untouched column
            }
        }
    }

    // Distinct tags may still land on the same name, e.g. both sides
    // added a "status" column.
    for (i, a) in merged.iter().enumerate() {
        for b in &merged[i + 1..] {
            if a.name.eq_ignore_ascii_case(&b.name) {
                return Err(SchemaMergeError::NameCollision(a.name.clone()));
            }
        }
    }

    let schema = Schema::new(merged, ours.pk_tags().to_vec())?
        .with_indexes(merge_fragments(
            "index",
            base.map(Schema::indexes).unwrap_or_default(),
            ours.indexes(),
            theirs.indexes(),
        )?)
        .with_checks(merge_fragments(
            "check constraint",
            base.map(Schema::checks).unwrap_or_default(),
            ours.checks(),
            theirs.checks(),
        )?)
        .with_foreign_keys(merge_fragments(
            "foreign key",
            base.map(Schema::foreign_keys).unwrap_or_default(),
            ours.foreign_keys(),
            theirs.foreign_keys(),
        )?);
    Ok(schema)
}

fn merge_column(
    base: Option<&Column>,
    ours: &Column,
    theirs: &Column,
) -> Result<Column, SchemaMergeError> {
    if ours == theirs {
        return Ok(ours.clone());
    }
    match base {
        Some(base_col) if ours == base_col => Ok(theirs.clone()),
        Some(base_col) if theirs == base_col => Ok(ours.clone()),
        _ => Err(SchemaMergeError::TagCollision(ours.tag)),
    }
}

/// Three-way merge of one fragment list, matched by fragment name.
fn merge_fragments(
    kind: &'static str,
    base: &[SchemaFragment],
    ours: &[SchemaFragment],
    theirs: &[SchemaFragment],
) -> Result<Vec<SchemaFragment>, SchemaMergeError> {
    let find = |list: &[SchemaFragment], name: &str| -> Option<SchemaFragment> {
        list.iter().find(|f| f.name == name).cloned()
    };

    let mut merged = Vec::new();
    for frag in ours {
        match find(theirs, &frag.name) {
            Some(their_frag) => {
                if frag.definition == their_frag.definition {
                    merged.push(frag.clone());
                } else {
                    let base_frag = find(base, &frag.name);
                    match base_frag {
                        Some(b) if b.definition == frag.definition => merged.push(their_frag),
                        Some(b) if b.definition == their_frag.definition => {
                            merged.push(frag.clone())
                        }
                        _ => {
                            return Err(SchemaMergeError::FragmentCollision {
                                kind,
                                name: frag.name.clone(),
                            })
                        }
                    }
                }
            }
            None => match find(base, &frag.name) {
                None => merged.push(frag.clone()),
                Some(b) => {
                    if b.definition != frag.definition {
                        return Err(SchemaMergeError::FragmentCollision {
                            kind,
                            name: frag.name.clone(),
                        });
                    }
                    // theirs dropped an untouched fragment
                }
            },
        }
    }
    for frag in theirs {
        if find(ours, &frag.name).is_some() {
            continue;
        }
        match find(base, &frag.name) {
            None => merged.push(frag.clone()),
            Some(b) => {
                if b.definition != frag.definition {
                    return Err(SchemaMergeError::FragmentCollision {
                        kind,
                        name: frag.name.clone(),
                    });
                }
            }
        }
    }
    Ok(merged)
}
