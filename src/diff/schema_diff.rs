//! diff::schema_diff
//!
//! Column-level schema differencing.
//!
//! Columns are matched across the two schemas by tag, never by name or
//! position, so a rename is a distinct change kind rather than a
//! drop-and-add. Each entry also classifies as rewrite-required or
//! in-place via [`requires_rewrite`]: an in-place change only touches
//! the schema record, while a rewrite-required change forces every
//! stored row to be re-encoded.

use serde::{Deserialize, Serialize};

use crate::core::schema::{Column, Schema, TypeDesc};
use crate::core::types::ColumnTag;

/// One entry in a schema diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaDiffEntry {
    /// A column present only in the newer schema.
    ColumnAdded { column: Column },

    /// A column present only in the older schema.
    ColumnDropped { column: Column },

    /// Same tag, different name, same definition otherwise.
    ColumnRenamed {
        tag: ColumnTag,
        from: String,
        to: String,
    },

    /// Same tag, changed type, nullability, or default.
    ColumnTypeChanged { from: Column, to: Column },

    /// The primary-key definition changed: a different tag list, or a
    /// key column was retyped.
    PrimaryKeyChanged {
        from: Vec<ColumnTag>,
        to: Vec<ColumnTag>,
    },
}

impl SchemaDiffEntry {
    /// The tag of the column this entry concerns, when it concerns one.
    pub fn tag(&self) -> Option<ColumnTag> {
        match self {
            SchemaDiffEntry::ColumnAdded { column } => Some(column.tag),
            SchemaDiffEntry::ColumnDropped { column } => Some(column.tag),
            SchemaDiffEntry::ColumnRenamed { tag, .. } => Some(*tag),
            SchemaDiffEntry::ColumnTypeChanged { to, .. } => Some(to.tag),
            SchemaDiffEntry::PrimaryKeyChanged { .. } => None,
        }
    }
}

/// Compute the column-level diff from `from` to `to`.
///
/// Entries are emitted in a stable order: drops in `from` column order,
/// then renames and type changes in `to` column order, then adds in
/// `to` column order, then at most one primary-key entry. A column
/// that is both renamed and retyped produces two entries.
pub fn diff_schemas(from: &Schema, to: &Schema) -> Vec<SchemaDiffEntry> {
    let to_tags = to.tag_set();
    let from_tags = from.tag_set();

    let mut entries = Vec::new();

    for col in from.columns() {
        if !to_tags.contains(&col.tag) {
            entries.push(SchemaDiffEntry::ColumnDropped {
                column: col.clone(),
            });
        }
    }

    for col in to.columns() {
        let Some(old) = from.column_by_tag(col.tag) else {
            continue;
        };
        if old.name != col.name {
            entries.push(SchemaDiffEntry::ColumnRenamed {
                tag: col.tag,
                from: old.name.clone(),
                to: col.name.clone(),
            });
        }
        if !old.same_definition(col) {
            entries.push(SchemaDiffEntry::ColumnTypeChanged {
                from: old.clone(),
                to: col.clone(),
            });
        }
    }

    for col in to.columns() {
        if !from_tags.contains(&col.tag) {
            entries.push(SchemaDiffEntry::ColumnAdded {
                column: col.clone(),
            });
        }
    }

    let pk_changed = from.pk_tags() != to.pk_tags()
        || from.pk_tags().iter().any(|tag| {
            match (from.column_by_tag(*tag), to.column_by_tag(*tag)) {
                (Some(a), Some(b)) => a.ty != b.ty,
                _ => true,
            }
        });
    if pk_changed {
        entries.push(SchemaDiffEntry::PrimaryKeyChanged {
            from: from.pk_tags().to_vec(),
            to: to.pk_tags().to_vec(),
        });
    }

    entries
}

/// Whether applying this schema change forces a full table rewrite.
///
/// Adds, drops, and renames are always in-place: rows are keyed by tag,
/// so neither column order nor column name affects stored bytes.
/// Primary-key changes always rewrite. Type changes dispatch on the
/// type pair.
pub fn requires_rewrite(entry: &SchemaDiffEntry) -> bool {
    match entry {
        SchemaDiffEntry::ColumnAdded { .. }
        | SchemaDiffEntry::ColumnDropped { .. }
        | SchemaDiffEntry::ColumnRenamed { .. } => false,
        SchemaDiffEntry::PrimaryKeyChanged { .. } => true,
        SchemaDiffEntry::ColumnTypeChanged { from, to } => type_change_requires_rewrite(&from.ty, &to.ty),
    }
}

/// Classify a type change as rewrite-required or in-place.
///
/// In-place changes are the ones whose existing encodings remain valid
/// under the new type: growing a variable-length maximum, or appending
/// values to an enum or set. Everything else, including narrowing and
/// any fixed-width resize, rewrites.
fn type_change_requires_rewrite(from: &TypeDesc, to: &TypeDesc) -> bool {
    use TypeDesc::*;

    if from == to {
        return false;
    }
    match (from, to) {
        // Fixed-width numerics: any width or precision change re-encodes
        // every cell. Scale changes reinterpret stored digits.
        (Int { width: a }, Int { width: b })
        | (Uint { width: a }, Uint { width: b })
        | (Float { width: a }, Float { width: b }) => a != b,
        (
            Decimal {
                precision: p1,
                scale: s1,
            },
            Decimal {
                precision: p2,
                scale: s2,
            },
        ) => p1 != p2 || s1 != s2,

        // Fixed-width strings are padded to their length, and a charset
        // or collation change invalidates both encoding and sort order.
        (
            Char {
                len: l1,
                charset: c1,
            },
            Char {
                len: l2,
                charset: c2,
            },
        ) => l1 != l2 || c1 != c2,
        (Binary { len: a }, Binary { len: b }) => a != b,

        // Variable-length: widening keeps every stored value valid.
        (
            VarChar {
                max_len: l1,
                charset: c1,
            },
            VarChar {
                max_len: l2,
                charset: c2,
            },
        ) => c1 != c2 || l2 < l1,
        (VarBinary { max_len: a }, VarBinary { max_len: b }) => b < a,

        // Enums and sets store member ordinals, so appending values is
        // safe but reordering or removing them is not.
        (Enum { values: a }, Enum { values: b }) | (Set { values: a }, Set { values: b }) => {
            !is_prefix(a, b)
        }

        // Cross-kind changes always rewrite.
        _ => true,
    }
}

fn is_prefix(old: &[String], new: &[String]) -> bool {
    new.len() >= old.len() && new[..old.len()] == *old
}
