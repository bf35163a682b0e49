//! core::snapshot
//!
//! Immutable table states and snapshots.
//!
//! # Immutability
//!
//! A [`TableState`] is created whenever a table is written and
//! superseded, never mutated, by the next state for that table. A
//! [`Snapshot`] maps table name to table state and is addressed by a
//! content hash that is a pure function of its states. Readers always
//! reference a fully-built snapshot by hash, which is the engine's
//! principal concurrency safety mechanism.
//!
//! Mutating helpers ([`Snapshot::with_table`], [`Snapshot::without_table`])
//! return a new snapshot and leave the receiver untouched.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::row::RowSet;
use super::schema::Schema;
use super::types::{ContentHash, TableName};

/// Errors from snapshot construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("row set kind does not match schema for table: keyed vs keyless")]
    KindMismatch,
}

/// The schema and rows of one table at one point in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    schema: Schema,
    rows: RowSet,
}

impl TableState {
    /// Create a table state, checking that the row set kind matches the
    /// schema's key kind.
    pub fn new(schema: Schema, rows: RowSet) -> Result<Self, SnapshotError> {
        if schema.is_keyless() != rows.is_keyless() {
            return Err(SnapshotError::KindMismatch);
        }
        Ok(Self { schema, rows })
    }

    /// Create an empty table state for a schema.
    pub fn empty(schema: Schema) -> Self {
        let rows = RowSet::new_for(&schema);
        Self { schema, rows }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    /// Split into parts, for building a successor state.
    pub fn into_parts(self) -> (Schema, RowSet) {
        (self.schema, self.rows)
    }

    /// Content hash over schema and rows.
    pub fn content_hash(&self) -> ContentHash {
        let mut hasher = Sha256::new();
        hasher.update(self.schema.content_hash().as_str().as_bytes());
        hasher.update(self.rows.content_hash().as_str().as_bytes());
        ContentHash::from_hasher(hasher)
    }
}

/// An immutable mapping from table name to table state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    tables: BTreeMap<TableName, TableState>,
}

impl Snapshot {
    /// The empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a table state.
    pub fn table(&self, name: &TableName) -> Option<&TableState> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &TableName) -> bool {
        self.tables.contains_key(name)
    }

    /// Iterate table names in ascending order.
    pub fn table_names(&self) -> impl Iterator<Item = &TableName> {
        self.tables.keys()
    }

    /// Iterate (name, state) pairs in ascending name order.
    pub fn tables(&self) -> impl Iterator<Item = (&TableName, &TableState)> {
        self.tables.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// A copy of this snapshot with one table replaced or added.
    pub fn with_table(&self, name: TableName, state: TableState) -> Snapshot {
        let mut tables = self.tables.clone();
        tables.insert(name, state);
        Snapshot { tables }
    }

    /// A copy of this snapshot with one table removed.
    ///
    /// Removing an absent table is a no-op copy.
    pub fn without_table(&self, name: &TableName) -> Snapshot {
        let mut tables = self.tables.clone();
        tables.remove(name);
        Snapshot { tables }
    }

    /// Content hash over all table states in name order.
    ///
    /// A pure function of the table states: identical content reached
    /// on divergent history paths hashes identically.
    pub fn content_hash(&self) -> ContentHash {
        let mut hasher = Sha256::new();
        for (name, state) in &self.tables {
            hasher.update(name.as_str().as_bytes());
            hasher.update(b"\0");
            hasher.update(state.content_hash().as_str().as_bytes());
            hasher.update(b"\n");
        }
        ContentHash::from_hasher(hasher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, TypeDesc};
    use crate::core::value::{Row, Value};

    fn schema() -> Schema {
        Schema::new(
            vec![
                Column::not_null(1u64, "pk", TypeDesc::int()),
                Column::new(2u64, "v", TypeDesc::int()),
            ],
            vec![1u64.into()],
        )
        .unwrap()
    }

    fn name(s: &str) -> TableName {
        TableName::new(s).unwrap()
    }

    #[test]
    fn kind_mismatch_rejected() {
        let keyless_rows = RowSet::Keyless(Default::default());
        assert_eq!(
            TableState::new(schema(), keyless_rows).unwrap_err(),
            SnapshotError::KindMismatch
        );
    }

    #[test]
    fn with_table_leaves_original_untouched() {
        let snapshot = Snapshot::empty();
        let next = snapshot.with_table(name("t"), TableState::empty(schema()));

        assert!(snapshot.is_empty());
        assert!(next.has_table(&name("t")));
    }

    #[test]
    fn without_table_removes() {
        let snapshot = Snapshot::empty().with_table(name("t"), TableState::empty(schema()));
        let next = snapshot.without_table(&name("t"));
        assert!(!next.has_table(&name("t")));
        assert!(snapshot.has_table(&name("t")));
    }

    #[test]
    fn hash_is_pure_function_of_content() {
        let mut rows = RowSet::new_for(&schema());
        rows.insert(&schema(), Row::new(vec![Value::Int(1), Value::Int(2)]))
            .unwrap();
        let state = TableState::new(schema(), rows).unwrap();

        let a = Snapshot::empty().with_table(name("t"), state.clone());
        let b = Snapshot::empty().with_table(name("t"), state);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = Snapshot::empty().with_table(name("t"), TableState::empty(schema()));

        let mut rows = RowSet::new_for(&schema());
        rows.insert(&schema(), Row::new(vec![Value::Int(1), Value::Int(2)]))
            .unwrap();
        let b = Snapshot::empty()
            .with_table(name("t"), TableState::new(schema(), rows).unwrap());

        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn empty_snapshots_hash_equal() {
        assert_eq!(
            Snapshot::empty().content_hash(),
            Snapshot::empty().content_hash()
        );
    }
}
