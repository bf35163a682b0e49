//! core::row
//!
//! Row storage for a single table state.
//!
//! # Two kinds of tables
//!
//! A keyed table maps primary-key tuple to row, exactly one row per
//! key. A keyless table has no natural row identity: it is a multiset
//! mapping the content hash of the full row to an occurrence count, so
//! duplicates are first-class and order-insensitive.
//!
//! The two kinds are a tagged union with a capability check
//! ([`RowSet::is_keyless`]), not separate types, because diff and merge
//! dispatch on kind per table.
//!
//! # Determinism
//!
//! Both variants store rows in `BTreeMap`s, so iteration is by
//! ascending key (keyed) or ascending hash (keyless). That ordering is
//! user-visible in diff output and must not change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::schema::{Schema, SchemaError};
use super::types::ContentHash;
use super::value::{Row, RowKey};

/// Errors from row-set mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowSetError {
    #[error("row not found")]
    RowNotFound,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// One hash bucket of a keyless table: a representative row and how
/// many times it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeylessEntry {
    pub row: Row,
    pub count: u64,
}

/// The rows of one table state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSet {
    /// Primary-keyed rows: one row per key.
    Keyed(BTreeMap<RowKey, Row>),
    /// Keyless multiset: content hash to occurrence count.
    Keyless(BTreeMap<ContentHash, KeylessEntry>),
}

impl RowSet {
    /// Create an empty row set matching the schema's key kind.
    pub fn new_for(schema: &Schema) -> Self {
        if schema.is_keyless() {
            RowSet::Keyless(BTreeMap::new())
        } else {
            RowSet::Keyed(BTreeMap::new())
        }
    }

    /// Whether this is a keyless multiset.
    pub fn is_keyless(&self) -> bool {
        matches!(self, RowSet::Keyless(_))
    }

    /// Total row count. For keyless tables this is the sum of all
    /// occurrence counts.
    pub fn row_count(&self) -> u64 {
        match self {
            RowSet::Keyed(rows) => rows.len() as u64,
            RowSet::Keyless(rows) => rows.values().map(|e| e.count).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RowSet::Keyed(rows) => rows.is_empty(),
            RowSet::Keyless(rows) => rows.is_empty(),
        }
    }

    /// Insert a row, validating it against the schema.
    ///
    /// Keyed: replaces any existing row under the same key, preserving
    /// the one-value-per-key invariant. Keyless: increments the count
    /// for the row's content hash.
    pub fn insert(&mut self, schema: &Schema, row: Row) -> Result<(), RowSetError> {
        match self {
            RowSet::Keyed(rows) => {
                let key = schema.key_of_row(&row)?;
                rows.insert(key, row);
            }
            RowSet::Keyless(rows) => {
                schema.check_row(&row)?;
                let hash = row.content_hash();
                rows.entry(hash)
                    .and_modify(|e| e.count += 1)
                    .or_insert(KeylessEntry { row, count: 1 });
            }
        }
        Ok(())
    }

    /// Delete one occurrence of a row.
    ///
    /// Keyed: removes the row under the row's key. Keyless: decrements
    /// the count for the row's content hash, removing the bucket when
    /// it reaches zero.
    ///
    /// # Errors
    ///
    /// Returns `RowNotFound` if the key or hash is absent.
    pub fn delete(&mut self, schema: &Schema, row: &Row) -> Result<(), RowSetError> {
        match self {
            RowSet::Keyed(rows) => {
                let key = schema.key_of_row(row)?;
                rows.remove(&key).ok_or(RowSetError::RowNotFound)?;
            }
            RowSet::Keyless(rows) => {
                schema.check_row(row)?;
                let hash = row.content_hash();
                let entry = rows.get_mut(&hash).ok_or(RowSetError::RowNotFound)?;
                entry.count -= 1;
                if entry.count == 0 {
                    rows.remove(&hash);
                }
            }
        }
        Ok(())
    }

    /// Remove a keyed row by key.
    pub fn delete_key(&mut self, key: &RowKey) -> Result<(), RowSetError> {
        match self {
            RowSet::Keyed(rows) => {
                rows.remove(key).ok_or(RowSetError::RowNotFound)?;
                Ok(())
            }
            RowSet::Keyless(_) => Err(RowSetError::RowNotFound),
        }
    }

    /// Get a keyed row.
    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        match self {
            RowSet::Keyed(rows) => rows.get(key),
            RowSet::Keyless(_) => None,
        }
    }

    /// Get a keyless bucket.
    pub fn get_hashed(&self, hash: &ContentHash) -> Option<&KeylessEntry> {
        match self {
            RowSet::Keyless(rows) => rows.get(hash),
            RowSet::Keyed(_) => None,
        }
    }

    /// The keyed map, if this set is keyed.
    pub fn as_keyed(&self) -> Option<&BTreeMap<RowKey, Row>> {
        match self {
            RowSet::Keyed(rows) => Some(rows),
            RowSet::Keyless(_) => None,
        }
    }

    /// The keyless multiset, if this set is keyless.
    pub fn as_keyless(&self) -> Option<&BTreeMap<ContentHash, KeylessEntry>> {
        match self {
            RowSet::Keyless(rows) => Some(rows),
            RowSet::Keyed(_) => None,
        }
    }

    /// Content hash over all rows in iteration order.
    pub fn content_hash(&self) -> ContentHash {
        let mut hasher = Sha256::new();
        match self {
            RowSet::Keyed(rows) => {
                hasher.update(b"keyed");
                for (key, row) in rows {
                    let mut buf = Vec::new();
                    for v in key.values() {
                        v.encode_into(&mut buf);
                    }
                    row.encode_into(&mut buf);
                    hasher.update(&buf);
                }
            }
            RowSet::Keyless(rows) => {
                hasher.update(b"keyless");
                for (hash, entry) in rows {
                    hasher.update(hash.as_str().as_bytes());
                    hasher.update(entry.count.to_be_bytes());
                }
            }
        }
        ContentHash::from_hasher(hasher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, TypeDesc};
    use crate::core::value::Value;

    fn keyed_schema() -> Schema {
        Schema::new(
            vec![
                Column::not_null(1u64, "pk", TypeDesc::int()),
                Column::new(2u64, "v", TypeDesc::int()),
            ],
            vec![1u64.into()],
        )
        .unwrap()
    }

    fn keyless_schema() -> Schema {
        Schema::keyless(vec![
            Column::new(1u64, "a", TypeDesc::int()),
            Column::new(2u64, "b", TypeDesc::int()),
        ])
        .unwrap()
    }

    fn row(a: i64, b: i64) -> Row {
        Row::new(vec![Value::Int(a), Value::Int(b)])
    }

    mod keyed {
        use super::*;

        #[test]
        fn insert_and_get() {
            let schema = keyed_schema();
            let mut rows = RowSet::new_for(&schema);
            rows.insert(&schema, row(1, 10)).unwrap();

            let key = RowKey::new(vec![Value::Int(1)]);
            assert_eq!(rows.get(&key), Some(&row(1, 10)));
            assert_eq!(rows.row_count(), 1);
        }

        #[test]
        fn insert_replaces_same_key() {
            let schema = keyed_schema();
            let mut rows = RowSet::new_for(&schema);
            rows.insert(&schema, row(1, 10)).unwrap();
            rows.insert(&schema, row(1, 20)).unwrap();

            let key = RowKey::new(vec![Value::Int(1)]);
            assert_eq!(rows.get(&key), Some(&row(1, 20)));
            assert_eq!(rows.row_count(), 1);
        }

        #[test]
        fn delete_removes_by_key() {
            let schema = keyed_schema();
            let mut rows = RowSet::new_for(&schema);
            rows.insert(&schema, row(1, 10)).unwrap();
            rows.delete(&schema, &row(1, 10)).unwrap();
            assert!(rows.is_empty());
        }

        #[test]
        fn delete_missing_fails() {
            let schema = keyed_schema();
            let mut rows = RowSet::new_for(&schema);
            assert_eq!(
                rows.delete(&schema, &row(1, 10)),
                Err(RowSetError::RowNotFound)
            );
        }

        #[test]
        fn iteration_is_key_ordered() {
            let schema = keyed_schema();
            let mut rows = RowSet::new_for(&schema);
            rows.insert(&schema, row(3, 0)).unwrap();
            rows.insert(&schema, row(1, 0)).unwrap();
            rows.insert(&schema, row(2, 0)).unwrap();

            let keys: Vec<_> = rows.as_keyed().unwrap().keys().cloned().collect();
            assert_eq!(
                keys,
                vec![
                    RowKey::new(vec![Value::Int(1)]),
                    RowKey::new(vec![Value::Int(2)]),
                    RowKey::new(vec![Value::Int(3)]),
                ]
            );
        }
    }

    mod keyless {
        use super::*;

        #[test]
        fn duplicates_are_counted() {
            let schema = keyless_schema();
            let mut rows = RowSet::new_for(&schema);
            rows.insert(&schema, row(1, 1)).unwrap();
            rows.insert(&schema, row(1, 1)).unwrap();
            rows.insert(&schema, row(2, 2)).unwrap();

            assert_eq!(rows.row_count(), 3);
            let hash = row(1, 1).content_hash();
            assert_eq!(rows.get_hashed(&hash).unwrap().count, 2);
        }

        #[test]
        fn total_count_equals_sum_of_buckets() {
            let schema = keyless_schema();
            let mut rows = RowSet::new_for(&schema);
            for _ in 0..5 {
                rows.insert(&schema, row(1, 1)).unwrap();
            }
            rows.insert(&schema, row(2, 2)).unwrap();

            let sum: u64 = rows.as_keyless().unwrap().values().map(|e| e.count).sum();
            assert_eq!(rows.row_count(), sum);
        }

        #[test]
        fn delete_decrements_then_removes() {
            let schema = keyless_schema();
            let mut rows = RowSet::new_for(&schema);
            rows.insert(&schema, row(1, 1)).unwrap();
            rows.insert(&schema, row(1, 1)).unwrap();

            rows.delete(&schema, &row(1, 1)).unwrap();
            assert_eq!(rows.row_count(), 1);

            rows.delete(&schema, &row(1, 1)).unwrap();
            assert!(rows.is_empty());

            assert_eq!(
                rows.delete(&schema, &row(1, 1)),
                Err(RowSetError::RowNotFound)
            );
        }

        #[test]
        fn insert_then_delete_restores_count() {
            let schema = keyless_schema();
            let mut rows = RowSet::new_for(&schema);
            rows.insert(&schema, row(1, 1)).unwrap();

            let before = rows.content_hash();
            rows.insert(&schema, row(1, 1)).unwrap();
            rows.delete(&schema, &row(1, 1)).unwrap();
            assert_eq!(rows.content_hash(), before);
        }
    }

    mod hashing {
        use super::*;

        #[test]
        fn insertion_order_does_not_matter() {
            let schema = keyed_schema();
            let mut a = RowSet::new_for(&schema);
            a.insert(&schema, row(1, 10)).unwrap();
            a.insert(&schema, row(2, 20)).unwrap();

            let mut b = RowSet::new_for(&schema);
            b.insert(&schema, row(2, 20)).unwrap();
            b.insert(&schema, row(1, 10)).unwrap();

            assert_eq!(a.content_hash(), b.content_hash());
        }

        #[test]
        fn keyed_and_keyless_hashes_differ_when_empty() {
            let keyed = RowSet::new_for(&keyed_schema());
            let keyless = RowSet::new_for(&keyless_schema());
            assert_ne!(keyed.content_hash(), keyless.content_hash());
        }
    }
}
