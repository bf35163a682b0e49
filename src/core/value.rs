//! core::value
//!
//! The cell value model and row representation.
//!
//! # Ordering
//!
//! Diff and merge output must be deterministic, so [`Value`] carries a
//! total order: values are ranked by variant first, then compared within
//! the variant. Floats use `f64::total_cmp`, so NaN is ordered rather
//! than poisonous and `Eq`/`Ord` are lawful.
//!
//! # Canonical encoding
//!
//! Content addressing requires a stable byte encoding. Every value
//! encodes as a discriminant byte followed by a fixed-width or
//! length-prefixed payload; rows concatenate their value encodings.
//! The encoding is an implementation detail of hashing, not a wire
//! format.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::ContentHash;

/// A single cell value.
///
/// # Example
///
/// ```
/// use verso::core::value::Value;
///
/// let a = Value::Int(1);
/// let b = Value::Int(2);
/// assert!(a < b);
/// assert!(Value::Null < a);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Check whether this is the SQL NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Variant rank used as the major sort key.
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Uint(_) => 3,
            Value::Float(_) => 4,
            Value::Text(_) => 5,
            Value::Bytes(_) => 6,
        }
    }

    /// Append the canonical encoding of this value to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.rank());
        match self {
            Value::Null => {}
            Value::Bool(b) => buf.push(*b as u8),
            Value::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
            Value::Uint(u) => buf.extend_from_slice(&u.to_be_bytes()),
            Value::Float(f) => buf.extend_from_slice(&f.to_bits().to_be_bytes()),
            Value::Text(s) => {
                buf.extend_from_slice(&(s.len() as u64).to_be_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                buf.extend_from_slice(&(b.len() as u64).to_be_bytes());
                buf.extend_from_slice(b);
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Uint(a), Value::Uint(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf.hash(state);
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Uint(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

/// An ordered tuple of cell values, parallel to a schema's column list.
///
/// # Example
///
/// ```
/// use verso::core::value::{Row, Value};
///
/// let row = Row::new(vec![Value::Int(1), Value::Text("widget".into())]);
/// assert_eq!(row.len(), 2);
/// assert_eq!(row.get(0), Some(&Value::Int(1)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Vec<Value>);

impl Row {
    /// Create a row from a value tuple.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of cells in the row.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the value at a column position.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    /// Iterate over the cell values in column order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    /// Number of non-null cells, used by diff statistics.
    pub fn non_null_cells(&self) -> u64 {
        self.0.iter().filter(|v| !v.is_null()).count() as u64
    }

    /// Append the canonical encoding of the row to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.0.len() as u64).to_be_bytes());
        for v in &self.0 {
            v.encode_into(buf);
        }
    }

    /// Content hash of the full row.
    ///
    /// This is the row identity for keyless tables.
    pub fn content_hash(&self) -> ContentHash {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        let mut hasher = Sha256::new();
        hasher.update(&buf);
        ContentHash::from_hasher(hasher)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// A primary-key tuple extracted from a row.
///
/// Keys order lexicographically by value, which fixes the iteration
/// order of keyed diffs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(Vec<Value>);

impl RowKey {
    /// Create a key from a value tuple.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Iterate over the key values in primary-key order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod value {
        use super::*;

        #[test]
        fn null_sorts_first() {
            assert!(Value::Null < Value::Bool(false));
            assert!(Value::Null < Value::Int(i64::MIN));
            assert!(Value::Null < Value::Text(String::new()));
        }

        #[test]
        fn ints_order_numerically() {
            assert!(Value::Int(-5) < Value::Int(3));
            assert!(Value::Int(3) < Value::Int(10));
        }

        #[test]
        fn floats_use_total_order() {
            assert!(Value::Float(1.0) < Value::Float(2.0));
            // NaN is ordered, not equal to itself being a problem
            let nan = Value::Float(f64::NAN);
            assert_eq!(nan.cmp(&nan), std::cmp::Ordering::Equal);
        }

        #[test]
        fn equality_matches_ordering() {
            assert_eq!(Value::Text("a".into()), Value::Text("a".into()));
            assert_ne!(Value::Int(1), Value::Uint(1));
        }

        #[test]
        fn encoding_distinguishes_variants() {
            let mut a = Vec::new();
            let mut b = Vec::new();
            Value::Int(1).encode_into(&mut a);
            Value::Uint(1).encode_into(&mut b);
            assert_ne!(a, b);
        }

        #[test]
        fn serde_roundtrip() {
            let vals = vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(-7),
                Value::Uint(7),
                Value::Float(1.5),
                Value::Text("hello".into()),
                Value::Bytes(vec![0, 1, 2]),
            ];
            let json = serde_json::to_string(&vals).unwrap();
            let parsed: Vec<Value> = serde_json::from_str(&json).unwrap();
            assert_eq!(vals, parsed);
        }
    }

    mod row {
        use super::*;

        #[test]
        fn content_hash_is_deterministic() {
            let row = Row::new(vec![Value::Int(1), Value::Text("a".into())]);
            assert_eq!(row.content_hash(), row.content_hash());
        }

        #[test]
        fn different_rows_different_hash() {
            let a = Row::new(vec![Value::Int(1)]);
            let b = Row::new(vec![Value::Int(2)]);
            assert_ne!(a.content_hash(), b.content_hash());
        }

        #[test]
        fn hash_sensitive_to_value_type() {
            let a = Row::new(vec![Value::Int(1)]);
            let b = Row::new(vec![Value::Uint(1)]);
            assert_ne!(a.content_hash(), b.content_hash());
        }

        #[test]
        fn non_null_cells_skips_nulls() {
            let row = Row::new(vec![Value::Int(1), Value::Null, Value::Text("x".into())]);
            assert_eq!(row.non_null_cells(), 2);
        }

        #[test]
        fn rows_order_lexicographically() {
            let a = Row::new(vec![Value::Int(1), Value::Int(9)]);
            let b = Row::new(vec![Value::Int(2), Value::Int(0)]);
            assert!(a < b);
        }
    }

    mod row_key {
        use super::*;

        #[test]
        fn display_renders_tuple() {
            let key = RowKey::new(vec![Value::Int(1), Value::Text("a".into())]);
            assert_eq!(key.to_string(), "(1, a)");
        }

        #[test]
        fn keys_order_by_value() {
            let a = RowKey::new(vec![Value::Int(1)]);
            let b = RowKey::new(vec![Value::Int(2)]);
            assert!(a < b);
        }
    }
}
