//! core::schema
//!
//! The table schema model: columns with stable tags, primary-key
//! definitions, and opaque schema fragments.
//!
//! # Invariants
//!
//! - Column tags are unique within a schema and immutable across the
//!   table's lifetime
//! - Column names are unique case-insensitively
//! - Every primary-key tag refers to an existing column
//! - An empty primary-key list means the table is keyless
//!
//! # Fragments
//!
//! Secondary indexes, check constraints, and foreign keys are carried
//! through diff and merge as opaque named fragments. They must match
//! between merge parents or produce a schema conflict; the engine never
//! interprets their contents.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{ColumnTag, ContentHash};
use super::value::{Row, RowKey, Value};

/// Errors from schema construction and row translation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate column tag {0}")]
    DuplicateTag(ColumnTag),

    #[error("duplicate column name '{0}'")]
    DuplicateName(String),

    #[error("column name cannot be empty")]
    EmptyName,

    #[error("primary key references unknown tag {0}")]
    UnknownPkTag(ColumnTag),

    #[error("duplicate primary key tag {0}")]
    DuplicatePkTag(ColumnTag),

    #[error("row has {got} values, schema has {want} columns")]
    ArityMismatch { got: usize, want: usize },

    #[error("primary key column '{0}' cannot be NULL")]
    NullKeyColumn(String),
}

/// Character set and collation of a string column.
///
/// Changing either always requires a full table rewrite, so they are
/// modeled explicitly rather than folded into the type kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Charset {
    pub charset: String,
    pub collation: String,
}

impl Charset {
    /// The engine default, used when tests don't care.
    pub fn utf8() -> Self {
        Self {
            charset: "utf8mb4".into(),
            collation: "utf8mb4_0900_bin".into(),
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_str(buf, &self.charset);
        encode_str(buf, &self.collation);
    }
}

/// A column type descriptor.
///
/// Carries exactly enough structure to classify a type change as
/// rewrite-required or in-place; it is not a full SQL type system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDesc {
    Bool,
    /// Signed integer with width in bytes (1, 2, 4, 8).
    Int { width: u8 },
    /// Unsigned integer with width in bytes.
    Uint { width: u8 },
    /// Floating point with width in bytes (4 or 8).
    Float { width: u8 },
    Decimal { precision: u8, scale: u8 },
    /// Fixed-width character string.
    Char { len: u32, charset: Charset },
    /// Variable-length character string.
    VarChar { max_len: u32, charset: Charset },
    /// Fixed-width binary string.
    Binary { len: u32 },
    /// Variable-length binary string.
    VarBinary { max_len: u32 },
    Enum { values: Vec<String> },
    Set { values: Vec<String> },
    Date,
    Datetime,
}

impl TypeDesc {
    /// Shorthand for a 4-byte signed integer.
    pub fn int() -> Self {
        TypeDesc::Int { width: 4 }
    }

    /// Shorthand for an unbounded-enough varchar.
    pub fn varchar(max_len: u32) -> Self {
        TypeDesc::VarChar {
            max_len,
            charset: Charset::utf8(),
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            TypeDesc::Bool => buf.push(0),
            TypeDesc::Int { width } => {
                buf.push(1);
                buf.push(*width);
            }
            TypeDesc::Uint { width } => {
                buf.push(2);
                buf.push(*width);
            }
            TypeDesc::Float { width } => {
                buf.push(3);
                buf.push(*width);
            }
            TypeDesc::Decimal { precision, scale } => {
                buf.push(4);
                buf.push(*precision);
                buf.push(*scale);
            }
            TypeDesc::Char { len, charset } => {
                buf.push(5);
                buf.extend_from_slice(&len.to_be_bytes());
                charset.encode_into(buf);
            }
            TypeDesc::VarChar { max_len, charset } => {
                buf.push(6);
                buf.extend_from_slice(&max_len.to_be_bytes());
                charset.encode_into(buf);
            }
            TypeDesc::Binary { len } => {
                buf.push(7);
                buf.extend_from_slice(&len.to_be_bytes());
            }
            TypeDesc::VarBinary { max_len } => {
                buf.push(8);
                buf.extend_from_slice(&max_len.to_be_bytes());
            }
            TypeDesc::Enum { values } => {
                buf.push(9);
                encode_strs(buf, values);
            }
            TypeDesc::Set { values } => {
                buf.push(10);
                encode_strs(buf, values);
            }
            TypeDesc::Date => buf.push(11),
            TypeDesc::Datetime => buf.push(12),
        }
    }
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub tag: ColumnTag,
    pub name: String,
    pub ty: TypeDesc,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl Column {
    /// Create a nullable column with no default.
    pub fn new(tag: impl Into<ColumnTag>, name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            tag: tag.into(),
            name: name.into(),
            ty,
            nullable: true,
            default: None,
        }
    }

    /// Create a non-nullable column with no default.
    pub fn not_null(tag: impl Into<ColumnTag>, name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            nullable: false,
            ..Self::new(tag, name, ty)
        }
    }

    /// Definition equality ignoring the name, used to detect renames.
    pub fn same_definition(&self, other: &Column) -> bool {
        self.tag == other.tag
            && self.ty == other.ty
            && self.nullable == other.nullable
            && self.default == other.default
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.tag.as_u64().to_be_bytes());
        encode_str(buf, &self.name);
        self.ty.encode_into(buf);
        buf.push(self.nullable as u8);
        match &self.default {
            Some(v) => {
                buf.push(1);
                v.encode_into(buf);
            }
            None => buf.push(0),
        }
    }
}

/// An opaque schema fragment: a secondary index, check constraint, or
/// foreign key, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaFragment {
    pub name: String,
    pub definition: String,
}

impl SchemaFragment {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
        }
    }
}

/// An ordered table schema.
///
/// # Example
///
/// ```
/// use verso::core::schema::{Column, Schema, TypeDesc};
///
/// let schema = Schema::new(
///     vec![
///         Column::not_null(1u64, "pk", TypeDesc::int()),
///         Column::new(2u64, "v", TypeDesc::int()),
///     ],
///     vec![1u64.into()],
/// )
/// .unwrap();
///
/// assert!(!schema.is_keyless());
/// assert_eq!(schema.columns().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
    pk_tags: Vec<ColumnTag>,
    #[serde(default)]
    indexes: Vec<SchemaFragment>,
    #[serde(default)]
    checks: Vec<SchemaFragment>,
    #[serde(default)]
    foreign_keys: Vec<SchemaFragment>,
}

impl Schema {
    /// Create a validated schema.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` on duplicate tags, duplicate names
    /// (case-insensitive), or primary-key tags that don't refer to a
    /// column.
    pub fn new(columns: Vec<Column>, pk_tags: Vec<ColumnTag>) -> Result<Self, SchemaError> {
        let mut tags = BTreeSet::new();
        let mut names = BTreeSet::new();
        for col in &columns {
            if col.name.is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if !tags.insert(col.tag) {
                return Err(SchemaError::DuplicateTag(col.tag));
            }
            if !names.insert(col.name.to_lowercase()) {
                return Err(SchemaError::DuplicateName(col.name.clone()));
            }
        }
        let mut pk_seen = BTreeSet::new();
        for tag in &pk_tags {
            if !tags.contains(tag) {
                return Err(SchemaError::UnknownPkTag(*tag));
            }
            if !pk_seen.insert(*tag) {
                return Err(SchemaError::DuplicatePkTag(*tag));
            }
        }
        Ok(Self {
            columns,
            pk_tags,
            indexes: Vec::new(),
            checks: Vec::new(),
            foreign_keys: Vec::new(),
        })
    }

    /// Create a keyless schema.
    pub fn keyless(columns: Vec<Column>) -> Result<Self, SchemaError> {
        Self::new(columns, Vec::new())
    }

    /// Replace the fragment lists, consuming self (builder style).
    pub fn with_indexes(mut self, indexes: Vec<SchemaFragment>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn with_checks(mut self, checks: Vec<SchemaFragment>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_foreign_keys(mut self, foreign_keys: Vec<SchemaFragment>) -> Self {
        self.foreign_keys = foreign_keys;
        self
    }

    /// The ordered column list.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The ordered primary-key tags. Empty for keyless tables.
    pub fn pk_tags(&self) -> &[ColumnTag] {
        &self.pk_tags
    }

    pub fn indexes(&self) -> &[SchemaFragment] {
        &self.indexes
    }

    pub fn checks(&self) -> &[SchemaFragment] {
        &self.checks
    }

    pub fn foreign_keys(&self) -> &[SchemaFragment] {
        &self.foreign_keys
    }

    /// Whether the table has no primary key.
    pub fn is_keyless(&self) -> bool {
        self.pk_tags.is_empty()
    }

    /// Look up a column by tag.
    pub fn column_by_tag(&self, tag: ColumnTag) -> Option<&Column> {
        self.columns.iter().find(|c| c.tag == tag)
    }

    /// Look up a column's position by tag.
    pub fn index_of_tag(&self, tag: ColumnTag) -> Option<usize> {
        self.columns.iter().position(|c| c.tag == tag)
    }

    /// Look up a column by name, case-insensitively.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The set of all column tags.
    pub fn tag_set(&self) -> BTreeSet<ColumnTag> {
        self.columns.iter().map(|c| c.tag).collect()
    }

    /// Whether both schemas describe the same row identity: equal
    /// primary-key tag lists and equal key-column definitions.
    ///
    /// This is the precondition for three-way row merging; primary-key
    /// divergence is never auto-mergeable.
    pub fn keys_diffable(&self, other: &Schema) -> bool {
        if self.pk_tags != other.pk_tags {
            return false;
        }
        self.pk_tags.iter().all(|tag| {
            match (self.column_by_tag(*tag), other.column_by_tag(*tag)) {
                (Some(a), Some(b)) => a.ty == b.ty,
                _ => false,
            }
        })
    }

    /// Whether the fragment lists (indexes, checks, foreign keys) match.
    pub fn fragments_equal(&self, other: &Schema) -> bool {
        self.indexes == other.indexes
            && self.checks == other.checks
            && self.foreign_keys == other.foreign_keys
    }

    /// Validate a row against this schema and extract its primary key.
    ///
    /// # Errors
    ///
    /// Returns `ArityMismatch` if the row width differs from the column
    /// count, or `NullKeyColumn` if a key cell is NULL.
    pub fn key_of_row(&self, row: &Row) -> Result<RowKey, SchemaError> {
        self.check_row(row)?;
        let mut key = Vec::with_capacity(self.pk_tags.len());
        for tag in &self.pk_tags {
            // new() guarantees every pk tag resolves to a column
            let idx = self
                .index_of_tag(*tag)
                .ok_or(SchemaError::UnknownPkTag(*tag))?;
            let val = row.get(idx).ok_or(SchemaError::ArityMismatch {
                got: row.len(),
                want: self.columns.len(),
            })?;
            if val.is_null() {
                let name = self.columns[idx].name.clone();
                return Err(SchemaError::NullKeyColumn(name));
            }
            key.push(val.clone());
        }
        Ok(RowKey::new(key))
    }

    /// Validate a row's arity against this schema.
    pub fn check_row(&self, row: &Row) -> Result<(), SchemaError> {
        if row.len() != self.columns.len() {
            return Err(SchemaError::ArityMismatch {
                got: row.len(),
                want: self.columns.len(),
            });
        }
        Ok(())
    }

    /// Translate a row from this schema's column order into `target`'s.
    ///
    /// Cells are matched by tag. Tags missing from this schema are
    /// filled with the target column's default, or NULL. Tags dropped by
    /// the target are discarded. Used to re-key rows under a merged
    /// schema before row merging.
    pub fn translate_row(&self, row: &Row, target: &Schema) -> Result<Row, SchemaError> {
        self.check_row(row)?;
        let mut out = Vec::with_capacity(target.columns.len());
        for col in &target.columns {
            match self.index_of_tag(col.tag) {
                Some(idx) => out.push(row.get(idx).cloned().unwrap_or(Value::Null)),
                None => out.push(col.default.clone().unwrap_or(Value::Null)),
            }
        }
        Ok(Row::new(out))
    }

    /// Content hash of the schema definition.
    ///
    /// Computed over the canonical byte encoding, the same discipline
    /// rows use: a pure function of columns, key tags, and fragments.
    pub fn content_hash(&self) -> ContentHash {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.columns.len() as u64).to_be_bytes());
        for col in &self.columns {
            col.encode_into(&mut buf);
        }
        buf.extend_from_slice(&(self.pk_tags.len() as u64).to_be_bytes());
        for tag in &self.pk_tags {
            buf.extend_from_slice(&tag.as_u64().to_be_bytes());
        }
        for fragments in [&self.indexes, &self.checks, &self.foreign_keys] {
            buf.extend_from_slice(&(fragments.len() as u64).to_be_bytes());
            for frag in fragments {
                encode_str(&mut buf, &frag.name);
                encode_str(&mut buf, &frag.definition);
            }
        }
        ContentHash::of_bytes(&buf)
    }

    /// The next unused tag, for callers growing a schema.
    pub fn next_tag(&self) -> ColumnTag {
        ColumnTag(
            self.columns
                .iter()
                .map(|c| c.tag.as_u64())
                .max()
                .map(|t| t + 1)
                .unwrap_or(0),
        )
    }
}

/// Length-prefixed string encoding, shared by every schema part.
fn encode_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn encode_strs(buf: &mut Vec<u8>, values: &[String]) {
    buf.extend_from_slice(&(values.len() as u64).to_be_bytes());
    for v in values {
        encode_str(buf, v);
    }
}
