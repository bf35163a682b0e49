//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ContentHash`] - SHA-256 content address of a row, table state, snapshot, or commit
//! - [`TableName`] - Validated table name
//! - [`BranchName`] - Validated branch name
//! - [`ColumnTag`] - Stable per-column identity surviving renames
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use verso::core::types::{BranchName, ContentHash, TableName};
//!
//! // Valid constructions
//! let branch = BranchName::new("feature/prices").unwrap();
//! let table = TableName::new("inventory").unwrap();
//! let hash = ContentHash::of_bytes(b"some content");
//!
//! // Invalid constructions fail at creation time
//! assert!(BranchName::new("bad..name").is_err());
//! assert!(TableName::new("").is_err());
//! assert!(ContentHash::new("not-a-hash").is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),
}

/// A SHA-256 content address.
///
/// Everything addressable in the engine - rows, table states, snapshots,
/// commits - is identified by the hash of its canonical encoding. Hashes
/// are normalized to lowercase hex.
///
/// # Example
///
/// ```
/// use verso::core::types::ContentHash;
///
/// let hash = ContentHash::of_bytes(b"hello");
/// assert_eq!(hash.as_str().len(), 64);
/// assert_eq!(hash, ContentHash::of_bytes(b"hello"));
///
/// // Abbreviated form for display
/// assert_eq!(hash.short(8).len(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Create a validated content hash from a hex string.
    ///
    /// The hash is normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidHash` if the string is not 64 hex characters.
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        let hash = hash.into().to_ascii_lowercase();
        Self::validate(&hash)?;
        Ok(Self(hash))
    }

    /// Hash a byte slice.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Finish a streaming hash computation.
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    /// Get an abbreviated form of the hash.
    ///
    /// Returns the first `len` characters, or the full hash if `len`
    /// exceeds its length.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(hash: &str) -> Result<(), TypeError> {
        if hash.len() != 64 {
            return Err(TypeError::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                hash.len()
            )));
        }
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidHash(
                "content hash must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the hash as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated table name.
///
/// Table names must be non-empty, must not contain control characters,
/// and must not begin or end with whitespace.
///
/// # Example
///
/// ```
/// use verso::core::types::TableName;
///
/// let name = TableName::new("inventory").unwrap();
/// assert_eq!(name.as_str(), "inventory");
///
/// assert!(TableName::new("").is_err());
/// assert!(TableName::new(" padded").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Create a new validated table name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTableName` if the name is invalid.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidTableName(
                "table name cannot be empty".into(),
            ));
        }
        if name.starts_with(char::is_whitespace) || name.ends_with(char::is_whitespace) {
            return Err(TypeError::InvalidTableName(
                "table name cannot begin or end with whitespace".into(),
            ));
        }
        for c in name.chars() {
            if c.is_ascii_control() {
                return Err(TypeError::InvalidTableName(
                    "table name cannot contain control characters".into(),
                ));
            }
        }
        Ok(())
    }

    /// Get the table name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TableName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated branch name.
///
/// Branch names must be non-empty, cannot start with `.` or `-`, cannot
/// end with `/`, and cannot contain whitespace, control characters, or
/// `..`.
///
/// # Example
///
/// ```
/// use verso::core::types::BranchName;
///
/// let name = BranchName::new("feature/prices").unwrap();
/// assert_eq!(name.as_str(), "feature/prices");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("bad..name").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name is invalid.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name.starts_with('.') || name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '.' or '-'".into(),
            ));
        }
        if name.ends_with('/') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot end with '/'".into(),
            ));
        }
        if name.contains("..") {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot contain '..'".into(),
            ));
        }
        for c in name.chars() {
            if c.is_whitespace() || c.is_ascii_control() {
                return Err(TypeError::InvalidBranchName(
                    "branch name cannot contain whitespace or control characters".into(),
                ));
            }
        }
        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable per-column identity.
///
/// Tags are assigned once when a column is created and never reused for
/// the lifetime of the table. Renames preserve the tag; dropping and
/// re-adding a column with the same name produces a new tag. Tags are
/// the unit of matching for schema diff and schema merge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ColumnTag(pub u64);

impl ColumnTag {
    /// Get the raw tag value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ColumnTag {
    fn from(tag: u64) -> Self {
        Self(tag)
    }
}

impl std::fmt::Display for ColumnTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UTC timestamp in RFC3339 format.
///
/// # Example
///
/// ```
/// use verso::core::types::UtcTimestamp;
///
/// let now = UtcTimestamp::now();
/// println!("Current time: {}", now);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod content_hash {
        use super::*;

        #[test]
        fn of_bytes_is_deterministic() {
            let a = ContentHash::of_bytes(b"content");
            let b = ContentHash::of_bytes(b"content");
            assert_eq!(a, b);
        }

        #[test]
        fn different_content_different_hash() {
            let a = ContentHash::of_bytes(b"one");
            let b = ContentHash::of_bytes(b"two");
            assert_ne!(a, b);
        }

        #[test]
        fn normalizes_to_lowercase() {
            let upper = "A".repeat(64);
            let hash = ContentHash::new(upper).unwrap();
            assert_eq!(hash.as_str(), "a".repeat(64));
        }

        #[test]
        fn invalid_length_rejected() {
            assert!(ContentHash::new("").is_err());
            assert!(ContentHash::new("abc123").is_err());
            assert!(ContentHash::new("a".repeat(40)).is_err());
        }

        #[test]
        fn non_hex_rejected() {
            assert!(ContentHash::new("z".repeat(64)).is_err());
        }

        #[test]
        fn short_form() {
            let hash = ContentHash::of_bytes(b"abc");
            assert_eq!(hash.short(8), &hash.as_str()[..8]);
            assert_eq!(hash.short(100), hash.as_str());
        }

        #[test]
        fn serde_roundtrip() {
            let hash = ContentHash::of_bytes(b"abc");
            let json = serde_json::to_string(&hash).unwrap();
            let parsed: ContentHash = serde_json::from_str(&json).unwrap();
            assert_eq!(hash, parsed);
        }
    }

    mod table_name {
        use super::*;

        #[test]
        fn valid_names() {
            assert!(TableName::new("inventory").is_ok());
            assert!(TableName::new("order_items").is_ok());
            assert!(TableName::new("Table2").is_ok());
        }

        #[test]
        fn empty_rejected() {
            assert!(TableName::new("").is_err());
        }

        #[test]
        fn surrounding_whitespace_rejected() {
            assert!(TableName::new(" padded").is_err());
            assert!(TableName::new("padded ").is_err());
        }

        #[test]
        fn control_chars_rejected() {
            assert!(TableName::new("has\ttab").is_err());
            assert!(TableName::new("has\nnewline").is_err());
        }

        #[test]
        fn serde_roundtrip() {
            let name = TableName::new("inventory").unwrap();
            let json = serde_json::to_string(&name).unwrap();
            let parsed: TableName = serde_json::from_str(&json).unwrap();
            assert_eq!(name, parsed);
        }
    }

    mod branch_name {
        use super::*;

        #[test]
        fn valid_names() {
            assert!(BranchName::new("main").is_ok());
            assert!(BranchName::new("feature/prices").is_ok());
            assert!(BranchName::new("fix-123").is_ok());
        }

        #[test]
        fn empty_rejected() {
            assert!(BranchName::new("").is_err());
        }

        #[test]
        fn leading_dot_or_dash_rejected() {
            assert!(BranchName::new(".hidden").is_err());
            assert!(BranchName::new("-flag").is_err());
        }

        #[test]
        fn trailing_slash_rejected() {
            assert!(BranchName::new("branch/").is_err());
        }

        #[test]
        fn double_dot_rejected() {
            assert!(BranchName::new("bad..name").is_err());
        }

        #[test]
        fn whitespace_rejected() {
            assert!(BranchName::new("has space").is_err());
        }

        #[test]
        fn serde_roundtrip() {
            let name = BranchName::new("feature/prices").unwrap();
            let json = serde_json::to_string(&name).unwrap();
            let parsed: BranchName = serde_json::from_str(&json).unwrap();
            assert_eq!(name, parsed);
        }
    }

    mod column_tag {
        use super::*;

        #[test]
        fn ordering_follows_value() {
            assert!(ColumnTag(1) < ColumnTag(2));
        }

        #[test]
        fn serde_is_transparent() {
            let tag = ColumnTag(42);
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, "42");
        }
    }

    mod utc_timestamp {
        use super::*;

        #[test]
        fn now_works() {
            let ts = UtcTimestamp::now();
            assert!(ts.to_string().contains('T'));
        }

        #[test]
        fn serde_roundtrip() {
            let ts = UtcTimestamp::now();
            let json = serde_json::to_string(&ts).unwrap();
            let parsed: UtcTimestamp = serde_json::from_str(&json).unwrap();
            assert_eq!(ts, parsed);
        }
    }
}
