//! core
//!
//! Core domain types for versioned tables.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ContentHash, TableName, BranchName, ColumnTag
//! - [`value`] - Cell values, rows, and row keys
//! - [`schema`] - Column and schema model with stable tags
//! - [`row`] - Keyed and keyless row sets
//! - [`snapshot`] - Immutable table states and snapshots
//! - [`graph`] - Commit graph arena and traversal
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Snapshots and commits are immutable once constructed
//! - All iteration orders are deterministic

pub mod config;
pub mod graph;
pub mod row;
pub mod schema;
pub mod snapshot;
pub mod types;
pub mod value;
