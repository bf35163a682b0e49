//! diff
//!
//! Differencing between two table snapshots.
//!
//! # Modules
//!
//! - [`schema_diff`] - Column-level and key-definition schema diffs
//! - [`row_diff`] - Ordered row-level diffs for keyed and keyless tables
//! - [`stat`] - Aggregated counts, percentages, and table-delta summaries
//!
//! # Determinism
//!
//! Row diff entries are emitted in ascending primary-key order for
//! keyed tables and ascending content-hash order for keyless tables.
//! This ordering is user-visible and stable across runs.

pub mod row_diff;
pub mod schema_diff;
pub mod stat;

pub use row_diff::{diff_table_states, DiffEntry, DiffError, DiffKey, DiffKind, RowDiff};
pub use schema_diff::{diff_schemas, requires_rewrite, SchemaDiffEntry};
pub use stat::{DiffStats, TableDeltaSummary, TableDiffType};
