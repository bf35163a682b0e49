//! Verso - a versioned-table diff and three-way merge engine
//!
//! Verso brings Git-style version control semantics to relational
//! tables: immutable snapshots addressed by content hash, a commit
//! graph with branches, structural diffs over rows and schemas, and
//! three-way merge with explicit conflict resolution.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`core`] - Domain types, values, schemas, snapshots, the commit graph
//! - [`diff`] - Row and schema differencing, diff statistics
//! - [`merge`] - Three-way snapshot merge and cherry-pick
//! - [`conflict`] - Conflict records and ours/theirs resolution
//! - [`store`] - Content-addressed snapshot storage
//! - [`session`] - The mutable working set: writes, commits, branches
//!
//! # Correctness Invariants
//!
//! Verso maintains the following invariants:
//!
//! 1. Snapshots are immutable; writes produce successor states
//! 2. Equal content hashes to equal addresses, on any history path
//! 3. Columns are matched by stable tag, never by name or position
//! 4. A conflicted merge never silently drops either side's changes
//!
//! # Example
//!
//! ```
//! use verso::core::config::Config;
//! use verso::core::schema::{Column, Schema, TypeDesc};
//! use verso::core::types::TableName;
//! use verso::core::value::{Row, Value};
//! use verso::session::Session;
//!
//! let mut session = Session::new(Config::default());
//!
//! let schema = Schema::new(
//!     vec![
//!         Column::not_null(1u64, "id", TypeDesc::int()),
//!         Column::new(2u64, "name", TypeDesc::varchar(80)),
//!     ],
//!     vec![1u64.into()],
//! )?;
//! let table = TableName::new("users")?;
//! session.create_table(table.clone(), schema)?;
//! session.put_row(&table, Row::new(vec![Value::Int(1), Value::Text("ada".into())]))?;
//! session.commit("add users")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod conflict;
pub mod core;
pub mod diff;
pub mod merge;
pub mod session;
pub mod store;
