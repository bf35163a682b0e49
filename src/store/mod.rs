//! store
//!
//! The storage boundary: snapshots in, snapshots out, addressed by
//! content hash.
//!
//! Persistence, chunking, and on-disk layout are assumed to live
//! behind this trait; the engine only relies on content addressing
//! being stable. [`MemoryStore`] is the in-process implementation used
//! by sessions and tests.

use std::collections::HashMap;

use thiserror::Error;

use crate::core::snapshot::{Snapshot, TableState};
use crate::core::types::{ContentHash, TableName};

/// Errors from snapshot storage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(ContentHash),
}

/// Content-addressed snapshot storage.
pub trait SnapshotStore {
    /// Store a snapshot, returning its content hash. Storing the same
    /// content twice is a no-op returning the same hash.
    fn put_snapshot(&mut self, snapshot: Snapshot) -> ContentHash;

    /// Load a snapshot by its content hash.
    fn load_snapshot(&self, root: &ContentHash) -> Result<Snapshot, StoreError>;

    /// Load one table's state out of a stored snapshot. `Ok(None)`
    /// means the snapshot exists but has no such table.
    fn load_table_state(
        &self,
        root: &ContentHash,
        table: &TableName,
    ) -> Result<Option<TableState>, StoreError> {
        Ok(self.load_snapshot(root)?.table(table).cloned())
    }

    /// Whether a snapshot with this hash is stored.
    fn contains(&self, root: &ContentHash) -> bool;
}

/// In-memory content-addressed store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    snapshots: HashMap<ContentHash, Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    fn put_snapshot(&mut self, snapshot: Snapshot) -> ContentHash {
        let hash = snapshot.content_hash();
        self.snapshots.entry(hash.clone()).or_insert(snapshot);
        hash
    }

    fn load_snapshot(&self, root: &ContentHash) -> Result<Snapshot, StoreError> {
        self.snapshots
            .get(root)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSnapshot(root.clone()))
    }

    fn contains(&self, root: &ContentHash) -> bool {
        self.snapshots.contains_key(root)
    }
}
