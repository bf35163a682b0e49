//! session
//!
//! The session: explicit, passed-in context for every versioned-table
//! operation.
//!
//! A session owns the snapshot store, the commit graph, the branch
//! table, a mutable working snapshot, and the conflict store. There is
//! no process-wide repository state: two sessions over different
//! stores are fully independent, and everything an operation needs
//! travels through `&mut Session`.
//!
//! # Operations
//!
//! - Working-set writes: [`Session::create_table`], [`Session::put_row`],
//!   [`Session::delete_row`], [`Session::drop_table`], [`Session::rename_table`]
//! - History: [`Session::commit`], [`Session::create_branch`],
//!   [`Session::checkout`]
//! - Differencing: [`Session::diff`]
//! - Merging: [`Session::merge`], [`Session::cherry_pick`],
//!   [`Session::resolve_conflicts`]
//!
//! # Conflict discipline
//!
//! A failed merge leaves the working snapshot holding the merged
//! result with ours' values on conflicted rows, and records the
//! conflicts. While any conflict is unresolved the session rejects
//! commits, merges, and writes to the conflicting rows; everything
//! else stays usable.

pub mod lock;

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::conflict::{ConflictError, ConflictStore, ResolutionPolicy};
use crate::core::config::Config;
use crate::core::graph::{Commit, CommitGraph, GraphError};
use crate::core::row::RowSetError;
use crate::core::schema::{Schema, SchemaError};
use crate::core::snapshot::{Snapshot, SnapshotError, TableState};
use crate::core::types::{BranchName, ContentHash, TableName, TypeError};
use crate::core::value::Row;
use crate::diff::row_diff::{diff_table_states, DiffError, RowDiff};
use crate::diff::schema_diff::{diff_schemas, SchemaDiffEntry};
use crate::diff::stat::{DiffStats, TableDeltaSummary};
use crate::merge::{
    cherry_pick_snapshot, merge_snapshots, CherryPickError, MergeError, MergeOutcome,
};
use crate::store::{MemoryStore, SnapshotStore, StoreError};

pub use lock::{LockError, WorkingSetLock};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown branch '{0}'")]
    UnknownBranch(BranchName),

    #[error("branch '{0}' already exists")]
    BranchExists(BranchName),

    #[error("cannot delete the checked-out branch '{0}'")]
    BranchCheckedOut(BranchName),

    #[error("unknown revision '{0}'")]
    UnknownRevision(String),

    #[error("table '{0}' does not exist")]
    UnknownTable(TableName),

    #[error("table '{0}' already exists")]
    TableExists(TableName),

    #[error("cannot {0}: working set has uncommitted changes")]
    DirtyWorkingSet(&'static str),

    #[error("cannot {operation}: {count} unresolved conflicts")]
    UnresolvedConflicts {
        operation: &'static str,
        count: usize,
    },

    #[error("merge produced {count} conflicts; resolve them to continue")]
    MergeConflicts { count: usize },

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("no common ancestor between the merged branches")]
    NoCommonAncestor,

    #[error("table '{table}' row {key} is in conflict; resolve before writing")]
    WriteBlocked { table: TableName, key: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    CherryPick(#[from] CherryPickError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    RowSet(#[from] RowSetError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Everything the differencer reports about one table.
#[derive(Debug, Clone)]
pub struct TableDiffReport {
    pub summary: TableDeltaSummary,
    pub schema_diff: Vec<SchemaDiffEntry>,
    pub row_diff: RowDiff,
    pub stats: DiffStats,
}

/// A versioned-table session over a snapshot store.
#[derive(Debug)]
pub struct Session<S: SnapshotStore = MemoryStore> {
    store: S,
    graph: CommitGraph,
    branches: BTreeMap<BranchName, ContentHash>,
    head: BranchName,
    working: Snapshot,
    conflicts: ConflictStore,
    /// Second parent of a conflicted merge awaiting resolution; the
    /// commit that concludes the resolution consumes it.
    pending_merge: Option<ContentHash>,
    /// Held for the session's lifetime when the session was opened
    /// with a lock directory.
    lock: Option<WorkingSetLock>,
    config: Config,
}

impl Session<MemoryStore> {
    /// Create a session over a fresh in-memory store.
    pub fn new(config: Config) -> Self {
        Self::with_store(MemoryStore::new(), config)
    }
}

impl Default for Session<MemoryStore> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<S: SnapshotStore> Session<S> {
    /// Create a session over `store`, with an initial empty commit on
    /// the configured default branch.
    pub fn with_store(mut store: S, config: Config) -> Self {
        let mut graph = CommitGraph::new();
        let root = store.put_snapshot(Snapshot::empty());
        let init = Commit::new(root, Vec::new(), "initialize repository");
        let init_hash = init.hash().clone();
        // inserting a parentless commit into an empty graph cannot fail
        let _ = graph.insert(init);

        let head = config.default_branch();
        let mut branches = BTreeMap::new();
        branches.insert(head.clone(), init_hash);

        info!(branch = %head, "initialized session");
        Self {
            store,
            graph,
            branches,
            head,
            working: Snapshot::empty(),
            conflicts: ConflictStore::new(),
            pending_merge: None,
            lock: None,
            config,
        }
    }

    /// Create a session over `store`, holding the exclusive working-set
    /// lock at `dir` for the session's lifetime.
    ///
    /// Readers never need the lock; a second writer over the same
    /// directory fails with [`LockError::AlreadyLocked`].
    pub fn with_lock_dir(store: S, config: Config, dir: &Path) -> Result<Self, SessionError> {
        let lock = WorkingSetLock::acquire(dir)?;
        let mut session = Self::with_store(store, config);
        session.lock = Some(lock);
        Ok(session)
    }

    /// Whether this session holds a working-set lock.
    pub fn holds_lock(&self) -> bool {
        self.lock.as_ref().is_some_and(WorkingSetLock::is_held)
    }

    pub fn head(&self) -> &BranchName {
        &self.head
    }

    pub fn working(&self) -> &Snapshot {
        &self.working
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn conflicts(&self) -> &ConflictStore {
        &self.conflicts
    }

    /// The commit the checked-out branch points at.
    pub fn head_commit(&self) -> Result<&Commit, SessionError> {
        let hash = self
            .branches
            .get(&self.head)
            .ok_or_else(|| SessionError::UnknownBranch(self.head.clone()))?;
        Ok(self.graph.get(hash)?)
    }

    /// Branch names in ascending order.
    pub fn branches(&self) -> impl Iterator<Item = &BranchName> {
        self.branches.keys()
    }

    /// Whether the working snapshot differs from the head commit.
    pub fn is_dirty(&self) -> Result<bool, SessionError> {
        Ok(&self.working.content_hash() != self.head_commit()?.root())
    }

    /// Resolve a branch name or full commit hash to a commit hash.
    pub fn resolve_rev(&self, rev: &str) -> Result<ContentHash, SessionError> {
        if let Ok(branch) = BranchName::new(rev) {
            if let Some(hash) = self.branches.get(&branch) {
                return Ok(hash.clone());
            }
        }
        if let Ok(hash) = ContentHash::new(rev) {
            if self.graph.contains(&hash) {
                return Ok(hash);
            }
        }
        Err(SessionError::UnknownRevision(rev.to_string()))
    }

    /// The committed snapshot a revision points at.
    pub fn snapshot_at(&self, rev: &str) -> Result<Snapshot, SessionError> {
        let hash = self.resolve_rev(rev)?;
        let commit = self.graph.get(&hash)?;
        Ok(self.store.load_snapshot(commit.root())?)
    }

    // ---- working-set writes ----

    /// Create an empty table in the working snapshot.
    pub fn create_table(&mut self, name: TableName, schema: Schema) -> Result<(), SessionError> {
        if self.working.has_table(&name) {
            return Err(SessionError::TableExists(name));
        }
        debug!(table = %name, "create table");
        self.working = self.working.with_table(name, TableState::empty(schema));
        Ok(())
    }

    /// Drop a table from the working snapshot.
    pub fn drop_table(&mut self, name: &TableName) -> Result<(), SessionError> {
        if !self.working.has_table(name) {
            return Err(SessionError::UnknownTable(name.clone()));
        }
        debug!(table = %name, "drop table");
        self.working = self.working.without_table(name);
        Ok(())
    }

    /// Rename a table in the working snapshot, keeping its state.
    pub fn rename_table(&mut self, from: &TableName, to: TableName) -> Result<(), SessionError> {
        let state = self
            .working
            .table(from)
            .cloned()
            .ok_or_else(|| SessionError::UnknownTable(from.clone()))?;
        if self.working.has_table(&to) {
            return Err(SessionError::TableExists(to));
        }
        debug!(from = %from, to = %to, "rename table");
        self.working = self.working.without_table(from).with_table(to, state);
        Ok(())
    }

    /// Insert or replace a row in a working table.
    ///
    /// # Errors
    ///
    /// Returns `WriteBlocked` when the row (or, for table-level
    /// conflicts, the whole table) has an unresolved conflict.
    pub fn put_row(&mut self, table: &TableName, row: Row) -> Result<(), SessionError> {
        let state = self
            .working
            .table(table)
            .ok_or_else(|| SessionError::UnknownTable(table.clone()))?;
        let (schema, mut rows) = state.clone().into_parts();
        self.check_write_allowed(table, &schema, &row)?;
        rows.insert(&schema, row)?;
        self.working = self
            .working
            .with_table(table.clone(), TableState::new(schema, rows)?);
        Ok(())
    }

    /// Delete one row (one occurrence, for keyless tables) from a
    /// working table.
    pub fn delete_row(&mut self, table: &TableName, row: &Row) -> Result<(), SessionError> {
        let state = self
            .working
            .table(table)
            .ok_or_else(|| SessionError::UnknownTable(table.clone()))?;
        let (schema, mut rows) = state.clone().into_parts();
        self.check_write_allowed(table, &schema, row)?;
        rows.delete(&schema, row)?;
        self.working = self
            .working
            .with_table(table.clone(), TableState::new(schema, rows)?);
        Ok(())
    }

    /// Replace a table's schema in the working snapshot, translating
    /// existing rows into the new schema.
    pub fn alter_table(&mut self, table: &TableName, schema: Schema) -> Result<(), SessionError> {
        let state = self
            .working
            .table(table)
            .ok_or_else(|| SessionError::UnknownTable(table.clone()))?;
        if self.conflicts.is_in_conflict(table) {
            return Err(SessionError::WriteBlocked {
                table: table.clone(),
                key: "(schema)".to_string(),
            });
        }
        let mut rows = crate::core::row::RowSet::new_for(&schema);
        match state.rows() {
            crate::core::row::RowSet::Keyed(map) => {
                for row in map.values() {
                    rows.insert(&schema, state.schema().translate_row(row, &schema)?)?;
                }
            }
            crate::core::row::RowSet::Keyless(map) => {
                for entry in map.values() {
                    for _ in 0..entry.count {
                        rows.insert(&schema, state.schema().translate_row(&entry.row, &schema)?)?;
                    }
                }
            }
        }
        debug!(table = %table, "alter table");
        self.working = self
            .working
            .with_table(table.clone(), TableState::new(schema, rows)?);
        Ok(())
    }

    fn check_write_allowed(
        &self,
        table: &TableName,
        schema: &Schema,
        row: &Row,
    ) -> Result<(), SessionError> {
        let Some(set) = self.conflicts.conflicts(table) else {
            return Ok(());
        };
        if set.table_conflict.is_some() {
            return Err(SessionError::WriteBlocked {
                table: table.clone(),
                key: "(table)".to_string(),
            });
        }
        if !schema.is_keyless() {
            let key = schema.key_of_row(row)?;
            if set.blocks_key(&key) {
                return Err(SessionError::WriteBlocked {
                    table: table.clone(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    // ---- history ----

    /// Commit the working snapshot to the checked-out branch.
    ///
    /// A commit that concludes a resolved merge carries both merge
    /// parents, and is allowed even when resolution left the working
    /// snapshot equal to head: the ancestry is the point.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedConflicts` while any conflict is recorded,
    /// and `NothingToCommit` when the working snapshot matches head
    /// and no merge is pending.
    pub fn commit(&mut self, message: impl Into<String>) -> Result<ContentHash, SessionError> {
        if !self.conflicts.is_empty() {
            return Err(SessionError::UnresolvedConflicts {
                operation: "commit",
                count: self.conflicts.total(),
            });
        }
        let parent = self.head_commit()?.hash().clone();
        if self.pending_merge.is_none() && !self.is_dirty()? {
            return Err(SessionError::NothingToCommit);
        }

        let mut parents = vec![parent];
        parents.extend(self.pending_merge.take());

        let root = self.store.put_snapshot(self.working.clone());
        let commit = Commit::new(root, parents, message);
        let hash = commit.hash().clone();
        self.graph.insert(commit)?;
        self.branches.insert(self.head.clone(), hash.clone());
        info!(branch = %self.head, commit = %hash.short(8), "committed");
        Ok(hash)
    }

    /// Create a branch pointing at the current head commit.
    pub fn create_branch(&mut self, name: BranchName) -> Result<(), SessionError> {
        if self.branches.contains_key(&name) {
            return Err(SessionError::BranchExists(name));
        }
        let head = self.head_commit()?.hash().clone();
        debug!(branch = %name, at = %head.short(8), "create branch");
        self.branches.insert(name, head);
        Ok(())
    }

    /// Delete a branch. The checked-out branch cannot be deleted.
    pub fn delete_branch(&mut self, name: &BranchName) -> Result<(), SessionError> {
        if name == &self.head {
            return Err(SessionError::BranchCheckedOut(name.clone()));
        }
        self.branches
            .remove(name)
            .ok_or_else(|| SessionError::UnknownBranch(name.clone()))?;
        Ok(())
    }

    /// Check out a branch, replacing the working snapshot with its
    /// committed snapshot.
    ///
    /// # Errors
    ///
    /// Requires a clean working set and no unresolved conflicts.
    pub fn checkout(&mut self, name: &BranchName) -> Result<(), SessionError> {
        if !self.conflicts.is_empty() {
            return Err(SessionError::UnresolvedConflicts {
                operation: "checkout",
                count: self.conflicts.total(),
            });
        }
        if self.is_dirty()? {
            return Err(SessionError::DirtyWorkingSet("checkout"));
        }
        let hash = self
            .branches
            .get(name)
            .ok_or_else(|| SessionError::UnknownBranch(name.clone()))?;
        let commit = self.graph.get(hash)?;
        self.working = self.store.load_snapshot(commit.root())?;
        self.head = name.clone();
        // leaving the branch abandons any resolved-but-uncommitted merge
        self.pending_merge = None;
        info!(branch = %name, "checked out");
        Ok(())
    }

    // ---- differencing ----

    /// Diff two revisions, optionally scoped to one table.
    ///
    /// Reports are ordered by table name. Renames are paired when a
    /// removed and an added table carry identical content; a table
    /// whose column tag set changed wholesale is reported as a full
    /// rewrite (all rows deleted, then added).
    pub fn diff(
        &self,
        from_rev: &str,
        to_rev: &str,
        table: Option<&TableName>,
    ) -> Result<Vec<TableDiffReport>, SessionError> {
        let from = self.snapshot_at(from_rev)?;
        let to = self.snapshot_at(to_rev)?;
        diff_snapshots(&from, &to, table)
    }

    /// Diff a revision against the working snapshot.
    pub fn diff_working(
        &self,
        from_rev: &str,
        table: Option<&TableName>,
    ) -> Result<Vec<TableDiffReport>, SessionError> {
        let from = self.snapshot_at(from_rev)?;
        diff_snapshots(&from, &self.working, table)
    }

    // ---- merging ----

    /// Merge another branch into the checked-out branch.
    ///
    /// Fast-forwards when head is an ancestor of `theirs` and the
    /// config allows it. When `theirs` is already reachable from head
    /// the merge is a no-op returning the current snapshot.
    ///
    /// # Errors
    ///
    /// Requires a clean working set and no unresolved conflicts. A
    /// conflicted merge records its conflicts, leaves the working
    /// snapshot holding ours' values for the conflicted rows, and
    /// returns `MergeConflicts`; once every conflict is resolved the
    /// next [`Session::commit`] concludes the merge with both parents.
    pub fn merge(&mut self, theirs: &BranchName) -> Result<MergeOutcome, SessionError> {
        if !self.conflicts.is_empty() {
            return Err(SessionError::UnresolvedConflicts {
                operation: "merge",
                count: self.conflicts.total(),
            });
        }
        if self.is_dirty()? {
            return Err(SessionError::DirtyWorkingSet("merge"));
        }
        // a new merge supersedes any resolved-but-uncommitted one
        self.pending_merge = None;

        let ours_hash = self.head_commit()?.hash().clone();
        let theirs_hash = self
            .branches
            .get(theirs)
            .ok_or_else(|| SessionError::UnknownBranch(theirs.clone()))?
            .clone();

        if self.graph.is_ancestor(&theirs_hash, &ours_hash)? {
            debug!(branch = %theirs, "merge is a no-op: already up to date");
            return Ok(MergeOutcome {
                merged: self.working.clone(),
                ..Default::default()
            });
        }

        if self.config.fast_forward() && self.graph.is_ancestor(&ours_hash, &theirs_hash)? {
            let commit = self.graph.get(&theirs_hash)?;
            let snapshot = self.store.load_snapshot(commit.root())?;
            self.branches.insert(self.head.clone(), theirs_hash.clone());
            self.working = snapshot.clone();
            info!(branch = %theirs, "fast-forward merge");
            return Ok(MergeOutcome {
                merged: snapshot,
                fast_forward: true,
                ..Default::default()
            });
        }

        let base_hash = self
            .graph
            .merge_base(&ours_hash, &theirs_hash)?
            .ok_or(SessionError::NoCommonAncestor)?;
        let base = self.store.load_snapshot(self.graph.get(&base_hash)?.root())?;
        let ours = self.store.load_snapshot(self.graph.get(&ours_hash)?.root())?;
        let theirs_snapshot = self
            .store
            .load_snapshot(self.graph.get(&theirs_hash)?.root())?;

        let outcome = merge_snapshots(&base, &ours, &theirs_snapshot)?;

        if !outcome.is_clean() {
            let count = outcome.conflict_count();
            for (table, set) in &outcome.conflicts {
                self.conflicts.record(table.clone(), set.clone());
            }
            self.working = outcome.merged.clone();
            self.pending_merge = Some(theirs_hash);
            info!(branch = %theirs, conflicts = count, "merge conflicted");
            return Err(SessionError::MergeConflicts { count });
        }

        let root = self.store.put_snapshot(outcome.merged.clone());
        let commit = Commit::new(
            root,
            vec![ours_hash, theirs_hash],
            format!("Merge branch '{}'", theirs),
        );
        let hash = commit.hash().clone();
        self.graph.insert(commit)?;
        self.branches.insert(self.head.clone(), hash.clone());
        self.working = outcome.merged.clone();
        info!(branch = %theirs, commit = %hash.short(8), "merged");
        Ok(outcome)
    }

    /// Apply one commit's delta onto the working snapshot and commit
    /// it under the source commit's message.
    ///
    /// # Errors
    ///
    /// The source must be an ordinary single-parent commit; the
    /// working set must be clean. Conflicts behave as in [`Session::merge`].
    pub fn cherry_pick(&mut self, rev: &str) -> Result<ContentHash, SessionError> {
        if !self.conflicts.is_empty() {
            return Err(SessionError::UnresolvedConflicts {
                operation: "cherry-pick",
                count: self.conflicts.total(),
            });
        }
        if self.is_dirty()? {
            return Err(SessionError::DirtyWorkingSet("cherry-pick"));
        }
        self.pending_merge = None;

        let source_hash = self.resolve_rev(rev)?;
        let source_commit = self.graph.get(&source_hash)?;
        let parent_hash = match source_commit.parents() {
            [] => return Err(CherryPickError::RootCommit.into()),
            [parent] => parent.clone(),
            _ => return Err(CherryPickError::MergeCommit.into()),
        };
        let message = source_commit.message().to_string();

        let base = self
            .store
            .load_snapshot(self.graph.get(&parent_hash)?.root())?;
        let source = self.store.load_snapshot(source_commit.root())?;

        let outcome = cherry_pick_snapshot(&base, &source, &self.working)?;

        if !outcome.is_clean() {
            let count = outcome.conflict_count();
            for (table, set) in &outcome.conflicts {
                self.conflicts.record(table.clone(), set.clone());
            }
            self.working = outcome.merged;
            info!(source = %source_hash.short(8), conflicts = count, "cherry-pick conflicted");
            return Err(SessionError::MergeConflicts { count });
        }

        let parent = self.head_commit()?.hash().clone();
        let root = self.store.put_snapshot(outcome.merged.clone());
        let commit = Commit::new(root, vec![parent], message);
        let hash = commit.hash().clone();
        self.graph.insert(commit)?;
        self.branches.insert(self.head.clone(), hash.clone());
        self.working = outcome.merged;
        info!(source = %source_hash.short(8), commit = %hash.short(8), "cherry-picked");
        Ok(hash)
    }

    /// Resolve one table's conflicts with an ours/theirs policy,
    /// applying the chosen values to the working snapshot.
    pub fn resolve_conflicts(
        &mut self,
        table: &TableName,
        policy: ResolutionPolicy,
    ) -> Result<(), SessionError> {
        self.working = self.conflicts.resolve(table, policy, &self.working)?;
        info!(table = %table, ?policy, "resolved conflicts");
        Ok(())
    }
}

/// Diff two snapshots table by table.
fn diff_snapshots(
    from: &Snapshot,
    to: &Snapshot,
    filter: Option<&TableName>,
) -> Result<Vec<TableDiffReport>, SessionError> {
    let mut reports = Vec::new();

    // Pair removed-and-added tables with identical content as renames.
    let mut renamed_from: BTreeMap<&TableName, &TableName> = BTreeMap::new();
    let mut rename_targets: BTreeMap<&TableName, &TableName> = BTreeMap::new();
    for (old_name, old_state) in from.tables() {
        if to.has_table(old_name) {
            continue;
        }
        let old_hash = old_state.content_hash();
        let candidate = to.tables().find(|(new_name, new_state)| {
            !from.has_table(new_name)
                && !rename_targets.contains_key(*new_name)
                && new_state.content_hash() == old_hash
        });
        if let Some((new_name, _)) = candidate {
            renamed_from.insert(old_name, new_name);
            rename_targets.insert(new_name, old_name);
        }
    }

    for (name, from_state) in from.tables() {
        if let Some(filter) = filter {
            let renamed_to = renamed_from.get(name).copied();
            if name != filter && renamed_to != Some(filter) {
                continue;
            }
        }
        match to.table(name) {
            Some(to_state) => {
                if from_state.content_hash() == to_state.content_hash() {
                    continue;
                }
                reports.push(table_report(name, from_state, Some(name), Some(to_state))?);
            }
            None => match renamed_from.get(name) {
                Some(&new_name) => {
                    // pure rename; the differ sees identical states
                    let to_state = to
                        .table(new_name)
                        .ok_or_else(|| SessionError::UnknownTable(new_name.clone()))?;
                    reports.push(table_report(name, from_state, Some(new_name), Some(to_state))?);
                }
                None => reports.push(table_report(name, from_state, None, None)?),
            },
        }
    }

    for (name, to_state) in to.tables() {
        if from.has_table(name) || rename_targets.contains_key(name) {
            continue;
        }
        if let Some(filter) = filter {
            if name != filter {
                continue;
            }
        }
        reports.push(added_table_report(name, to_state)?);
    }

    Ok(reports)
}

fn table_report(
    from_name: &TableName,
    from_state: &TableState,
    to_name: Option<&TableName>,
    to_state: Option<&TableState>,
) -> Result<TableDiffReport, SessionError> {
    match (to_name, to_state) {
        (Some(to_name), Some(to_state)) => {
            let summary = TableDeltaSummary::classify(
                Some((from_name, from_state)),
                Some((to_name, to_state)),
            )
            .ok_or_else(|| SessionError::UnknownTable(from_name.clone()))?;
            let schema_diff = diff_schemas(from_state.schema(), to_state.schema());
            let row_diff = match diff_table_states(from_state, to_state) {
                Ok(diff) => diff,
                // tag set replaced wholesale: report a full rewrite
                Err(DiffError::ColumnSetMismatch) | Err(DiffError::KeyMismatch) => {
                    rewrite_diff(from_state, to_state)?
                }
                Err(e) => return Err(e.into()),
            };
            let stats = DiffStats::from_diff(
                &row_diff,
                from_state.schema().columns().len(),
                to_state.schema().columns().len(),
            );
            Ok(TableDiffReport {
                summary,
                schema_diff,
                row_diff,
                stats,
            })
        }
        _ => {
            // deleted table: diff against an empty state of the same schema
            let empty = TableState::empty(from_state.schema().clone());
            let summary = TableDeltaSummary::classify(Some((from_name, from_state)), None)
                .ok_or_else(|| SessionError::UnknownTable(from_name.clone()))?;
            let schema_diff = diff_schemas(from_state.schema(), from_state.schema());
            let row_diff = diff_table_states(from_state, &empty)?;
            let stats = DiffStats::from_diff(
                &row_diff,
                from_state.schema().columns().len(),
                from_state.schema().columns().len(),
            );
            Ok(TableDiffReport {
                summary,
                schema_diff,
                row_diff,
                stats,
            })
        }
    }
}

fn added_table_report(
    name: &TableName,
    state: &TableState,
) -> Result<TableDiffReport, SessionError> {
    let empty = TableState::empty(state.schema().clone());
    let summary = TableDeltaSummary::classify(None, Some((name, state)))
        .ok_or_else(|| SessionError::UnknownTable(name.clone()))?;
    let row_diff = diff_table_states(&empty, state)?;
    let stats = DiffStats::from_diff(
        &row_diff,
        state.schema().columns().len(),
        state.schema().columns().len(),
    );
    Ok(TableDiffReport {
        summary,
        schema_diff: Vec::new(),
        row_diff,
        stats,
    })
}

/// All old rows deleted, all new rows added; used when two states are
/// too different for a keyed diff.
fn rewrite_diff(from: &TableState, to: &TableState) -> Result<RowDiff, SessionError> {
    let empty_from = TableState::empty(from.schema().clone());
    let empty_to = TableState::empty(to.schema().clone());
    let deletions = diff_table_states(from, &empty_from)?;
    let additions = diff_table_states(&empty_to, to)?;

    let mut entries = deletions.entries;
    entries.extend(additions.entries);
    Ok(RowDiff {
        entries,
        rows_unmodified: 0,
        old_row_count: deletions.old_row_count,
        new_row_count: additions.new_row_count,
    })
}
