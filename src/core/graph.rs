//! core::graph
//!
//! Commit graph representation and traversal.
//!
//! # Architecture
//!
//! The commit graph is an append-only DAG:
//! - Nodes are commits, indexed by content hash in an arena
//! - Edges are explicit parent-hash lists (one parent for ordinary
//!   commits, two for merge commits)
//! - Traversal is iterative BFS over the index, never via embedded
//!   object pointers
//!
//! # Invariants
//!
//! - Commits are immutable once inserted
//! - Every parent hash of an inserted commit must already be present
//! - The graph is acyclic by construction (a commit's hash covers its
//!   parent hashes)

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::types::{ContentHash, UtcTimestamp};

/// Errors from commit graph operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown commit: {0}")]
    UnknownCommit(ContentHash),

    #[error("commit already exists: {0}")]
    DuplicateCommit(ContentHash),
}

/// An immutable commit: a snapshot root plus parent edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    hash: ContentHash,
    root: ContentHash,
    parents: Vec<ContentHash>,
    message: String,
    timestamp: UtcTimestamp,
}

impl Commit {
    /// Create a commit; the hash is computed over root, parents,
    /// message, and timestamp.
    pub fn new(root: ContentHash, parents: Vec<ContentHash>, message: impl Into<String>) -> Self {
        let message = message.into();
        let timestamp = UtcTimestamp::now();
        let hash = Self::compute_hash(&root, &parents, &message, &timestamp);
        Self {
            hash,
            root,
            parents,
            message,
            timestamp,
        }
    }

    fn compute_hash(
        root: &ContentHash,
        parents: &[ContentHash],
        message: &str,
        timestamp: &UtcTimestamp,
    ) -> ContentHash {
        let mut hasher = Sha256::new();
        hasher.update(b"commit\0");
        hasher.update(root.as_str().as_bytes());
        for parent in parents {
            hasher.update(b"\0");
            hasher.update(parent.as_str().as_bytes());
        }
        hasher.update(b"\0");
        hasher.update(message.as_bytes());
        hasher.update(b"\0");
        hasher.update(timestamp.to_string().as_bytes());
        ContentHash::from_hasher(hasher)
    }

    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// The snapshot this commit points at.
    pub fn root(&self) -> &ContentHash {
        &self.root
    }

    pub fn parents(&self) -> &[ContentHash] {
        &self.parents
    }

    /// Whether this commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> &UtcTimestamp {
        &self.timestamp
    }
}

/// Arena of commits indexed by hash.
#[derive(Debug, Default, Clone)]
pub struct CommitGraph {
    commits: HashMap<ContentHash, Commit>,
}

impl CommitGraph {
    /// Create an empty commit graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a commit.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCommit` if the hash is already present, or
    /// `UnknownCommit` if a parent is missing from the arena.
    pub fn insert(&mut self, commit: Commit) -> Result<(), GraphError> {
        if self.commits.contains_key(commit.hash()) {
            return Err(GraphError::DuplicateCommit(commit.hash().clone()));
        }
        for parent in commit.parents() {
            if !self.commits.contains_key(parent) {
                return Err(GraphError::UnknownCommit(parent.clone()));
            }
        }
        self.commits.insert(commit.hash().clone(), commit);
        Ok(())
    }

    /// Look up a commit by hash.
    pub fn get(&self, hash: &ContentHash) -> Result<&Commit, GraphError> {
        self.commits
            .get(hash)
            .ok_or_else(|| GraphError::UnknownCommit(hash.clone()))
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.commits.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// All hashes reachable from `start`, including `start` itself.
    fn reachable(&self, start: &ContentHash) -> Result<HashSet<ContentHash>, GraphError> {
        self.get(start)?;
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start.clone());
        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash.clone()) {
                continue;
            }
            let commit = self.get(&hash)?;
            for parent in commit.parents() {
                queue.push_back(parent.clone());
            }
        }
        Ok(seen)
    }

    /// Whether `ancestor` is reachable from `descendant` (inclusive:
    /// a commit is its own ancestor).
    pub fn is_ancestor(
        &self,
        ancestor: &ContentHash,
        descendant: &ContentHash,
    ) -> Result<bool, GraphError> {
        self.get(ancestor)?;
        Ok(self.reachable(descendant)?.contains(ancestor))
    }

    /// The merge base of two commits: the first common ancestor found
    /// by BFS from `a`, with ties broken deterministically by hash.
    ///
    /// Returns `None` if the commits share no history.
    pub fn merge_base(
        &self,
        a: &ContentHash,
        b: &ContentHash,
    ) -> Result<Option<ContentHash>, GraphError> {
        let b_ancestors = self.reachable(b)?;
        self.get(a)?;

        let mut seen = HashSet::new();
        let mut frontier = vec![a.clone()];
        while !frontier.is_empty() {
            // Scan the whole BFS layer before descending, so the
            // nearest common ancestor wins; sort for determinism.
            frontier.sort();
            let mut hits: Vec<&ContentHash> =
                frontier.iter().filter(|h| b_ancestors.contains(*h)).collect();
            if let Some(hit) = hits.pop() {
                return Ok(Some(hit.clone()));
            }
            let mut next = Vec::new();
            for hash in &frontier {
                if !seen.insert(hash.clone()) {
                    continue;
                }
                let commit = self.get(hash)?;
                next.extend(commit.parents().iter().cloned());
            }
            frontier = next;
        }
        Ok(None)
    }
}
