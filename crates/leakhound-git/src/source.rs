//! The [`HistorySource`] trait — the abstraction boundary between the
//! scanning pipeline and version control.

use std::collections::HashSet;

use crate::error::RepoError;
use crate::types::DiffChunk;

/// Receives added-text chunks during a history walk.
///
/// Implemented for any `FnMut(DiffChunk) -> bool`. Returning `false` asks
/// the walker to stop; the walker honors the request at the next commit
/// boundary, never mid-commit.
pub trait DiffSink {
    /// Accept one chunk. Return `false` to request cancellation.
    fn accept(&mut self, chunk: DiffChunk) -> bool;
}

impl<F: FnMut(DiffChunk) -> bool> DiffSink for F {
    fn accept(&mut self, chunk: DiffChunk) -> bool {
        self(chunk)
    }
}

/// A scannable repository history.
///
/// Lifecycle per scan: `open` → (`refs` | `scan`) → `close`. Implementations
/// may be backed by libgit2 (the shipped [`Git2Source`](crate::Git2Source))
/// or a test double.
pub trait HistorySource {
    /// Open the repository.
    ///
    /// When the local checkout is absent and updates are allowed, clones it
    /// (no working tree is materialized). When present, opens it and — if
    /// updates are allowed — fetches with force.
    ///
    /// # Errors
    /// [`RepoError::Unavailable`] on network, auth, or filesystem failure.
    fn open(&mut self) -> Result<(), RepoError>;

    /// Release handles and drop the in-memory object graph.
    fn close(&mut self);

    /// The set of commit ids reachable today: every non-zero reference
    /// except `refs/keep-around/*`, plus the tip of a date-ordered full
    /// rev-list. Idempotent.
    ///
    /// # Errors
    /// [`RepoError::NotOpen`] before `open()`; backend errors otherwise.
    fn refs(&self) -> Result<HashSet<String>, RepoError>;

    /// Inform the source which commits were already scanned. The walk stops
    /// descending at the first commit found in this set.
    fn set_seen_refs(&mut self, refs: HashSet<String>);

    /// Walk unseen commits date-descending across all branches and remotes,
    /// skipping merge commits, and feed every added-text chunk to `sink`.
    ///
    /// Commits older than the history past limit are diffed against the
    /// empty tree with author `"unknown"`, after which the walk ends.
    /// Individual malformed commits are logged and skipped.
    ///
    /// # Errors
    /// [`RepoError::NotOpen`] before `open()`; backend errors that prevent
    /// starting the walk.
    fn scan(&mut self, sink: &mut dyn DiffSink) -> Result<(), RepoError>;
}
