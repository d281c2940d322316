//! Git history adapter for leakhound.
//!
//! The scanning pipeline interacts with version control exclusively through
//! the [`HistorySource`] trait. The trait is object-safe so callers can hold
//! a `Box<dyn HistorySource>`; the shipped backend is [`Git2Source`], built
//! on libgit2 via the `git2` crate.
//!
//! The adapter's job is deliberately narrow: open (or clone/fetch) an
//! on-disk repository, report the commits reachable today, and stream the
//! added-text chunks of every commit that has not been scanned before. It
//! knows nothing about patterns, findings, or scheduling.

pub mod error;
mod git2_source;
pub mod source;
pub mod types;

pub use error::RepoError;
pub use git2_source::Git2Source;
pub use source::{DiffSink, HistorySource};
pub use types::{DiffChunk, RepoSpec};
