//! Vocabulary types shared between the [`HistorySource`](crate::HistorySource)
//! trait and the scanning pipeline.
//!
//! These types intentionally contain no `git2` types — the backend is an
//! implementation detail.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Where a repository lives and how the adapter may treat it.
#[derive(Clone, Debug)]
pub struct RepoSpec {
    /// Canonical repository URL (identity; used in findings).
    pub url: String,
    /// URL to clone from. Falls back to [`url`](Self::url) when empty.
    pub clone_url: String,
    /// Parent directory on local disk holding all checkouts.
    pub data_path: PathBuf,
    /// Directory of this checkout, relative to `data_path`.
    pub repo_path: String,
    /// Whether the adapter may clone or fetch. `false` for repositories
    /// discovered from on-disk paths.
    pub allow_update: bool,
    /// Commits with a committer time older than this are treated as the
    /// initial commit of the remaining history: their whole tree is emitted
    /// as additions and the walk ends.
    pub history_past_limit: DateTime<Utc>,
}

impl RepoSpec {
    /// Absolute path of the on-disk checkout.
    #[must_use]
    pub fn full_path(&self) -> PathBuf {
        self.data_path.join(&self.repo_path)
    }

    /// The URL to clone from: `clone_url` when set, else `url`.
    #[must_use]
    pub fn effective_clone_url(&self) -> &str {
        if self.clone_url.is_empty() {
            &self.url
        } else {
            &self.clone_url
        }
    }
}

/// One contiguous added-text region within one file of one commit.
///
/// Produced by [`HistorySource::scan`](crate::HistorySource::scan); the
/// pipeline wraps it with repository identity before analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffChunk {
    /// Hex id of the commit that introduced the text.
    pub commit_id: String,
    /// Path of the file within the repository.
    pub file_path: String,
    /// 1-based line number of the first added line. Best-effort; `0` when
    /// the backend could not attribute a position (empty-tree diffs).
    pub begin_line: u32,
    /// The added text, newline-separated.
    pub content: String,
    /// Commit author name, or `"unknown"` past the history limit.
    pub author: String,
    /// Commit author email, or `"unknown"` past the history limit.
    pub author_email: String,
    /// Author timestamp of the commit.
    pub timestamp: DateTime<Utc>,
}

impl DiffChunk {
    /// File path as a `Path` for extension/name inspection.
    #[must_use]
    pub fn path(&self) -> &Path {
        Path::new(&self.file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(clone_url: &str) -> RepoSpec {
        RepoSpec {
            url: "https://example.com/org/repo".to_owned(),
            clone_url: clone_url.to_owned(),
            data_path: PathBuf::from("/var/lib/leakhound"),
            repo_path: "org/repo".to_owned(),
            allow_update: true,
            history_past_limit: Utc::now(),
        }
    }

    #[test]
    fn full_path_joins_data_and_repo() {
        assert_eq!(
            spec("").full_path(),
            PathBuf::from("/var/lib/leakhound/org/repo")
        );
    }

    #[test]
    fn clone_url_falls_back_to_url() {
        assert_eq!(spec("").effective_clone_url(), "https://example.com/org/repo");
        assert_eq!(
            spec("git@example.com:org/repo.git").effective_clone_url(),
            "git@example.com:org/repo.git"
        );
    }
}
