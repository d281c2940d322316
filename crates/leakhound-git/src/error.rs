//! Error types for history-source operations.
//!
//! [`RepoError`] is the single error type returned by all
//! [`HistorySource`](crate::HistorySource) trait methods. Variants are rich
//! enough that callers can distinguish "this repository cannot be reached"
//! (skip it, mark the scan unsuccessful) from "a single commit is broken"
//! (log and keep walking) without parsing error messages.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`HistorySource`](crate::HistorySource) operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The repository could not be opened, cloned, or fetched.
    ///
    /// Covers network, authentication, and filesystem failures. The scan of
    /// this repository is aborted; the scanner proceeds to the next one.
    #[error("repository `{url}` unavailable: {message}")]
    Unavailable {
        /// The repository URL as configured.
        url: String,
        /// Details from the backend or the OS.
        message: String,
    },

    /// A single commit could not be parsed or diffed.
    ///
    /// Recoverable: the walk logs the commit and continues.
    #[error("malformed commit `{id}`: {message}")]
    MalformedCommit {
        /// Hex id of the offending commit.
        id: String,
        /// What failed (missing tree, bad object, ...).
        message: String,
    },

    /// The local checkout directory could not be created or inspected.
    #[error("cannot prepare `{}`: {source}", path.display())]
    Workdir {
        /// The directory that could not be prepared.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An operation was attempted before `open()` or after `close()`.
    #[error("repository `{url}` is not open")]
    NotOpen {
        /// The repository URL as configured.
        url: String,
    },

    /// The git backend returned an unclassified error.
    #[error("git backend error: {message}")]
    Backend {
        /// Freeform error description from libgit2.
        message: String,
    },
}

impl RepoError {
    pub(crate) fn backend(err: &git2::Error) -> Self {
        Self::Backend {
            message: err.message().to_owned(),
        }
    }

    pub(crate) fn unavailable(url: &str, err: &git2::Error) -> Self {
        Self::Unavailable {
            url: url.to_owned(),
            message: err.message().to_owned(),
        }
    }
}
