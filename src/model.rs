//! Pipeline vocabulary — the records that flow between scanner components.
//!
//! `Diff`s are produced by the scan manager, fanned out to the analyzers,
//! and discarded; findings (`Leak`, `VulnerableDependency`) flow to the
//! notification router; `Repo` and its sub-records are the scheduling and
//! persistence unit.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use leakhound_git::DiffChunk;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// One contiguous added-text region within one file of one commit, wrapped
/// with repository identity. Created by the scan manager, treated as
/// read-only by every analyzer (workers share one `Arc<Diff>`).
#[derive(Clone, Debug)]
pub struct Diff {
    /// Hex id of the commit that introduced the text.
    pub commit_hash: String,
    /// Canonical repository URL.
    pub repo_url: String,
    /// On-disk directory of the checkout, relative to its data path.
    pub repo_path: String,
    /// Path of the file within the repository.
    pub file_path: String,
    /// 1-based first added line; `0` when unattributable.
    pub line_begin: u32,
    /// The added text, newline-separated.
    pub content: String,
    /// Commit author name.
    pub author: String,
    /// Commit author email.
    pub author_email: String,
    /// Author timestamp of the commit.
    pub timestamp: DateTime<Utc>,
}

impl Diff {
    /// Attach repository identity to a chunk coming out of the adapter.
    #[must_use]
    pub fn from_chunk(chunk: DiffChunk, repo_url: &str, repo_path: &str) -> Self {
        Self {
            commit_hash: chunk.commit_id,
            repo_url: repo_url.to_owned(),
            repo_path: repo_path.to_owned(),
            file_path: chunk.file_path,
            line_begin: chunk.begin_line,
            content: chunk.content,
            author: chunk.author,
            author_email: chunk.author_email,
            timestamp: chunk.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Leak
// ---------------------------------------------------------------------------

/// A confirmed pattern match on one line of a [`Diff`]. Never mutated after
/// creation; emitted exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leak {
    #[serde(rename = "pattern_name")]
    pub pattern_name: String,
    /// Source text of the content regex that matched.
    #[serde(rename = "pattern")]
    pub pattern_regex: String,
    #[serde(rename = "filepath")]
    pub file_path: String,
    #[serde(rename = "repo_path")]
    pub repo_path: String,
    /// The matching line, at most 1024 characters, whitespace preserved.
    #[serde(rename = "leak")]
    pub leak_string: String,
    #[serde(rename = "repo_url")]
    pub repo_url: String,
    #[serde(rename = "commit")]
    pub commit_hash: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// 1-based line number in the file; `0` when unattributable.
    #[serde(rename = "line")]
    pub line: u32,
    #[serde(rename = "author")]
    pub commit_author: String,
    #[serde(rename = "email")]
    pub commit_email: String,
}

// ---------------------------------------------------------------------------
// Dependencies and vulnerabilities
// ---------------------------------------------------------------------------

/// Package URL — the canonical identity of a declared dependency.
///
/// Renders as `pkg:ecosystem/name@version`, the coordinate format used by
/// vulnerability catalogs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Purl {
    /// Ecosystem type (`npm`, `pypi`, `cargo`, ...).
    pub ecosystem: String,
    pub name: String,
    pub version: String,
}

impl fmt::Display for Purl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/{}@{}", self.ecosystem, self.name, self.version)
    }
}

/// One declared package reference, tied to the diff it was parsed from.
#[derive(Clone, Debug)]
pub struct Dependency {
    pub purl: Purl,
    pub diff: Arc<Diff>,
}

/// A catalog entry describing one known vulnerability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Catalog label (e.g. `"Sonatype OSS Index"`). Display only.
    pub source: String,
    pub id: String,
    pub title: String,
    pub description: String,
    pub cvss_score: f32,
    pub cvss_vector: String,
    pub cwe: String,
    pub cve: String,
    pub reference: String,
    #[serde(default)]
    pub version_ranges: Vec<String>,
}

/// All surviving vulnerabilities of one dependency, aggregated by PURL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VulnerableDependency {
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(rename = "dependency")]
    pub dependency_name: String,
    pub version: String,
    #[serde(rename = "filepath")]
    pub file_path: String,
    #[serde(rename = "repo_path")]
    pub repo_path: String,
    #[serde(rename = "repo_url")]
    pub repo_url: String,
    #[serde(rename = "commit")]
    pub commit_hash: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "author")]
    pub commit_author: String,
    #[serde(rename = "email")]
    pub commit_email: String,
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// A routed finding: either a leak or a vulnerable dependency. Sinks declare
/// which variants they handle via `accepts`.
#[derive(Clone, Debug)]
pub enum Finding {
    Leak(Leak),
    Exposure(VulnerableDependency),
}

impl Finding {
    /// The repository this finding belongs to.
    #[must_use]
    pub fn repo_url(&self) -> &str {
        match self {
            Self::Leak(leak) => &leak.repo_url,
            Self::Exposure(dep) => &dep.repo_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Repo — the scheduling unit
// ---------------------------------------------------------------------------

/// Where a repository lives. `url` is the identity key across the repo list
/// and the state store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RepoLocation {
    pub url: String,
    pub clone_url: String,
    /// Parent directory on local disk holding all checkouts.
    pub data_path: String,
    /// Checkout directory relative to `data_path`.
    pub repo_path: String,
}

/// Per-repository adapter permissions.
#[derive(Clone, Copy, Debug, Default)]
pub struct RepoOptions {
    /// Whether the adapter may clone or fetch. `false` for on-disk sources.
    pub allow_update: bool,
}

/// Commits whose ancestry has already been scanned. Grows monotonically
/// between successful scans.
#[derive(Clone, Debug, Default)]
pub struct RepoState {
    pub refs: Vec<String>,
}

/// Timing and outcome of the most recent scan. `start_time == None` means
/// the repository has never been scanned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStatus {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub success: bool,
}

/// The scheduling unit: location, permissions, persistent state, and the
/// latest scan status.
#[derive(Clone, Debug, Default)]
pub struct Repo {
    pub options: RepoOptions,
    pub location: RepoLocation,
    pub state: RepoState,
    pub scan: ScanStatus,
}

// ---------------------------------------------------------------------------
// RepoStats
// ---------------------------------------------------------------------------

/// Running per-repository counters, mutated only by the stats coalescer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepoStats {
    pub leaks_found: u64,
    pub leaks_filtered: u64,
    pub vulnerabilities_found: u64,
    pub vulnerabilities_suppressed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purl_coordinate_format() {
        let purl = Purl {
            ecosystem: "npm".to_owned(),
            name: "left-pad".to_owned(),
            version: "1.3.0".to_owned(),
        };
        assert_eq!(purl.to_string(), "pkg:npm/left-pad@1.3.0");
    }

    #[test]
    fn leak_serializes_with_wire_names() {
        let leak = Leak {
            pattern_name: "pw".to_owned(),
            pattern_regex: "password=".to_owned(),
            file_path: "x.conf".to_owned(),
            repo_path: "org/repo".to_owned(),
            leak_string: "password=abc".to_owned(),
            repo_url: "https://example.com/org/repo".to_owned(),
            commit_hash: "deadbeef".to_owned(),
            timestamp: Utc::now(),
            line: 3,
            commit_author: "Alice".to_owned(),
            commit_email: "alice@example.com".to_owned(),
        };
        let json = serde_json::to_value(&leak).expect("serialize");
        assert_eq!(json["pattern_name"], "pw");
        assert_eq!(json["leak"], "password=abc");
        assert_eq!(json["filepath"], "x.conf");
        assert_eq!(json["commit"], "deadbeef");
        assert_eq!(json["line"], 3);
        assert_eq!(json["email"], "alice@example.com");
    }
}
