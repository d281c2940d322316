//! The libgit2-backed implementation of [`HistorySource`].

use std::collections::HashSet;
use std::fs;

use chrono::{DateTime, Utc};
use git2::build::RepoBuilder;
use git2::{AutotagOption, Commit, DiffFormat, DiffOptions, FetchOptions, Repository, Sort};
use tracing::debug;

use crate::error::RepoError;
use crate::source::{DiffSink, HistorySource};
use crate::types::{DiffChunk, RepoSpec};

/// Prefix of refs that never count as scan anchors (GitLab keep-around).
const IGNORED_REF_PREFIX: &str = "refs/keep-around/";

/// Author placeholder for chunks past the history limit, where the whole
/// remaining tree is attributed to no one.
const UNKNOWN_AUTHOR: &str = "unknown";

/// A [`HistorySource`] backed by libgit2.
///
/// Construct with [`Git2Source::new`], then drive through the trait:
/// `open` → `refs`/`scan` → `close`.
pub struct Git2Source {
    spec: RepoSpec,
    seen_refs: HashSet<String>,
    repo: Option<Repository>,
}

impl Git2Source {
    /// Create a source for the given repository location. No I/O happens
    /// until [`open`](HistorySource::open).
    #[must_use]
    pub fn new(spec: RepoSpec) -> Self {
        Self {
            spec,
            seen_refs: HashSet::new(),
            repo: None,
        }
    }

    fn repo(&self) -> Result<&Repository, RepoError> {
        self.repo.as_ref().ok_or_else(|| RepoError::NotOpen {
            url: self.spec.url.clone(),
        })
    }

    fn clone_repo(&mut self) -> Result<(), RepoError> {
        let full = self.spec.full_path();
        fs::create_dir_all(&full).map_err(|source| RepoError::Workdir {
            path: full.clone(),
            source,
        })?;
        // No working tree is needed to read history.
        let repo = RepoBuilder::new()
            .bare(true)
            .clone(self.spec.effective_clone_url(), &full)
            .map_err(|e| RepoError::unavailable(&self.spec.url, &e))?;
        self.repo = Some(repo);
        Ok(())
    }

    fn fetch(&self) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let mut remote = repo
            .find_remote("origin")
            .map_err(|e| RepoError::unavailable(&self.spec.url, &e))?;
        let mut opts = FetchOptions::new();
        opts.download_tags(AutotagOption::All);
        remote
            .fetch(
                &["+refs/heads/*:refs/remotes/origin/*"],
                Some(&mut opts),
                None,
            )
            .map_err(|e| RepoError::unavailable(&self.spec.url, &e))?;
        Ok(())
    }

    /// Tip of a date-ordered rev-list over every ref, if any commit exists.
    fn latest_commit(repo: &Repository) -> Option<String> {
        let mut walk = repo.revwalk().ok()?;
        walk.push_glob("*").ok()?;
        walk.set_sorting(Sort::TIME).ok()?;
        walk.next().and_then(Result::ok).map(|oid| oid.to_string())
    }

    /// Stream the added chunks of one commit into `sink`.
    ///
    /// `initial` diffs against the empty tree and attributes the chunks to
    /// [`UNKNOWN_AUTHOR`]; otherwise the diff is against the first parent
    /// (or the empty tree for root commits, keeping real attribution).
    ///
    /// Returns `false` when the sink asked to stop.
    fn emit_commit(
        repo: &Repository,
        commit: &Commit<'_>,
        initial: bool,
        sink: &mut dyn DiffSink,
    ) -> Result<bool, git2::Error> {
        let tree = commit.tree()?;
        let parent_tree = if initial || commit.parent_count() == 0 {
            None
        } else {
            Some(commit.parent(0)?.tree()?)
        };

        let mut opts = DiffOptions::new();
        opts.context_lines(0);
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

        let (author, author_email) = if initial {
            (UNKNOWN_AUTHOR.to_owned(), UNKNOWN_AUTHOR.to_owned())
        } else {
            let sig = commit.author();
            (
                sig.name().unwrap_or(UNKNOWN_AUTHOR).to_owned(),
                sig.email().unwrap_or(UNKNOWN_AUTHOR).to_owned(),
            )
        };
        let timestamp = DateTime::<Utc>::from_timestamp(commit.author().when().seconds(), 0)
            .unwrap_or_else(Utc::now);

        let mut collector = ChunkCollector {
            commit_id: commit.id().to_string(),
            author,
            author_email,
            timestamp,
            current: None,
            cancelled: false,
            sink,
        };

        let printed = diff.print(DiffFormat::Patch, |delta, _hunk, line| {
            collector.on_line(&delta, &line)
        });
        collector.flush();
        if collector.cancelled {
            return Ok(false);
        }
        printed?;
        Ok(true)
    }
}

impl HistorySource for Git2Source {
    fn open(&mut self) -> Result<(), RepoError> {
        let full = self.spec.full_path();
        if !full.exists() {
            if !self.spec.allow_update {
                return Err(RepoError::Unavailable {
                    url: self.spec.url.clone(),
                    message: format!("checkout `{}` is missing and updates are disabled", full.display()),
                });
            }
            return self.clone_repo();
        }
        let repo =
            Repository::open(&full).map_err(|e| RepoError::unavailable(&self.spec.url, &e))?;
        self.repo = Some(repo);
        if self.spec.allow_update {
            self.fetch()?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.repo = None;
    }

    fn refs(&self) -> Result<HashSet<String>, RepoError> {
        let repo = self.repo()?;
        let mut out = HashSet::new();
        let references = repo.references().map_err(|e| RepoError::backend(&e))?;
        for reference in references {
            let Ok(reference) = reference else { continue };
            let Some(name) = reference.name() else {
                continue;
            };
            if name.starts_with(IGNORED_REF_PREFIX) {
                continue;
            }
            // Symbolic refs (detached HEAD indirection) carry no target.
            if let Some(oid) = reference.target() {
                if !oid.is_zero() {
                    out.insert(oid.to_string());
                }
            }
        }
        if let Some(tip) = Self::latest_commit(repo) {
            out.insert(tip);
        }
        Ok(out)
    }

    fn set_seen_refs(&mut self, refs: HashSet<String>) {
        self.seen_refs = refs;
    }

    fn scan(&mut self, sink: &mut dyn DiffSink) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let mut walk = repo.revwalk().map_err(|e| RepoError::backend(&e))?;
        walk.push_glob("*").map_err(|e| RepoError::backend(&e))?;
        walk.set_sorting(Sort::TIME)
            .map_err(|e| RepoError::backend(&e))?;

        for oid in walk {
            let oid = match oid {
                Ok(oid) => oid,
                Err(err) => {
                    debug!(repo = %self.spec.url, error = %err, "unreadable rev-list entry");
                    continue;
                }
            };
            if self.seen_refs.contains(&oid.to_string()) {
                break;
            }
            let commit = match repo.find_commit(oid) {
                Ok(commit) => commit,
                Err(err) => {
                    let err = RepoError::MalformedCommit {
                        id: oid.to_string(),
                        message: err.message().to_owned(),
                    };
                    debug!(repo = %self.spec.url, error = %err, "skipping commit");
                    continue;
                }
            };
            // Merge commits re-introduce text already attributed elsewhere.
            if commit.parent_count() > 1 {
                continue;
            }

            let committed_at = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
                .unwrap_or_else(Utc::now);
            if committed_at < self.spec.history_past_limit {
                // Everything past the limit collapses into one initial diff.
                if let Err(err) = Self::emit_commit(repo, &commit, true, sink) {
                    debug!(repo = %self.spec.url, commit = %oid, error = %err, "initial diff failed");
                }
                break;
            }

            match Self::emit_commit(repo, &commit, false, sink) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    let err = RepoError::MalformedCommit {
                        id: oid.to_string(),
                        message: err.message().to_owned(),
                    };
                    debug!(repo = %self.spec.url, error = %err, "skipping commit");
                }
            }
        }
        Ok(())
    }
}

/// Accumulates consecutive `+` lines of one file into a single chunk.
struct ChunkCollector<'a> {
    commit_id: String,
    author: String,
    author_email: String,
    timestamp: DateTime<Utc>,
    current: Option<PendingChunk>,
    cancelled: bool,
    sink: &'a mut dyn DiffSink,
}

struct PendingChunk {
    file_path: String,
    begin_line: u32,
    next_line: u32,
    content: String,
}

impl ChunkCollector<'_> {
    fn on_line(&mut self, delta: &git2::DiffDelta<'_>, line: &git2::DiffLine<'_>) -> bool {
        if self.cancelled {
            return false;
        }
        if line.origin() != '+' {
            // Context, deletions, and headers end the current added region.
            self.flush();
            return true;
        }
        let Some(path) = delta.new_file().path() else {
            return true;
        };
        let path = path.to_string_lossy().into_owned();
        let lineno = line.new_lineno().unwrap_or(0);
        let text = String::from_utf8_lossy(line.content()).into_owned();

        match &mut self.current {
            Some(pending)
                if pending.file_path == path
                    && (lineno == 0 || lineno == pending.next_line) =>
            {
                pending.content.push_str(&text);
                pending.next_line = lineno.saturating_add(1);
            }
            _ => {
                self.flush();
                self.current = Some(PendingChunk {
                    file_path: path,
                    begin_line: lineno,
                    next_line: lineno.saturating_add(1),
                    content: text,
                });
            }
        }
        true
    }

    fn flush(&mut self) {
        if let Some(pending) = self.current.take() {
            let keep_going = self.sink.accept(DiffChunk {
                commit_id: self.commit_id.clone(),
                file_path: pending.file_path,
                begin_line: pending.begin_line,
                content: pending.content,
                author: self.author.clone(),
                author_email: self.author_email.clone(),
                timestamp: self.timestamp,
            });
            if !keep_going {
                self.cancelled = true;
            }
        }
    }
}
