//! The set of known repositories and the scan scheduling rule.
//!
//! Keyed by `location.url`. Adding a repository re-hydrates its state and
//! scan status from the state store; updating persists. The scheduler
//! prefers never-scanned repositories, then the one whose last scan ended
//! longest ago.

use std::sync::Arc;

use chrono::DateTime;

use crate::model::Repo;
use crate::state::StateManager;

/// URL-keyed repository collection. Owned exclusively by the scan manager.
pub struct RepoList {
    list: Vec<Repo>,
    state: Arc<dyn StateManager>,
}

impl RepoList {
    #[must_use]
    pub fn new(state: Arc<dyn StateManager>) -> Self {
        Self {
            list: Vec::new(),
            state,
        }
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Add (or replace, by URL) a repository, attaching its persisted state
    /// and scan status.
    pub fn add_repo(&mut self, mut repo: Repo) {
        let (state, scan) = self.state.load(&repo.location.url);
        repo.state = state;
        repo.scan = scan;
        self.upsert(repo);
    }

    /// Replace a repository by URL and persist it.
    pub fn update_repo(&mut self, repo: Repo) {
        self.state.save(&repo);
        self.upsert(repo);
    }

    fn upsert(&mut self, repo: Repo) {
        if let Some(existing) = self
            .list
            .iter_mut()
            .find(|r| r.location.url == repo.location.url)
        {
            *existing = repo;
        } else {
            self.list.push(repo);
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Repo> {
        self.list.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Index of the repository to scan next, or `None` when the list is
    /// empty. A never-scanned repository wins; otherwise the smallest scan
    /// end time does, ties broken by insertion order.
    #[must_use]
    pub fn next_for_scan(&self) -> Option<usize> {
        if let Some(index) = self.list.iter().position(|r| r.scan.start_time.is_none()) {
            return Some(index);
        }
        let mut best: Option<(usize, DateTime<chrono::Utc>)> = None;
        for (index, repo) in self.list.iter().enumerate() {
            let end = repo.scan.end_time.unwrap_or(DateTime::UNIX_EPOCH);
            match best {
                Some((_, best_end)) if end >= best_end => {}
                _ => best = Some((index, end)),
            }
        }
        best.map(|(index, _)| index)
    }
}
