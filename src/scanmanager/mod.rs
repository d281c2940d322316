//! The scan manager: discovery, scheduling, and scan execution.
//!
//! One driver thread alternates between a 30-minute rediscovery ticker and
//! a scan timer: pick the next due repository, scan it through the git
//! adapter, stream diffs into the bounded pipeline channel, and persist the
//! refreshed state. Scans of a single repository are serialized by
//! construction — the driver is the only thread that scans.

mod discover;
mod path;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{after, select, tick, Receiver, Sender};
use leakhound_git::{DiffChunk, Git2Source, HistorySource, RepoError, RepoSpec};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::duration::pretty_duration;
use crate::model::{Diff, Repo, ScanStatus};
use crate::repolist::RepoList;
use crate::shutdown::{Shutdown, ShutdownSignal};
use crate::state::StateManager;

const REDISCOVER_INTERVAL: Duration = Duration::from_secs(30 * 60);
const NO_REPO_WAIT: Duration = Duration::from_secs(60);
const POISONED: &str = "scan manager state poisoned";

struct Inner {
    config: Config,
    repos: RepoList,
    current: Option<Repo>,
}

/// Drives the whole scanning pipeline. Owns the repo list exclusively.
pub struct ScanManager {
    inner: Arc<Mutex<Inner>>,
    diff_tx: Sender<Arc<Diff>>,
    shutdown: Shutdown,
    driver: Option<JoinHandle<()>>,
}

impl ScanManager {
    /// Build the manager and run initial discovery. No scanning happens
    /// until [`spawn_driver`](Self::spawn_driver).
    ///
    /// # Panics
    ///
    /// Panics if the scan-manager mutex is poisoned.
    #[must_use]
    pub fn new(config: Config, diff_tx: Sender<Arc<Diff>>, state: Arc<dyn StateManager>) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            config,
            repos: RepoList::new(state),
            current: None,
        }));
        update_scan_list(&inner);
        Self {
            inner,
            diff_tx,
            shutdown: Shutdown::new(),
            driver: None,
        }
    }

    /// Launch the background driver thread.
    pub fn spawn_driver(&mut self) {
        let driver = Driver {
            inner: Arc::clone(&self.inner),
            diff_tx: self.diff_tx.clone(),
            dying: self.shutdown.subscribe(),
        };
        self.driver = Some(std::thread::spawn(move || driver.run()));
    }

    /// Swap the configuration and recompute the scan list.
    ///
    /// # Panics
    ///
    /// Panics if the scan-manager mutex is poisoned.
    pub fn set_config(&self, config: Config) {
        self.inner.lock().expect(POISONED).config = config;
        update_scan_list(&self.inner);
        debug!("scan manager config reloaded");
    }

    /// Snapshot of the repository currently being scanned, if any.
    ///
    /// # Panics
    ///
    /// Panics if the scan-manager mutex is poisoned.
    #[must_use]
    pub fn status(&self) -> Option<Repo> {
        self.inner.lock().expect(POISONED).current.clone()
    }

    /// A cheap handle for status readers on other threads.
    #[must_use]
    pub fn probe(&self) -> ScanProbe {
        ScanProbe {
            inner: Arc::clone(&self.inner),
        }
    }

    /// # Panics
    ///
    /// Panics if the scan-manager mutex is poisoned.
    #[must_use]
    pub fn total_repos(&self) -> usize {
        self.inner.lock().expect(POISONED).repos.len()
    }

    /// Scan one repository by index, synchronously. The driver uses the
    /// same path; exposed for dry runs and tests.
    ///
    /// # Panics
    ///
    /// Panics if the scan-manager mutex is poisoned.
    pub fn scan_repo(&self, index: usize) {
        scan_repo_at(&self.inner, &self.diff_tx, &self.shutdown.subscribe(), index);
    }

    /// Refresh state for every repository without walking commits or
    /// emitting findings. Used to seed state for an existing fleet.
    ///
    /// # Panics
    ///
    /// Panics if the scan-manager mutex is poisoned.
    pub fn dry_run(&self) {
        let repos: Vec<Repo> = {
            let guard = self.inner.lock().expect(POISONED);
            (0..guard.repos.len())
                .filter_map(|i| guard.repos.get(i).cloned())
                .collect()
        };
        let total = repos.len();
        for (i, repo) in repos.into_iter().enumerate() {
            let spec = RepoSpec {
                url: repo.location.url.clone(),
                clone_url: repo.location.clone_url.clone(),
                data_path: PathBuf::from(&repo.location.data_path),
                repo_path: repo.location.repo_path.clone(),
                allow_update: false,
                history_past_limit: chrono::DateTime::UNIX_EPOCH,
            };
            let mut source = Git2Source::new(spec);
            if let Err(err) = source.open() {
                warn!(repo = %repo.location.url, error = %err, "cannot open repo");
                continue;
            }
            match source.refs() {
                Ok(refs) => {
                    let mut updated = repo.clone();
                    let mut sorted: Vec<String> = refs.into_iter().collect();
                    sorted.sort();
                    updated.state.refs = sorted;
                    self.inner
                        .lock()
                        .expect(POISONED)
                        .repos
                        .update_repo(updated);
                    debug!(i = i + 1, total, repo = %repo.location.url, "state refreshed");
                }
                Err(err) => warn!(repo = %repo.location.url, error = %err, "cannot read refs"),
            }
            source.close();
        }
    }

    /// Stop the driver. Dropping the manager afterwards closes the diff
    /// channel and lets the analyzers drain.
    pub fn stop(mut self) {
        self.shutdown.signal();
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
        debug!("scan manager stopped");
    }
}

/// Read-only view of the in-flight scan for the status ticker.
#[derive(Clone)]
pub struct ScanProbe {
    inner: Arc<Mutex<Inner>>,
}

impl ScanProbe {
    /// # Panics
    ///
    /// Panics if the scan-manager mutex is poisoned.
    #[must_use]
    pub fn current(&self) -> Option<Repo> {
        self.inner.lock().expect(POISONED).current.clone()
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct Driver {
    inner: Arc<Mutex<Inner>>,
    diff_tx: Sender<Arc<Diff>>,
    dying: ShutdownSignal,
}

impl Driver {
    fn run(&self) {
        let rediscover = tick(REDISCOVER_INTERVAL);
        let mut next_scan = after(Duration::from_secs(1));
        loop {
            select! {
                recv(self.dying.receiver()) -> _ => return,
                recv(rediscover) -> _ => update_scan_list(&self.inner),
                recv(next_scan) -> _ => next_scan = self.scan_next(),
            }
        }
    }

    /// Scan the next due repository, or compute how long to sleep.
    fn scan_next(&self) -> Receiver<Instant> {
        let picked = {
            let guard = self.inner.lock().expect(POISONED);
            guard.repos.next_for_scan().and_then(|index| {
                guard
                    .repos
                    .get(index)
                    .cloned()
                    .map(|repo| (index, repo, guard.config.common.scan_interval_value))
            })
        };
        let Some((index, repo, interval)) = picked else {
            debug!(wait = %pretty_duration(NO_REPO_WAIT), "no repository due for scan");
            return after(NO_REPO_WAIT);
        };

        let elapsed = repo
            .scan
            .end_time
            .and_then(|end| (Utc::now() - end).to_std().ok())
            .unwrap_or(interval);
        if elapsed >= interval {
            scan_repo_at(&self.inner, &self.diff_tx, &self.dying, index);
            return after(Duration::ZERO);
        }
        let wait = interval - elapsed;
        info!(wait = %pretty_duration(wait), repo = %repo.location.url, "waiting for next scan");
        after(wait)
    }
}

// ---------------------------------------------------------------------------
// Scan execution
// ---------------------------------------------------------------------------

fn scan_repo_at(
    inner: &Arc<Mutex<Inner>>,
    diff_tx: &Sender<Arc<Diff>>,
    dying: &ShutdownSignal,
    index: usize,
) {
    let (mut repo, history_past_limit) = {
        let guard = inner.lock().expect(POISONED);
        let Some(repo) = guard.repos.get(index).cloned() else {
            return;
        };
        (repo, guard.config.common.history_past_limit)
    };

    let started = Utc::now();
    repo.scan.start_time = Some(started);
    {
        let mut guard = inner.lock().expect(POISONED);
        guard.repos.update_repo(repo.clone());
        guard.current = Some(repo.clone());
    }
    info!(repo = %repo.location.url, refs = repo.state.refs.len(), "scan started");

    let spec = RepoSpec {
        url: repo.location.url.clone(),
        clone_url: repo.location.clone_url.clone(),
        data_path: PathBuf::from(&repo.location.data_path),
        repo_path: repo.location.repo_path.clone(),
        allow_update: repo.options.allow_update,
        history_past_limit,
    };
    let mut source = Git2Source::new(spec);
    source.set_seen_refs(repo.state.refs.iter().cloned().collect());

    let result = run_scan(
        &mut source,
        diff_tx,
        dying,
        &repo.location.url,
        &repo.location.repo_path,
    );
    let refs = source.refs().ok();
    source.close();

    let mut updated = repo.clone();
    if let Some(new_refs) = refs {
        // Refs grow monotonically between scans: union, never replace.
        let mut merged: BTreeSet<String> = repo.state.refs.iter().cloned().collect();
        merged.extend(new_refs);
        updated.state.refs = merged.into_iter().collect();
    }
    let finished = Utc::now();
    updated.scan = ScanStatus {
        start_time: Some(started),
        end_time: Some(finished),
        success: result.is_ok(),
    };
    {
        let mut guard = inner.lock().expect(POISONED);
        guard.repos.update_repo(updated);
        guard.current = None;
    }

    match result {
        Ok(()) => {
            let duration = (finished - started).to_std().unwrap_or_default();
            info!(repo = %repo.location.url, duration = %pretty_duration(duration), "scan completed");
        }
        Err(err) => warn!(repo = %repo.location.url, error = %err, "scan failed"),
    }
}

fn run_scan(
    source: &mut Git2Source,
    diff_tx: &Sender<Arc<Diff>>,
    dying: &ShutdownSignal,
    repo_url: &str,
    repo_path: &str,
) -> Result<(), RepoError> {
    source.open()?;
    let mut current_commit: Option<String> = None;
    let mut sink = |chunk: DiffChunk| -> bool {
        // Shutdown is honored at commit boundaries, never mid-commit.
        if current_commit.as_deref() != Some(chunk.commit_id.as_str()) {
            if dying.is_signalled() {
                return false;
            }
            current_commit = Some(chunk.commit_id.clone());
        }
        let diff = Arc::new(Diff::from_chunk(chunk, repo_url, repo_path));
        diff_tx.send(diff).is_ok()
    };
    source.scan(&mut sink)
}

fn update_scan_list(inner: &Arc<Mutex<Inner>>) {
    debug!("updating scan list");
    let config = inner.lock().expect(POISONED).config.clone();
    let discovered = discover::discover(&config);
    let mut guard = inner.lock().expect(POISONED);
    guard.repos.clear();
    for (location, options) in discovered {
        guard.repos.add_repo(Repo {
            options,
            location,
            ..Repo::default()
        });
    }
    debug!(total = guard.repos.len(), "scan list updated");
}
