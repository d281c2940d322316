//! Durable per-repository scan state.
//!
//! A single serializer thread owns the in-memory map; `load`/`save` are
//! request/response messages, so the store needs no locks and every reader
//! sees a consistent snapshot. The map is checkpointed to disk every 60
//! seconds and on shutdown, always by writing a sibling temp file and
//! renaming it over the target — a crash never leaves a partial state file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{Repo, RepoLocation, RepoState, ScanStatus};

const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// State that could not be loaded at startup. Fatal: starting with a
/// half-read state file would silently rescan (or skip) history.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot read state file `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse state file `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("cannot create state file `{}`: {source}", path.display())]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// StateManager trait
// ---------------------------------------------------------------------------

/// Read/write access to per-repository scan state. The repo list talks to
/// the store exclusively through this trait.
pub trait StateManager: Send + Sync {
    /// State and scan status for `url`; zero values when unknown.
    fn load(&self, url: &str) -> (RepoState, ScanStatus);

    /// Record the state of one repository.
    fn save(&self, repo: &Repo);
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepoRecord {
    url: String,
    #[serde(default)]
    clone_url: String,
    #[serde(default)]
    repo_path: String,
    #[serde(default)]
    data_path: String,
    #[serde(default)]
    refs: Vec<String>,
    #[serde(default)]
    scan_status: ScanRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScanRecord {
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    success: bool,
}

fn to_record(repo: &Repo) -> RepoRecord {
    RepoRecord {
        url: repo.location.url.clone(),
        clone_url: repo.location.clone_url.clone(),
        repo_path: repo.location.repo_path.clone(),
        data_path: repo.location.data_path.clone(),
        refs: repo.state.refs.clone(),
        scan_status: ScanRecord {
            start_time: repo.scan.start_time,
            end_time: repo.scan.end_time,
            success: repo.scan.success,
        },
    }
}

fn from_record(record: RepoRecord) -> Repo {
    Repo {
        options: crate::model::RepoOptions::default(),
        location: RepoLocation {
            url: record.url,
            clone_url: record.clone_url,
            data_path: record.data_path,
            repo_path: record.repo_path,
        },
        state: RepoState { refs: record.refs },
        scan: ScanStatus {
            start_time: record.scan_status.start_time,
            end_time: record.scan_status.end_time,
            success: record.scan_status.success,
        },
    }
}

// ---------------------------------------------------------------------------
// FileStateStore
// ---------------------------------------------------------------------------

enum Request {
    Save(Repo),
    Load {
        url: String,
        reply: Sender<(RepoState, ScanStatus)>,
    },
}

/// The file-backed state store. See the module docs for the persistence
/// discipline.
pub struct FileStateStore {
    tx: Sender<Request>,
    dying: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileStateStore {
    /// Load existing state (creating an empty file when missing) and start
    /// the serializer thread.
    ///
    /// # Errors
    /// [`StateError`] when the file exists but cannot be read or parsed.
    pub fn start(path: PathBuf) -> Result<Self, StateError> {
        let state = load_file(&path)?;
        let (tx, rx) = bounded::<Request>(64);
        let (dying_tx, dying_rx) = bounded::<()>(0);
        let worker = std::thread::spawn(move || serve(&path, state, &rx, &dying_rx));
        Ok(Self {
            tx,
            dying: Mutex::new(Some(dying_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Final checkpoint and thread shutdown. Idempotent.
    ///
    /// # Panics
    ///
    /// Panics if the serializer handle mutex is poisoned.
    pub fn stop(&self) {
        self.dying
            .lock()
            .expect("state store shutdown handle poisoned")
            .take();
        if let Some(worker) = self
            .worker
            .lock()
            .expect("state store worker handle poisoned")
            .take()
        {
            let _ = worker.join();
        }
    }
}

impl StateManager for FileStateStore {
    fn load(&self, url: &str) -> (RepoState, ScanStatus) {
        let (reply_tx, reply_rx) = bounded(1);
        if self
            .tx
            .send(Request::Load {
                url: url.to_owned(),
                reply: reply_tx,
            })
            .is_err()
        {
            return (RepoState::default(), ScanStatus::default());
        }
        reply_rx.recv().unwrap_or_default()
    }

    fn save(&self, repo: &Repo) {
        let _ = self.tx.send(Request::Save(repo.clone()));
    }
}

// ---------------------------------------------------------------------------
// Serializer thread
// ---------------------------------------------------------------------------

fn serve(
    path: &Path,
    mut state: BTreeMap<String, Repo>,
    rx: &Receiver<Request>,
    dying: &Receiver<()>,
) {
    let checkpoint = tick(CHECKPOINT_INTERVAL);
    loop {
        select! {
            recv(dying) -> _ => {
                if let Err(err) = save_file(path, &state) {
                    warn!(error = %err, "final state checkpoint failed");
                }
                return;
            }
            recv(checkpoint) -> _ => {
                if let Err(err) = save_file(path, &state) {
                    warn!(error = %err, "state checkpoint failed");
                }
            }
            recv(rx) -> request => match request {
                Ok(Request::Save(repo)) => {
                    state.insert(repo.location.url.clone(), repo);
                }
                Ok(Request::Load { url, reply }) => {
                    let found = state
                        .get(&url)
                        .map(|r| (r.state.clone(), r.scan))
                        .unwrap_or_default();
                    let _ = reply.send(found);
                }
                Err(_) => {
                    if let Err(err) = save_file(path, &state) {
                        warn!(error = %err, "final state checkpoint failed");
                    }
                    return;
                }
            },
        }
    }
}

fn load_file(path: &Path) -> Result<BTreeMap<String, Repo>, StateError> {
    if !path.exists() {
        std::fs::write(path, "").map_err(|source| StateError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "created empty state file");
        return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| StateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let records: Vec<RepoRecord> =
        serde_yaml::from_str(&raw).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(records
        .into_iter()
        .map(|record| (record.url.clone(), from_record(record)))
        .collect())
}

fn save_file(path: &Path, state: &BTreeMap<String, Repo>) -> std::io::Result<()> {
    let records: Vec<RepoRecord> = state.values().map(to_record).collect();
    let raw = serde_yaml::to_string(&records)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(raw.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
