//! The analyzer dispatcher: worker pools, rule-set hot swap, statistics.
//!
//! The incoming diff stream is duplicated to the leak and dependency
//! stages; each stage runs `workers` threads. Rule sets live behind a
//! single snapshot handle so a config reload swaps them atomically without
//! restarting any worker. One coalescer thread owns all statistics.

mod deps;
mod fanout;
mod leaks;
mod stats;
mod vulns;
mod worker;

pub use deps::{DepEntry, ManifestKind, ManifestParseError};
pub use stats::StatsEvent;

use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info};

use crate::config::Config;
use crate::matching::{compile_rules, CompiledRules, MatchError};
use crate::metrics::MetricsRegistry;
use crate::model::{Diff, Leak, RepoStats, VulnerableDependency};
use crate::ossindex::OssIndexClient;
use crate::shutdown::Shutdown;

use self::deps::DepsAnalyzer;
use self::leaks::LeakAnalyzer;
use self::stats::StatsCounters;
use self::vulns::VulnSearcher;
use self::worker::run_diff_worker;

/// Capacity of each duplicated diff channel.
const DUPLICATE_BUFFER: usize = 200;
/// Capacity of the parsed-dependency channel feeding the batchers.
const DEPS_BUFFER: usize = 100;
/// Capacity of the statistics event channel.
const STATS_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// RulesHandle
// ---------------------------------------------------------------------------

/// Shared snapshot handle over the compiled rule sets.
///
/// Workers call [`current`](Self::current) once per diff and keep that
/// snapshot for the whole evaluation; [`replace`](Self::replace) swaps the
/// snapshot as a whole, so readers observe either the old or the new set,
/// never a mix.
#[derive(Clone)]
pub struct RulesHandle(Arc<RwLock<Arc<CompiledRules>>>);

impl RulesHandle {
    #[must_use]
    pub fn new(rules: CompiledRules) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(rules))))
    }

    /// # Panics
    ///
    /// Panics if the rules lock is poisoned.
    #[must_use]
    pub fn current(&self) -> Arc<CompiledRules> {
        Arc::clone(&self.0.read().expect("rules handle poisoned"))
    }

    /// # Panics
    ///
    /// Panics if the rules lock is poisoned.
    pub fn replace(&self, rules: CompiledRules) {
        *self.0.write().expect("rules handle poisoned") = Arc::new(rules);
    }
}

// ---------------------------------------------------------------------------
// StatsProbe
// ---------------------------------------------------------------------------

/// Cheap handle for statistics snapshots (status ticker, diagnostics).
#[derive(Clone)]
pub struct StatsProbe {
    stats_tx: Sender<StatsEvent>,
}

impl StatsProbe {
    /// Current counters for `repo_url`; zero values when unknown or when
    /// the coalescer is gone.
    #[must_use]
    pub fn status(&self, repo_url: &str) -> RepoStats {
        let (reply_tx, reply_rx) = bounded(1);
        if self
            .stats_tx
            .send(StatsEvent::Query {
                repo_url: repo_url.to_owned(),
                reply: reply_tx,
            })
            .is_err()
        {
            return RepoStats::default();
        }
        reply_rx.recv().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// AnalyzerDispatcher
// ---------------------------------------------------------------------------

/// Owns the analyzer worker pools and the stats coalescer.
pub struct AnalyzerDispatcher {
    rules: RulesHandle,
    stats_tx: Sender<StatsEvent>,
    shutdown: Shutdown,
    threads: Vec<JoinHandle<()>>,
}

impl AnalyzerDispatcher {
    /// Compile the rule sets and spawn the pipeline threads.
    ///
    /// # Errors
    /// [`MatchError`] when any configured regex fails to compile; nothing
    /// is spawned in that case.
    pub fn start(
        config: &Config,
        diff_rx: Receiver<Arc<Diff>>,
        leak_tx: Sender<Leak>,
        vulns_tx: Sender<VulnerableDependency>,
        metrics: &MetricsRegistry,
    ) -> Result<Self, MatchError> {
        let client = OssIndexClient::new(
            &config.exposures.oss_index_user,
            &config.exposures.oss_index_password,
        );
        Self::start_with_client(config, diff_rx, leak_tx, vulns_tx, metrics, client)
    }

    /// [`start`](Self::start) with an injected catalog client (tests,
    /// mirrors).
    ///
    /// # Errors
    /// Same as [`start`](Self::start).
    pub fn start_with_client(
        config: &Config,
        diff_rx: Receiver<Arc<Diff>>,
        leak_tx: Sender<Leak>,
        vulns_tx: Sender<VulnerableDependency>,
        metrics: &MetricsRegistry,
        client: OssIndexClient,
    ) -> Result<Self, MatchError> {
        let rules = RulesHandle::new(compile_rules(config)?);
        let workers = config.common.worker_count();
        let shutdown = Shutdown::new();
        let mut threads = Vec::new();

        let (stats_tx, stats_rx) = bounded(STATS_BUFFER);
        let counters = StatsCounters {
            leaks: metrics.counter("leaks.found"),
            vulnerabilities: metrics.counter("vulnerabilities.found"),
        };
        let coalescer_dying = shutdown.subscribe();
        threads.push(std::thread::spawn(move || {
            stats::run_coalescer(&stats_rx, coalescer_dying.receiver(), &counters);
        }));

        let (leaks_rx, deps_diff_rx, fanout_handle) = fanout::duplicate(
            diff_rx,
            DUPLICATE_BUFFER,
            shutdown.subscribe().receiver().clone(),
        );
        threads.push(fanout_handle);

        let (deps_tx, deps_rx) = bounded(DEPS_BUFFER);
        let client = Arc::new(client);

        for _ in 0..workers {
            let analyzer = LeakAnalyzer {
                leak_tx: leak_tx.clone(),
                stats_tx: stats_tx.clone(),
                rules: rules.clone(),
            };
            let rx = leaks_rx.clone();
            let dying = shutdown.subscribe();
            threads.push(std::thread::spawn(move || {
                run_diff_worker(&rx, dying.receiver(), analyzer);
            }));

            let parser = DepsAnalyzer {
                deps_tx: deps_tx.clone(),
            };
            let rx = deps_diff_rx.clone();
            let dying = shutdown.subscribe();
            threads.push(std::thread::spawn(move || {
                run_diff_worker(&rx, dying.receiver(), parser);
            }));

            let searcher = VulnSearcher {
                vulns_tx: vulns_tx.clone(),
                stats_tx: stats_tx.clone(),
                client: Arc::clone(&client),
                rules: rules.clone(),
            };
            let rx = deps_rx.clone();
            let dying = shutdown.subscribe();
            threads.push(std::thread::spawn(move || {
                vulns::run_batch_worker(&rx, dying.receiver(), &searcher);
            }));
        }
        // The workers hold the only remaining clones: the deps channel
        // closes once every parse worker is gone.
        drop(deps_tx);

        info!(workers, "analyzer dispatcher started");
        Ok(Self {
            rules,
            stats_tx,
            shutdown,
            threads,
        })
    }

    /// Swap the rule sets without touching the workers.
    ///
    /// # Errors
    /// [`MatchError`] when the new rules do not compile; the previous rule
    /// sets stay in effect.
    pub fn update(&self, config: &Config) -> Result<(), MatchError> {
        let rules = compile_rules(config)?;
        info!(
            patterns = rules.patterns.len(),
            filters = rules.filters.len(),
            suppressions = rules.suppressions.len(),
            "rule sets loaded"
        );
        self.rules.replace(rules);
        Ok(())
    }

    /// Statistics snapshot for one repository.
    #[must_use]
    pub fn status(&self, repo_url: &str) -> RepoStats {
        self.probe().status(repo_url)
    }

    /// A cloneable handle for status readers on other threads.
    #[must_use]
    pub fn probe(&self) -> StatsProbe {
        StatsProbe {
            stats_tx: self.stats_tx.clone(),
        }
    }

    /// Signal every worker and wait for them.
    pub fn stop(mut self) {
        self.shutdown.signal();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        debug!("analyzer dispatcher stopped");
    }
}
