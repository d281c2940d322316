//! Per-repository statistics, serialized through a single coalescer.
//!
//! Workers emit integer deltas; one thread owns the counters map, so no
//! lock exists anywhere. Snapshot reads travel the same channel as writes
//! and therefore observe a consistent state.

use std::collections::HashMap;

use crossbeam_channel::{select, Receiver, Sender};

use crate::metrics::Counter;
use crate::model::RepoStats;

/// An event for the coalescer: a delta from a worker, or a snapshot query.
pub enum StatsEvent {
    Leak {
        repo_url: String,
        found: u64,
        filtered: u64,
    },
    Vulnerability {
        repo_url: String,
        found: u64,
        suppressed: u64,
    },
    Query {
        repo_url: String,
        reply: Sender<RepoStats>,
    },
}

/// Counters mirrored to the metrics backend on every `found` delta.
pub struct StatsCounters {
    pub leaks: Counter,
    pub vulnerabilities: Counter,
}

/// The coalescer loop. Exits on shutdown or when all workers are gone.
pub(crate) fn run_coalescer(
    rx: &Receiver<StatsEvent>,
    dying: &Receiver<()>,
    counters: &StatsCounters,
) {
    let mut stats: HashMap<String, RepoStats> = HashMap::new();
    loop {
        select! {
            recv(dying) -> _ => return,
            recv(rx) -> event => match event {
                Ok(StatsEvent::Leak { repo_url, found, filtered }) => {
                    let entry = stats.entry(repo_url).or_default();
                    entry.leaks_found += found;
                    entry.leaks_filtered += filtered;
                    counters.leaks.add(found);
                }
                Ok(StatsEvent::Vulnerability { repo_url, found, suppressed }) => {
                    let entry = stats.entry(repo_url).or_default();
                    entry.vulnerabilities_found += found;
                    entry.vulnerabilities_suppressed += suppressed;
                    counters.vulnerabilities.add(found);
                }
                Ok(StatsEvent::Query { repo_url, reply }) => {
                    let _ = reply.send(stats.get(&repo_url).copied().unwrap_or_default());
                }
                Err(_) => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::{bounded, unbounded};

    use super::*;

    fn spawn_coalescer() -> (Sender<StatsEvent>, Counter, Counter, Sender<()>) {
        let (tx, rx) = unbounded();
        let (dying_tx, dying_rx) = bounded::<()>(0);
        let leaks = Counter::default();
        let vulns = Counter::default();
        let counters = StatsCounters {
            leaks: leaks.clone(),
            vulnerabilities: vulns.clone(),
        };
        std::thread::spawn(move || {
            run_coalescer(&rx, &dying_rx, &counters);
        });
        (tx, leaks, vulns, dying_tx)
    }

    fn query(tx: &Sender<StatsEvent>, url: &str) -> RepoStats {
        let (reply_tx, reply_rx) = bounded(1);
        tx.send(StatsEvent::Query {
            repo_url: url.to_owned(),
            reply: reply_tx,
        })
        .expect("coalescer alive");
        reply_rx.recv().expect("reply")
    }

    #[test]
    fn deltas_accumulate_per_repo() {
        let (tx, leaks, vulns, _dying) = spawn_coalescer();
        tx.send(StatsEvent::Leak {
            repo_url: "https://a".to_owned(),
            found: 2,
            filtered: 1,
        })
        .expect("send");
        tx.send(StatsEvent::Vulnerability {
            repo_url: "https://a".to_owned(),
            found: 1,
            suppressed: 3,
        })
        .expect("send");

        let stats = query(&tx, "https://a");
        assert_eq!(stats.leaks_found, 2);
        assert_eq!(stats.leaks_filtered, 1);
        assert_eq!(stats.vulnerabilities_found, 1);
        assert_eq!(stats.vulnerabilities_suppressed, 3);
        assert_eq!(leaks.value(), 2);
        assert_eq!(vulns.value(), 1);
    }

    #[test]
    fn unknown_repo_reads_zero() {
        let (tx, _, _, _dying) = spawn_coalescer();
        assert_eq!(query(&tx, "https://nowhere"), RepoStats::default());
    }
}
