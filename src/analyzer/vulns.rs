//! Vulnerability lookups over batched dependencies.
//!
//! Dependencies are collected until the batch is full (100) or stale (2 s),
//! then resolved in one catalog call. Reports are matched back to their
//! dependency through a PURL-keyed map, suppressions are applied, and the
//! survivors are aggregated into one `VulnerableDependency` per PURL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{after, select, Receiver, Sender};
use tracing::{debug, warn};

use super::stats::StatsEvent;
use super::RulesHandle;
use crate::matching::filter_suppressed;
use crate::model::{Dependency, Vulnerability, VulnerableDependency};
use crate::ossindex::OssIndexClient;

pub(crate) const MAX_BATCH_SIZE: usize = 100;
pub(crate) const BATCH_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct VulnSearcher {
    pub vulns_tx: Sender<VulnerableDependency>,
    pub stats_tx: Sender<StatsEvent>,
    pub client: Arc<OssIndexClient>,
    pub rules: RulesHandle,
}

impl VulnSearcher {
    /// Resolve one batch: lookup, suppress, aggregate, emit.
    pub(crate) fn search(&self, batch: &[Dependency]) {
        if batch.is_empty() {
            return;
        }
        let mut by_purl: HashMap<String, &Dependency> = HashMap::new();
        let mut coordinates = Vec::with_capacity(batch.len());
        for dependency in batch {
            let purl = dependency.purl.to_string();
            coordinates.push(purl.clone());
            by_purl.insert(purl, dependency);
        }

        let reports = match self.client.component_reports(&coordinates) {
            Ok(reports) => reports,
            Err(err) => {
                // The whole batch is dropped; there is no finding to emit.
                warn!(batch = batch.len(), error = %err, "vulnerability lookup failed");
                return;
            }
        };

        let rules = self.rules.current();
        for report in reports {
            let Some(dependency) = by_purl.get(&report.coordinates) else {
                warn!(coordinates = %report.coordinates, "report without matching dependency");
                continue;
            };
            let vulnerabilities: Vec<Vulnerability> = report
                .vulnerabilities
                .into_iter()
                .map(to_vulnerability)
                .collect();
            if vulnerabilities.is_empty() {
                continue;
            }
            let total = vulnerabilities.len();
            let (kept, suppressed) =
                filter_suppressed(dependency, vulnerabilities, &rules.suppressions);
            let found = kept.len();
            debug_assert_eq!(found + suppressed, total);
            debug!(
                repo = %dependency.diff.repo_url,
                file = %dependency.diff.file_path,
                found,
                suppressed,
                "vulnerabilities resolved"
            );

            if found > 0 {
                let finding = to_vulnerable_dependency(dependency, kept);
                if self.vulns_tx.send(finding).is_err() {
                    return;
                }
            }
            if found > 0 || suppressed > 0 {
                let _ = self.stats_tx.send(StatsEvent::Vulnerability {
                    repo_url: dependency.diff.repo_url.clone(),
                    found: found as u64,
                    suppressed: suppressed as u64,
                });
            }
        }
    }
}

fn to_vulnerability(oss: crate::ossindex::OssVulnerability) -> Vulnerability {
    Vulnerability {
        source: "Sonatype OSS Index".to_owned(),
        id: oss.id,
        title: oss.title,
        description: oss.description,
        cvss_score: oss.cvss_score,
        cvss_vector: oss.cvss_vector,
        cwe: oss.cwe,
        cve: oss.cve,
        reference: oss.reference,
        version_ranges: oss.version_ranges,
    }
}

fn to_vulnerable_dependency(
    dependency: &Dependency,
    vulnerabilities: Vec<Vulnerability>,
) -> VulnerableDependency {
    VulnerableDependency {
        vulnerabilities,
        dependency_name: dependency.purl.name.clone(),
        version: dependency.purl.version.clone(),
        file_path: dependency.diff.file_path.clone(),
        repo_path: dependency.diff.repo_path.clone(),
        repo_url: dependency.diff.repo_url.clone(),
        commit_hash: dependency.diff.commit_hash.clone(),
        timestamp: dependency.diff.timestamp,
        commit_author: dependency.diff.author.clone(),
        commit_email: dependency.diff.author_email.clone(),
    }
}

/// Collect dependencies into batches and hand them to the searcher. The
/// timer starts at the first item of each batch; shutdown flushes the
/// in-flight batch.
pub(crate) fn run_batch_worker(
    deps_rx: &Receiver<Dependency>,
    dying: &Receiver<()>,
    searcher: &VulnSearcher,
) {
    loop {
        let first = select! {
            recv(dying) -> _ => return,
            recv(deps_rx) -> dep => match dep {
                Ok(dep) => dep,
                Err(_) => return,
            },
        };
        let mut batch = vec![first];
        let deadline = after(BATCH_TIMEOUT);
        loop {
            select! {
                recv(dying) -> _ => {
                    searcher.search(&batch);
                    return;
                }
                recv(deadline) -> _ => break,
                recv(deps_rx) -> dep => match dep {
                    Ok(dep) => {
                        batch.push(dep);
                        if batch.len() >= MAX_BATCH_SIZE {
                            break;
                        }
                    }
                    Err(_) => {
                        searcher.search(&batch);
                        return;
                    }
                },
            }
        }
        searcher.search(&batch);
    }
}
