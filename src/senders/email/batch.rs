//! Recipient grouping for batched findings.

use std::collections::BTreeMap;

use crate::model::{Leak, VulnerableDependency};

/// Leaks per commit author email, insertion order preserved within each
/// author.
pub(super) fn group_leaks_by_author(leaks: &[Leak]) -> BTreeMap<String, Vec<Leak>> {
    let mut groups: BTreeMap<String, Vec<Leak>> = BTreeMap::new();
    for leak in leaks {
        if leak.commit_email.is_empty() || leak.commit_email == "unknown" {
            continue;
        }
        groups
            .entry(leak.commit_email.clone())
            .or_default()
            .push(leak.clone());
    }
    groups
}

/// Vulnerable dependencies per commit author email.
pub(super) fn group_exposures_by_author(
    exposures: &[VulnerableDependency],
) -> BTreeMap<String, Vec<VulnerableDependency>> {
    let mut groups: BTreeMap<String, Vec<VulnerableDependency>> = BTreeMap::new();
    for exposure in exposures {
        if exposure.commit_email.is_empty() || exposure.commit_email == "unknown" {
            continue;
        }
        groups
            .entry(exposure.commit_email.clone())
            .or_default()
            .push(exposure.clone());
    }
    groups
}
