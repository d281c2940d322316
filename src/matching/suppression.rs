//! Vulnerability suppressions: eight-field regex rules that drop known,
//! accepted vulnerabilities from the output.

use std::path::Path;

use regex::Regex;

use super::patterns::compile_regex;
use super::MatchError;
use crate::config::SuppressionRule;
use crate::model::{Dependency, Vulnerability};

/// A compiled suppression. A vulnerability is suppressed iff *all* eight
/// regexes match their corresponding attributes.
#[derive(Debug)]
pub struct Suppression {
    repository: Regex,
    dependency_name: Regex,
    version: Regex,
    file_path: Regex,
    source: Regex,
    id: Regex,
    title: Regex,
    cve: Regex,
}

impl Suppression {
    /// Whether this rule suppresses `vulnerability` for `dependency`.
    #[must_use]
    pub fn matches(&self, dependency: &Dependency, vulnerability: &Vulnerability) -> bool {
        self.repository.is_match(&dependency.diff.repo_url)
            && self.dependency_name.is_match(&dependency.purl.name)
            && self.version.is_match(&dependency.purl.version)
            && self.file_path.is_match(&dependency.diff.file_path)
            && self.source.is_match(&vulnerability.source)
            && self.id.is_match(&vulnerability.id)
            && self.title.is_match(&vulnerability.title)
            && self.cve.is_match(&vulnerability.cve)
    }
}

/// Compile a list of configured suppressions.
///
/// # Errors
/// The first regex that fails to compile.
pub fn compile_suppressions(rules: &[SuppressionRule]) -> Result<Vec<Suppression>, MatchError> {
    rules
        .iter()
        .map(|rule| {
            Ok(Suppression {
                repository: compile_regex(&rule.repository)?,
                dependency_name: compile_regex(&rule.dep_name)?,
                version: compile_regex(&rule.dep_version)?,
                file_path: compile_regex(&rule.file_path)?,
                source: compile_regex(&rule.source)?,
                id: compile_regex(&rule.id)?,
                title: compile_regex(&rule.title)?,
                cve: compile_regex(&rule.cve)?,
            })
        })
        .collect()
}

/// Load and compile every YAML file matched by `glob_pattern`.
///
/// # Errors
/// Glob, I/O, YAML, or regex failures — all-or-nothing.
pub fn load_suppressions_glob(glob_pattern: &str) -> Result<Vec<Suppression>, MatchError> {
    let entries = glob::glob(glob_pattern).map_err(|e| MatchError::BadGlob {
        glob: glob_pattern.to_owned(),
        reason: e.to_string(),
    })?;
    let mut out = Vec::new();
    for entry in entries.flatten() {
        out.extend(load_suppressions_file(&entry)?);
    }
    Ok(out)
}

fn load_suppressions_file(path: &Path) -> Result<Vec<Suppression>, MatchError> {
    let raw = std::fs::read_to_string(path).map_err(|source| MatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rules: Vec<SuppressionRule> =
        serde_yaml::from_str(&raw).map_err(|source| MatchError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    compile_suppressions(&rules)
}

/// Drop suppressed vulnerabilities. Returns the survivors and the number
/// suppressed.
#[must_use]
pub fn filter_suppressed(
    dependency: &Dependency,
    vulnerabilities: Vec<Vulnerability>,
    suppressions: &[Suppression],
) -> (Vec<Vulnerability>, usize) {
    let total = vulnerabilities.len();
    let kept: Vec<Vulnerability> = vulnerabilities
        .into_iter()
        .filter(|vuln| !suppressions.iter().any(|s| s.matches(dependency, vuln)))
        .collect();
    let suppressed = total - kept.len();
    (kept, suppressed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::model::{Diff, Purl};

    fn dependency(repo_url: &str, name: &str, version: &str, file_path: &str) -> Dependency {
        Dependency {
            purl: Purl {
                ecosystem: "npm".to_owned(),
                name: name.to_owned(),
                version: version.to_owned(),
            },
            diff: Arc::new(Diff {
                commit_hash: "c0ffee".to_owned(),
                repo_url: repo_url.to_owned(),
                repo_path: "ex/r".to_owned(),
                file_path: file_path.to_owned(),
                line_begin: 1,
                content: String::new(),
                author: "Alice".to_owned(),
                author_email: "alice@example.com".to_owned(),
                timestamp: Utc::now(),
            }),
        }
    }

    fn vulnerability(id: &str, cve: &str) -> Vulnerability {
        Vulnerability {
            source: "Sonatype OSS Index".to_owned(),
            id: id.to_owned(),
            title: "Prototype pollution".to_owned(),
            description: String::new(),
            cvss_score: 7.5,
            cvss_vector: String::new(),
            cwe: "CWE-1321".to_owned(),
            cve: cve.to_owned(),
            reference: String::new(),
            version_ranges: Vec::new(),
        }
    }

    fn rule() -> SuppressionRule {
        SuppressionRule {
            repository: "ex/r".to_owned(),
            dep_name: "foo".to_owned(),
            dep_version: r"1\.0\.0".to_owned(),
            file_path: "package-lock".to_owned(),
            id: "OI-1".to_owned(),
            ..SuppressionRule::default()
        }
    }

    #[test]
    fn all_eight_fields_must_match() {
        let suppressions = compile_suppressions(&[rule()]).expect("compiles");
        let dep = dependency("https://gh/ex/r", "foo", "1.0.0", "package-lock.json");

        assert!(suppressions[0].matches(&dep, &vulnerability("OI-1", "CVE-2020-1")));

        // A single mismatching attribute defeats the rule.
        assert!(!suppressions[0].matches(&dep, &vulnerability("OI-2", "CVE-2020-1")));
        let other_dep = dependency("https://gh/ex/r", "bar", "1.0.0", "package-lock.json");
        assert!(!suppressions[0].matches(&other_dep, &vulnerability("OI-1", "CVE-2020-1")));
    }

    #[test]
    fn empty_fields_match_anything() {
        let suppressions =
            compile_suppressions(&[SuppressionRule::default()]).expect("compiles");
        let dep = dependency("https://gh/ex/r", "foo", "1.0.0", "package-lock.json");
        assert!(suppressions[0].matches(&dep, &vulnerability("OI-9", "")));
    }

    #[test]
    fn filter_counts_suppressed() {
        let suppressions = compile_suppressions(&[rule()]).expect("compiles");
        let dep = dependency("https://gh/ex/r", "foo", "1.0.0", "package-lock.json");
        let vulns = vec![
            vulnerability("OI-1", "CVE-2020-1"),
            vulnerability("OI-2", "CVE-2020-2"),
        ];
        let (kept, suppressed) = filter_suppressed(&dep, vulns, &suppressions);
        assert_eq!(suppressed, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "OI-2");
    }
}
