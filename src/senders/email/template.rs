//! HTML rendering of notification mail.
//!
//! Plain `format!` templates: one section per repository, one table row
//! per finding. Leak strings are trimmed for display and replaced with a
//! placeholder beyond 512 characters; all operator-controlled text is
//! HTML-escaped.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::model::{Leak, VulnerableDependency};

/// Display cap for leak strings inside mail bodies.
const MAX_DISPLAY_CHARS: usize = 512;

/// Subject and HTML body for a leak batch.
pub(super) fn render_leaks(leaks: &[Leak]) -> (String, String) {
    let mut by_repo: BTreeMap<&str, Vec<&Leak>> = BTreeMap::new();
    let mut files: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    for leak in leaks {
        by_repo.entry(&leak.repo_url).or_default().push(leak);
        files.insert(format!("{}/{}", leak.repo_url, leak.file_path));
    }

    let subject = if by_repo.len() == 1 {
        let repo = by_repo.keys().next().copied().unwrap_or_default();
        format!("Found {} leaks in {repo}", leaks.len())
    } else {
        format!("Found {} leaks in {} repos", leaks.len(), by_repo.len())
    };

    let mut body = String::new();
    let _ = write!(
        body,
        "<html><body><h2>Found {} leaks in {} files</h2>",
        leaks.len(),
        files.len()
    );
    for (repo, entries) in &by_repo {
        let _ = write!(body, "<h3>{}</h3><table border=\"1\">", escape(repo));
        body.push_str(
            "<tr><th>File</th><th>Line</th><th>Pattern</th><th>Leak</th>\
             <th>Author</th><th>Commit</th></tr>",
        );
        for leak in entries {
            let _ = write!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td><code>{}</code></td>\
                 <td>{}</td><td>{}</td></tr>",
                escape(&leak.file_path),
                leak.line,
                escape(&leak.pattern_name),
                escape(&display_leak_string(&leak.leak_string)),
                escape(&leak.commit_author),
                escape(&leak.commit_hash),
            );
        }
        body.push_str("</table>");
    }
    body.push_str("</body></html>");
    (subject, body)
}

/// Subject and HTML body for a vulnerable-dependency batch.
pub(super) fn render_exposures(exposures: &[VulnerableDependency]) -> (String, String) {
    let mut by_repo: BTreeMap<&str, Vec<&VulnerableDependency>> = BTreeMap::new();
    for exposure in exposures {
        by_repo.entry(&exposure.repo_url).or_default().push(exposure);
    }
    let total: usize = exposures.iter().map(|e| e.vulnerabilities.len()).sum();

    let subject = if by_repo.len() == 1 {
        let repo = by_repo.keys().next().copied().unwrap_or_default();
        format!("Found {total} vulnerabilities in {repo}")
    } else {
        format!("Found {total} vulnerabilities in {} repos", by_repo.len())
    };

    let mut body = String::new();
    let _ = write!(
        body,
        "<html><body><h2>Found {total} vulnerabilities in {} dependencies</h2>",
        exposures.len()
    );
    for (repo, entries) in &by_repo {
        let _ = write!(body, "<h3>{}</h3><table border=\"1\">", escape(repo));
        body.push_str(
            "<tr><th>Dependency</th><th>Version</th><th>File</th><th>Id</th>\
             <th>Title</th><th>CVSS</th><th>CVE</th></tr>",
        );
        for exposure in entries {
            for vulnerability in &exposure.vulnerabilities {
                let _ = write!(
                    body,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
                     <td>{}</td><td>{:.1}</td><td>{}</td></tr>",
                    escape(&exposure.dependency_name),
                    escape(&exposure.version),
                    escape(&exposure.file_path),
                    escape(&vulnerability.id),
                    escape(&vulnerability.title),
                    vulnerability.cvss_score,
                    escape(&vulnerability.cve),
                );
            }
        }
        body.push_str("</table>");
    }
    body.push_str("</body></html>");
    (subject, body)
}

/// Leak strings are whitespace-trimmed for display; overly long ones are
/// not worth mailing.
fn display_leak_string(leak_string: &str) -> String {
    let trimmed = leak_string.trim();
    if trimmed.chars().count() > MAX_DISPLAY_CHARS {
        "too long".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn leak(repo_url: &str, text: &str) -> Leak {
        Leak {
            pattern_name: "pw".to_owned(),
            pattern_regex: String::new(),
            file_path: "x.conf".to_owned(),
            repo_path: String::new(),
            leak_string: text.to_owned(),
            repo_url: repo_url.to_owned(),
            commit_hash: "c0ffee".to_owned(),
            timestamp: Utc::now(),
            line: 1,
            commit_author: "Alice".to_owned(),
            commit_email: "alice@example.com".to_owned(),
        }
    }

    #[test]
    fn single_repo_subject_names_the_repo() {
        let (subject, _) = render_leaks(&[leak("https://a", "password=1")]);
        assert_eq!(subject, "Found 1 leaks in https://a");
    }

    #[test]
    fn multi_repo_subject_counts_repos() {
        let (subject, _) = render_leaks(&[
            leak("https://a", "password=1"),
            leak("https://b", "password=2"),
        ]);
        assert_eq!(subject, "Found 2 leaks in 2 repos");
    }

    #[test]
    fn body_groups_by_repo_and_escapes() {
        let (_, body) = render_leaks(&[leak("https://a", "password=<script>")]);
        assert!(body.contains("<h3>https://a</h3>"));
        assert!(body.contains("password=&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[test]
    fn long_leak_strings_become_placeholder() {
        let long = "x".repeat(600);
        let (_, body) = render_leaks(&[leak("https://a", &long)]);
        assert!(body.contains("too long"));
        assert!(!body.contains(&long));
    }

    #[test]
    fn display_trims_whitespace() {
        let (_, body) = render_leaks(&[leak("https://a", "  password=abc  ")]);
        assert!(body.contains("<code>password=abc</code>"));
    }
}
