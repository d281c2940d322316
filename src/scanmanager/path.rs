//! The on-disk path inspector: glob expansion and identity derivation.

use std::collections::BTreeSet;

use crate::model::RepoLocation;

/// Expand the configured globs to existing directories. Entries prefixed
/// with `!` exclude their matches; only directories are retained.
pub(crate) fn expand(patterns: &[String]) -> Result<BTreeSet<String>, glob::PatternError> {
    let mut excluded = BTreeSet::new();
    for pattern in patterns {
        let Some(pattern) = pattern.strip_prefix('!') else {
            continue;
        };
        for entry in glob::glob(pattern)?.flatten() {
            excluded.insert(entry.to_string_lossy().into_owned());
        }
    }

    let mut out = BTreeSet::new();
    for pattern in patterns {
        if pattern.starts_with('!') {
            continue;
        }
        for entry in glob::glob(pattern)?.flatten() {
            let text = entry.to_string_lossy().into_owned();
            if excluded.contains(&text) {
                continue;
            }
            if entry.is_dir() {
                out.insert(text);
            }
        }
    }
    Ok(out)
}

/// Derive a repository identity from a matched directory: the configured
/// prefix becomes the data path, the remainder the repo path, and the URL
/// is the base plus the remainder with `trim_suffix`/`.git` stripped.
pub(crate) fn location_for(
    path: &str,
    url_base: &str,
    trim_prefix: &str,
    trim_suffix: &str,
) -> RepoLocation {
    let prefix = trim_prefix.replace('\\', "/");
    let prefix = prefix.trim_end_matches('/');
    let normalized = path.replace('\\', "/");
    let rel = normalized
        .strip_prefix(prefix)
        .unwrap_or(normalized.as_str());
    let rel = rel.trim_matches('/');

    let mut url_path = rel;
    if !trim_suffix.is_empty() {
        url_path = url_path.strip_suffix(trim_suffix).unwrap_or(url_path);
    }
    let url_path = url_path.strip_suffix(".git").unwrap_or(url_path);
    let base = url_base.trim_end_matches('/');

    RepoLocation {
        url: format!("{base}/{url_path}"),
        clone_url: String::new(),
        data_path: prefix.to_owned(),
        repo_path: rel.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_strips_prefix_and_git_suffix() {
        let location = location_for(
            "/srv/mirrors/org/repo.git",
            "https://example.com/",
            "/srv/mirrors",
            "",
        );
        assert_eq!(location.url, "https://example.com/org/repo");
        assert_eq!(location.data_path, "/srv/mirrors");
        assert_eq!(location.repo_path, "org/repo.git");
    }

    #[test]
    fn configured_suffix_is_stripped_from_url() {
        let location = location_for(
            "/srv/mirrors/org/repo.mirror",
            "https://example.com",
            "/srv/mirrors",
            ".mirror",
        );
        assert_eq!(location.url, "https://example.com/org/repo");
        assert_eq!(location.repo_path, "org/repo.mirror");
    }

    #[test]
    fn backslashes_are_normalized() {
        let location = location_for(
            r"C:\mirrors\org\repo",
            "https://example.com",
            r"C:\mirrors",
            "",
        );
        assert_eq!(location.url, "https://example.com/org/repo");
        assert_eq!(location.repo_path, "org/repo");
    }

    #[test]
    fn expand_keeps_directories_and_honors_exclusions() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("keep")).expect("mkdir");
        std::fs::create_dir(dir.path().join("skip")).expect("mkdir");
        std::fs::write(dir.path().join("file"), "x").expect("write");

        let all = format!("{}/*", dir.path().display());
        let skip = format!("!{}/skip", dir.path().display());
        let dirs = expand(&[all, skip]).expect("expand");

        let names: Vec<&str> = dirs
            .iter()
            .filter_map(|p| p.rsplit('/').next())
            .collect();
        assert_eq!(names, vec!["keep"]);
    }
}
