//! Line-level leak matching.
//!
//! Every added line is evaluated against every pattern: the file regex
//! gates on `repo_url + "/" + file_path`, the content regex on the line,
//! and the optional entropy thresholds discard uniform matches. Filters
//! then remove (and count) otherwise-matching leaks.

use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::debug;

use super::stats::StatsEvent;
use super::worker::DiffAnalyzer;
use super::RulesHandle;
use crate::entropy::{shannon_entropy, word_shannon_entropy};
use crate::matching::{Entropies, Pattern};
use crate::model::{Diff, Leak};

/// Leak strings are capped at this many characters.
const MAX_LEAK_CHARS: usize = 1024;

pub(crate) struct LeakAnalyzer {
    pub leak_tx: Sender<Leak>,
    pub stats_tx: Sender<StatsEvent>,
    pub rules: RulesHandle,
}

impl DiffAnalyzer for LeakAnalyzer {
    fn analyze(&mut self, diff: &Arc<Diff>) {
        // One snapshot per diff: a reload mid-stream affects only later
        // diffs.
        let rules = self.rules.current();
        let leaks = find_leaks(diff, &rules.patterns);

        let mut found = 0u64;
        let mut filtered = 0u64;
        for leak in leaks {
            if is_filtered(&leak, &rules.filters) {
                filtered += 1;
                continue;
            }
            if self.leak_tx.send(leak).is_err() {
                return;
            }
            found += 1;
        }
        if found + filtered > 0 {
            let _ = self.stats_tx.send(StatsEvent::Leak {
                repo_url: diff.repo_url.clone(),
                found,
                filtered,
            });
        }
    }
}

/// All pattern matches in one diff, in line order.
pub(crate) fn find_leaks(diff: &Diff, patterns: &[Pattern]) -> Vec<Leak> {
    let repo_file_path = format!("{}/{}", diff.repo_url, diff.file_path);
    let mut leaks = Vec::new();
    for (offset, line) in diff.content.split('\n').enumerate() {
        for pattern in patterns {
            if !pattern.file_re.is_match(&repo_file_path) {
                continue;
            }
            if !pattern.content_re.is_match(line) {
                continue;
            }
            if let Some(gate) = pattern.entropies {
                if has_low_entropy(line, gate) {
                    debug!(pattern = %pattern.name, "match dropped: low entropy");
                    continue;
                }
            }
            let line_number = if diff.line_begin > 0 {
                diff.line_begin + u32::try_from(offset).unwrap_or(0)
            } else {
                0
            };
            leaks.push(Leak {
                pattern_name: pattern.name.clone(),
                pattern_regex: pattern.content_re.as_str().to_owned(),
                file_path: diff.file_path.clone(),
                repo_path: diff.repo_path.clone(),
                leak_string: truncate_chars(line, MAX_LEAK_CHARS),
                repo_url: diff.repo_url.clone(),
                commit_hash: diff.commit_hash.clone(),
                timestamp: diff.timestamp,
                line: line_number,
                commit_author: diff.author.clone(),
                commit_email: diff.author_email.clone(),
            });
        }
    }
    leaks
}

/// A filter suppresses a leak iff both its file and content regexes match.
pub(crate) fn is_filtered(leak: &Leak, filters: &[Pattern]) -> bool {
    let repo_file_path = format!("{}/{}", leak.repo_url, leak.file_path);
    filters.iter().any(|filter| {
        filter.file_re.is_match(&repo_file_path) && filter.content_re.is_match(&leak.leak_string)
    })
}

/// "Low entropy" when every *configured* threshold stays unmet. A gate
/// with both thresholds zero never fires.
fn has_low_entropy(line: &str, gate: Entropies) -> bool {
    if gate.word_min > 0.0 && word_shannon_entropy(line) >= gate.word_min {
        return false;
    }
    if gate.line_min > 0.0 && shannon_entropy(line) >= gate.line_min {
        return false;
    }
    gate.word_min > 0.0 || gate.line_min > 0.0
}

fn truncate_chars(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        line.to_owned()
    } else {
        line.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::PatternRule;
    use crate::matching::compile_patterns;

    fn diff(file_path: &str, content: &str) -> Diff {
        Diff {
            commit_hash: "c0ffee".to_owned(),
            repo_url: "https://example.com/org/repo".to_owned(),
            repo_path: "org/repo".to_owned(),
            file_path: file_path.to_owned(),
            line_begin: 1,
            content: content.to_owned(),
            author: "Alice".to_owned(),
            author_email: "alice@example.com".to_owned(),
            timestamp: Utc::now(),
        }
    }

    fn patterns(rules: &[(&str, &str, &str)]) -> Vec<Pattern> {
        let rules: Vec<PatternRule> = rules
            .iter()
            .map(|(name, file, content)| PatternRule {
                name: (*name).to_owned(),
                file: (*file).to_owned(),
                content: (*content).to_owned(),
                entropies: None,
            })
            .collect();
        compile_patterns(&rules).expect("compiles")
    }

    #[test]
    fn minimum_leak_scenario() {
        let pats = patterns(&[("pw", "*", "password=")]);
        let leaks = find_leaks(&diff("x.conf", "password=abc\n"), &pats);
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].pattern_name, "pw");
        assert_eq!(leaks[0].leak_string, "password=abc");
        assert_eq!(leaks[0].line, 1);
        assert_eq!(leaks[0].commit_author, "Alice");
    }

    #[test]
    fn file_regex_gates_on_repo_and_path() {
        let pats = patterns(&[("pw", "org/repo/.*\\.conf", "password=")]);
        assert_eq!(
            find_leaks(&diff("x.conf", "password=abc"), &pats).len(),
            1
        );
        assert!(find_leaks(&diff("x.txt", "password=abc"), &pats).is_empty());
    }

    #[test]
    fn line_numbers_follow_the_chunk_offset() {
        let pats = patterns(&[("pw", "*", "password=")]);
        let mut d = diff("x.conf", "a=1\npassword=abc\n");
        d.line_begin = 10;
        let leaks = find_leaks(&d, &pats);
        assert_eq!(leaks[0].line, 11);
    }

    #[test]
    fn unattributable_position_stays_zero() {
        let pats = patterns(&[("pw", "*", "password=")]);
        let mut d = diff("x.conf", "password=abc");
        d.line_begin = 0;
        assert_eq!(find_leaks(&d, &pats)[0].line, 0);
    }

    #[test]
    fn leak_string_is_capped_at_1024_chars() {
        let pats = patterns(&[("pw", "*", "password=")]);
        let long = format!("password={}", "x".repeat(2000));
        let leaks = find_leaks(&diff("x.conf", &long), &pats);
        assert_eq!(leaks[0].leak_string.chars().count(), 1024);
    }

    #[test]
    fn whitespace_survives_matching() {
        let pats = patterns(&[("pw", "*", "password=")]);
        let leaks = find_leaks(&diff("x.conf", "  password=abc  \n"), &pats);
        assert_eq!(leaks[0].leak_string, "  password=abc  ");
    }

    #[test]
    fn filters_suppress_on_file_and_content() {
        let filters = patterns(&[("tests", ".*test.*", "password=")]);
        let pats = patterns(&[("pw", "*", "password=")]);
        let leaks = find_leaks(&diff("config.test.conf", "password=abc"), &pats);
        assert!(is_filtered(&leaks[0], &filters));

        let unfiltered = find_leaks(&diff("prod.conf", "password=abc"), &pats);
        assert!(!is_filtered(&unfiltered[0], &filters));
    }

    #[test]
    fn entropy_gate_drops_uniform_matches() {
        let gate = Entropies {
            word_min: 3.0,
            line_min: 0.0,
        };
        assert!(has_low_entropy("password=aaaaaaaa", gate));
        assert!(!has_low_entropy("password=8fUk2qZpXw1v", gate));
    }

    #[test]
    fn disabled_gate_never_fires() {
        let gate = Entropies {
            word_min: 0.0,
            line_min: 0.0,
        };
        assert!(!has_low_entropy("password=aaaaaaaa", gate));
    }

    #[test]
    fn any_configured_threshold_is_enough() {
        // Word entropy clears 3.0 even though the line threshold of 7.0
        // is unreachable: the match survives.
        let gate = Entropies {
            word_min: 3.0,
            line_min: 7.0,
        };
        assert!(!has_low_entropy("password=8fUk2qZpXw1v", gate));
    }
}
