//! Compiled rule sets: leak patterns, leak filters, and vulnerability
//! suppressions.
//!
//! Rules come from two sources, merged: inline YAML in the main config and
//! YAML files matched by the `*_path` globs. Every regex is compiled up
//! front; a single failure aborts the whole load so a broken rule can never
//! silently match nothing.

mod patterns;
mod suppression;

pub use patterns::{compile_patterns, compile_regex, load_patterns_glob, Entropies, Pattern};
pub use suppression::{
    compile_suppressions, filter_suppressed, load_suppressions_glob, Suppression,
};

use std::path::PathBuf;

use thiserror::Error;

use crate::config::Config;

/// A rule set that could not be loaded or compiled.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("cannot compile regex `{source_text}`: {reason}")]
    BadRegex {
        /// The regex source as written by the operator.
        source_text: String,
        reason: String,
    },

    #[error("bad rules glob `{glob}`: {reason}")]
    BadGlob { glob: String, reason: String },

    #[error("cannot read rules file `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse rules file `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// The complete, immutable rule snapshot workers evaluate diffs against.
///
/// Swapped as a whole on config reload; never mutated in place.
#[derive(Debug, Default)]
pub struct CompiledRules {
    pub patterns: Vec<Pattern>,
    pub filters: Vec<Pattern>,
    pub suppressions: Vec<Suppression>,
}

/// Compile every rule the configuration names, inline and from files.
///
/// # Errors
/// The first [`MatchError`] encountered; partial rule sets are never
/// produced.
pub fn compile_rules(config: &Config) -> Result<CompiledRules, MatchError> {
    let mut patterns = compile_patterns(&config.patterns)?;
    if !config.common.patterns_path.is_empty() {
        patterns.extend(load_patterns_glob(&config.common.patterns_path)?);
    }

    let mut filters = compile_patterns(&config.filters)?;
    if !config.common.filters_path.is_empty() {
        filters.extend(load_patterns_glob(&config.common.filters_path)?);
    }

    let mut suppressions = compile_suppressions(&config.suppressions)?;
    if !config.common.suppressions_path.is_empty() {
        suppressions.extend(load_suppressions_glob(&config.common.suppressions_path)?);
    }

    Ok(CompiledRules {
        patterns,
        filters,
        suppressions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PatternRule, SuppressionRule};
    use std::io::Write;

    #[test]
    fn compile_rules_merges_inline_and_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("extra.yml");
        let mut file = std::fs::File::create(&file_path).expect("create");
        writeln!(
            file,
            "- name: token\n  file: '*'\n  content: 'token='"
        )
        .expect("write");

        let mut config = Config::default();
        config.patterns.push(PatternRule {
            name: "pw".to_owned(),
            file: "*".to_owned(),
            content: "password=".to_owned(),
            entropies: None,
        });
        config.common.patterns_path = dir
            .path()
            .join("*.yml")
            .to_string_lossy()
            .into_owned();

        let rules = compile_rules(&config).expect("compiles");
        let names: Vec<&str> = rules.patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["pw", "token"]);
    }

    #[test]
    fn one_bad_regex_fails_the_whole_load() {
        let mut config = Config::default();
        config.patterns.push(PatternRule {
            name: "ok".to_owned(),
            file: "*".to_owned(),
            content: "fine".to_owned(),
            entropies: None,
        });
        config.suppressions.push(SuppressionRule {
            cve: "(unclosed".to_owned(),
            ..SuppressionRule::default()
        });
        assert!(matches!(
            compile_rules(&config),
            Err(MatchError::BadRegex { .. })
        ));
    }
}
