//! Leak pattern and filter compilation.

use std::path::Path;

use regex::Regex;

use super::MatchError;
use crate::config::PatternRule;

/// A compiled leak pattern (or filter — same shape, inverse effect).
#[derive(Debug)]
pub struct Pattern {
    pub name: String,
    /// Matched against `repo_url + "/" + file_path`.
    pub file_re: Regex,
    /// Matched against each added line.
    pub content_re: Regex,
    /// Optional entropy gate.
    pub entropies: Option<Entropies>,
}

/// Minimum entropies a matching line must clear. A zero threshold is
/// disabled; with both disabled the gate is inert.
#[derive(Clone, Copy, Debug)]
pub struct Entropies {
    pub word_min: f64,
    pub line_min: f64,
}

/// Compile one regex source. Empty or `"*"` compiles to the universal
/// match.
///
/// # Errors
/// [`MatchError::BadRegex`] carrying the operator's source text.
pub fn compile_regex(source: &str) -> Result<Regex, MatchError> {
    let effective = if source.is_empty() || source == "*" {
        ".*"
    } else {
        source
    };
    Regex::new(effective).map_err(|e| MatchError::BadRegex {
        source_text: source.to_owned(),
        reason: e.to_string(),
    })
}

/// Compile a list of configured rules.
///
/// # Errors
/// The first regex that fails to compile.
pub fn compile_patterns(rules: &[PatternRule]) -> Result<Vec<Pattern>, MatchError> {
    rules
        .iter()
        .map(|rule| {
            Ok(Pattern {
                name: rule.name.clone(),
                file_re: compile_regex(&rule.file)?,
                content_re: compile_regex(&rule.content)?,
                entropies: rule.entropies.map(|e| Entropies {
                    word_min: e.word_min,
                    line_min: e.line_min,
                }),
            })
        })
        .collect()
}

/// Load and compile every YAML file matched by `glob_pattern`. Each file is
/// a YAML sequence of pattern rules.
///
/// # Errors
/// Glob, I/O, YAML, or regex failures — the load is all-or-nothing.
pub fn load_patterns_glob(glob_pattern: &str) -> Result<Vec<Pattern>, MatchError> {
    let entries = glob::glob(glob_pattern).map_err(|e| MatchError::BadGlob {
        glob: glob_pattern.to_owned(),
        reason: e.to_string(),
    })?;
    let mut out = Vec::new();
    for entry in entries.flatten() {
        out.extend(load_patterns_file(&entry)?);
    }
    Ok(out)
}

fn load_patterns_file(path: &Path) -> Result<Vec<Pattern>, MatchError> {
    let raw = std::fs::read_to_string(path).map_err(|source| MatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rules: Vec<PatternRule> =
        serde_yaml::from_str(&raw).map_err(|source| MatchError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    compile_patterns(&rules)
}
