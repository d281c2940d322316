//! Service configuration (`config.yml`).
//!
//! Defines the typed YAML schema: common scanner settings, logging,
//! repository inspectors, leak patterns/filters, vulnerability
//! suppressions, and notification/metrics endpoints. Unknown fields are
//! tolerated so config files can gain fields without breaking older
//! binaries.
//!
//! Durations are strings in the `y/d/h/m/s` grammar (see
//! [`crate::duration`]); they are validated once at load time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A configuration that could not be read, parsed, or validated. Fatal at
/// startup; on reload the previous configuration stays in effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level service configuration, parsed from `config.yml`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub common: Common,

    #[serde(default)]
    pub logging: Logging,

    /// Repository discovery sources.
    #[serde(default)]
    pub inspect: Vec<Inspect>,

    /// Inline leak patterns, merged with `common.patterns_path` files.
    #[serde(default)]
    pub patterns: Vec<PatternRule>,

    /// Inline leak filters, merged with `common.filters_path` files.
    #[serde(default)]
    pub filters: Vec<PatternRule>,

    /// Inline vulnerability suppressions, merged with
    /// `common.suppressions_path` files.
    #[serde(default)]
    pub suppressions: Vec<SuppressionRule>,

    #[serde(default)]
    pub smtp: Smtp,

    #[serde(default)]
    pub webhook: Webhook,

    #[serde(default)]
    pub exposures: Exposures,

    #[serde(default)]
    pub metrics: Metrics,
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    /// [`ConfigError`] when the file is unreadable, not valid YAML, or
    /// fails validation (bad durations, scan interval below one second).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate durations and limits, caching the parsed values.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let history =
            parse_duration(&self.common.history_limit).map_err(|e| ConfigError::Invalid {
                field: "common.history_limit",
                reason: e.to_string(),
            })?;
        self.common.history_past_limit = Utc::now()
            - chrono::Duration::from_std(history).unwrap_or_else(|_| chrono::Duration::zero());

        let interval =
            parse_duration(&self.common.scan_interval).map_err(|e| ConfigError::Invalid {
                field: "common.scan_interval",
                reason: e.to_string(),
            })?;
        if interval < Duration::from_secs(1) {
            return Err(ConfigError::Invalid {
                field: "common.scan_interval",
                reason: "must be at least 1s".to_owned(),
            });
        }
        self.common.scan_interval_value = interval;

        let delay = parse_duration(&self.smtp.delay).map_err(|e| ConfigError::Invalid {
            field: "smtp.delay",
            reason: e.to_string(),
        })?;
        self.smtp.delay_value = if delay.is_zero() {
            Duration::from_secs(5 * 60)
        } else {
            delay
        };

        if self.metrics.is_enabled() {
            let send =
                parse_duration(&self.metrics.send_interval).map_err(|e| ConfigError::Invalid {
                    field: "metrics.send_interval",
                    reason: e.to_string(),
                })?;
            if send < Duration::from_secs(1) {
                return Err(ConfigError::Invalid {
                    field: "metrics.send_interval",
                    reason: "must be at least 1s".to_owned(),
                });
            }
            self.metrics.send_interval_value = send;
        }

        self.logging
            .level_filter()
            .map_err(|reason| ConfigError::Invalid {
                field: "logging.level",
                reason,
            })?;
        Ok(())
    }

    /// A starter configuration, printed by `--default-config`.
    #[must_use]
    pub fn default_skeleton() -> Self {
        Self {
            common: Common {
                state_file: "state.yml".to_owned(),
                history_limit: "1y".to_owned(),
                leaks_file: "leaks.json".to_owned(),
                vulnerabilities_file: "vulnerabilities.json".to_owned(),
                scan_interval: "1d".to_owned(),
                ..Common::default()
            },
            smtp: Smtp {
                delay: "5m".to_owned(),
                ..Smtp::default()
            },
            ..Self::default()
        }
    }

    /// Render as YAML (used by `--default-config`).
    ///
    /// # Errors
    /// Propagates serialization failures.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

/// Core scanner settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Common {
    /// Path of the durable scan-state file.
    #[serde(default)]
    pub state_file: String,

    /// Commits older than `now − history_limit` are treated as the initial
    /// commit of the remaining history.
    #[serde(default)]
    pub history_limit: String,

    /// JSON-lines file receiving every leak. Empty disables the file sink.
    #[serde(default)]
    pub leaks_file: String,

    /// JSON-lines file receiving every vulnerable dependency.
    #[serde(default)]
    pub vulnerabilities_file: String,

    /// Minimum pause between two scans of the same repository (≥ 1 s).
    #[serde(default)]
    pub scan_interval: String,

    /// Glob of YAML files with additional leak patterns.
    #[serde(default)]
    pub patterns_path: String,

    /// Glob of YAML files with additional leak filters.
    #[serde(default)]
    pub filters_path: String,

    /// Glob of YAML files with additional vulnerability suppressions.
    #[serde(default)]
    pub suppressions_path: String,

    /// Worker threads per analyzer stage. `0` means `NumCPU − 1` (min 1).
    #[serde(default)]
    pub workers: usize,

    #[serde(skip)]
    pub scan_interval_value: Duration,

    #[serde(skip, default = "default_past_limit")]
    pub history_past_limit: DateTime<Utc>,
}

impl Default for Common {
    fn default() -> Self {
        Self {
            state_file: String::new(),
            history_limit: String::new(),
            leaks_file: String::new(),
            vulnerabilities_file: String::new(),
            scan_interval: String::new(),
            patterns_path: String::new(),
            filters_path: String::new(),
            suppressions_path: String::new(),
            workers: 0,
            scan_interval_value: Duration::ZERO,
            history_past_limit: default_past_limit(),
        }
    }
}

fn default_past_limit() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

impl Common {
    /// Effective analyzer worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            num_cpus::get().saturating_sub(1).max(1)
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log level and optional rotating file output.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Logging {
    /// One of `debug`, `info`, `warn`, `error`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// When set, JSON logs go to this file with daily rotation; otherwise
    /// human-readable logs go to stdout.
    #[serde(default)]
    pub file: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Logging {
    /// Map the configured level onto a tracing directive.
    ///
    /// # Errors
    /// A human-readable reason when the level is unknown.
    pub fn level_filter(&self) -> Result<&'static str, String> {
        match self.level.as_str() {
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warn" => Ok("warn"),
            "error" => Ok("error"),
            other => Err(format!("unknown logging level '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Inspectors
// ---------------------------------------------------------------------------

/// A repository discovery source.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inspect {
    /// Repositories already on local disk, matched by glob. Entries
    /// prefixed with `!` exclude. Discovered repos are never fetched.
    Path {
        #[serde(default)]
        paths: Vec<String>,
        /// URL base used to derive each repo's identity URL.
        #[serde(default)]
        url: String,
        /// Prefix stripped from matched paths when deriving identity.
        #[serde(default)]
        trim_prefix: String,
        /// Suffix stripped from the URL path component (besides `.git`).
        #[serde(default)]
        trim_suffix: String,
    },

    /// Repositories listed from the GitHub API. Cloned/fetched on demand.
    Github {
        #[serde(default)]
        token: String,
        /// Local directory receiving the checkouts.
        #[serde(default)]
        work_dir: String,
        #[serde(default)]
        users: Vec<String>,
        #[serde(default)]
        repos: Vec<String>,
        #[serde(default)]
        orgs: Vec<String>,
    },

    /// Repositories found through a GitLab project search.
    Gitlab {
        #[serde(default)]
        token: String,
        #[serde(default)]
        work_dir: String,
        #[serde(default)]
        gitlab_url: String,
        #[serde(default)]
        gitlab_exclude_namespaces: Vec<String>,
        #[serde(default)]
        gitlab_exclude_projects: Vec<String>,
        #[serde(default)]
        gitlab_filter: String,
    },
}

// ---------------------------------------------------------------------------
// Patterns and suppressions
// ---------------------------------------------------------------------------

/// One leak pattern or filter. `file` and `content` are regexes; empty or
/// `"*"` matches anything.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PatternRule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub content: String,
    /// Optional entropy gate; a match must clear at least one configured
    /// threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropies: Option<EntropyRule>,
}

/// Minimum Shannon entropies for a pattern match to count. A zero
/// threshold is disabled.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct EntropyRule {
    #[serde(default)]
    pub word_min: f64,
    #[serde(default)]
    pub line_min: f64,
}

/// One vulnerability suppression: eight regexes that must all match for a
/// vulnerability to be dropped. Empty fields match anything.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SuppressionRule {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub dep_name: String,
    #[serde(default)]
    pub dep_version: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cve: String,
}

// ---------------------------------------------------------------------------
// Notification endpoints
// ---------------------------------------------------------------------------

/// Batched email notifications.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Smtp {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub mail_from: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Auditor recipients; comma-separated list accepted.
    #[serde(default)]
    pub recipient: String,
    /// Batch window before a notification email is sent (default 5 m).
    #[serde(default)]
    pub delay: String,
    /// Also send each author the findings attributed to them.
    #[serde(default)]
    pub sent_to_author: bool,
    /// When set, author recipients must match this regex.
    #[serde(default)]
    pub recipient_regex: String,

    #[serde(skip)]
    pub delay_value: Duration,
}

/// Per-finding HTTP webhook.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Webhook {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for Webhook {
    fn default() -> Self {
        Self {
            enable: false,
            method: default_webhook_method(),
            url: String::new(),
            headers: BTreeMap::new(),
        }
    }
}

fn default_webhook_method() -> String {
    "POST".to_owned()
}

/// Vulnerability catalog credentials.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Exposures {
    #[serde(default)]
    pub oss_index_user: String,
    #[serde(default)]
    pub oss_index_password: String,
}

/// Graphite counter export.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Metrics {
    #[serde(default)]
    pub graphite_address: String,
    #[serde(default)]
    pub prefix: String,
    /// Publish interval (≥ 1 s).
    #[serde(default)]
    pub send_interval: String,

    #[serde(skip)]
    pub send_interval_value: Duration,
}

impl Metrics {
    /// Metrics are published only when both address and prefix are set.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.graphite_address.is_empty() && !self.prefix.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r"
common:
  state_file: state.yml
  scan_interval: 1h
  history_limit: 1y
  leaks_file: leaks.json
patterns:
  - name: pw
    file: '*'
    content: 'password='
inspect:
  - type: path
    url: https://example.com
    paths:
      - /srv/repos/*
"
    }

    fn load_str(yaml: &str) -> Result<Config, ConfigError> {
        let mut config: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn minimal_config_loads() {
        let config = load_str(minimal_yaml()).expect("valid config");
        assert_eq!(config.common.state_file, "state.yml");
        assert_eq!(config.common.scan_interval_value, Duration::from_secs(3600));
        assert_eq!(config.patterns.len(), 1);
        assert!(matches!(config.inspect[0], Inspect::Path { .. }));
    }

    #[test]
    fn scan_interval_below_one_second_is_rejected() {
        let err = load_str("common:\n  scan_interval: ''\n").expect_err("must fail");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "common.scan_interval",
                ..
            }
        ));
    }

    #[test]
    fn unknown_logging_level_is_rejected() {
        let err =
            load_str("common:\n  scan_interval: 1m\nlogging:\n  level: verbose\n").expect_err("must fail");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "logging.level",
                ..
            }
        ));
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let config =
            load_str("common:\n  scan_interval: 1m\n  some_future_knob: true\n").expect("valid config");
        assert_eq!(config.common.scan_interval_value, Duration::from_secs(60));
    }

    #[test]
    fn smtp_delay_defaults_to_five_minutes() {
        let config = load_str("common:\n  scan_interval: 1m\n").expect("valid config");
        assert_eq!(config.smtp.delay_value, Duration::from_secs(300));
    }

    #[test]
    fn workers_zero_means_cpu_derived() {
        let config = load_str("common:\n  scan_interval: 1m\n").expect("valid config");
        assert!(config.common.worker_count() >= 1);

        let explicit =
            load_str("common:\n  scan_interval: 1m\n  workers: 7\n").expect("valid config");
        assert_eq!(explicit.common.worker_count(), 7);
    }

    #[test]
    fn default_skeleton_round_trips() {
        let yaml = Config::default_skeleton().to_yaml().expect("serializes");
        let mut parsed: Config = serde_yaml::from_str(&yaml).expect("parses");
        parsed.validate().expect("validates");
        assert_eq!(parsed.common.history_limit, "1y");
        assert_eq!(parsed.smtp.delay, "5m");
    }

    #[test]
    fn inspect_github_fields() {
        let config = load_str(
            r"
common:
  scan_interval: 1m
inspect:
  - type: github
    token: t0ken
    work_dir: /srv/forge
    orgs: [acme]
    repos: [acme/widget]
",
        )
        .expect("valid config");
        match &config.inspect[0] {
            Inspect::Github {
                token,
                work_dir,
                orgs,
                repos,
                ..
            } => {
                assert_eq!(token, "t0ken");
                assert_eq!(work_dir, "/srv/forge");
                assert_eq!(orgs, &["acme"]);
                assert_eq!(repos, &["acme/widget"]);
            }
            other => panic!("expected github inspector, got {other:?}"),
        }
    }
}
