//! JSON-lines file sink.
//!
//! One line per finding, appended; the files are created on first write.
//! Leaks and vulnerable dependencies go to separate files; an empty path
//! disables that finding type.

use std::fs::OpenOptions;
use std::io::Write;

use super::{Sink, SinkError};
use crate::model::Finding;

pub struct FileSink {
    leaks_file: String,
    vulnerabilities_file: String,
}

impl FileSink {
    #[must_use]
    pub fn new(leaks_file: &str, vulnerabilities_file: &str) -> Self {
        Self {
            leaks_file: leaks_file.to_owned(),
            vulnerabilities_file: vulnerabilities_file.to_owned(),
        }
    }

    fn append(path: &str, line: &str) -> Result<(), SinkError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn accepts(&self, finding: &Finding) -> bool {
        match finding {
            Finding::Leak(_) => !self.leaks_file.is_empty(),
            Finding::Exposure(_) => !self.vulnerabilities_file.is_empty(),
        }
    }

    fn send(&self, finding: Finding) -> Result<(), SinkError> {
        match finding {
            Finding::Leak(leak) => {
                let line = serde_json::to_string(&leak)
                    .map_err(|e| SinkError::Io(std::io::Error::other(e)))?;
                Self::append(&self.leaks_file, &line)
            }
            Finding::Exposure(dep) => {
                let line = serde_json::to_string(&dep)
                    .map_err(|e| SinkError::Io(std::io::Error::other(e)))?;
                Self::append(&self.vulnerabilities_file, &line)
            }
        }
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::Leak;

    fn leak() -> Leak {
        Leak {
            pattern_name: "pw".to_owned(),
            pattern_regex: "password=".to_owned(),
            file_path: "x.conf".to_owned(),
            repo_path: "org/repo".to_owned(),
            leak_string: "password=abc".to_owned(),
            repo_url: "https://example.com/org/repo".to_owned(),
            commit_hash: "c0ffee".to_owned(),
            timestamp: Utc::now(),
            line: 1,
            commit_author: "Alice".to_owned(),
            commit_email: "alice@example.com".to_owned(),
        }
    }

    #[test]
    fn appends_one_json_line_per_leak() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("leaks.json");
        let sink = FileSink::new(&path.to_string_lossy(), "");

        sink.send(Finding::Leak(leak())).expect("send");
        sink.send(Finding::Leak(leak())).expect("send");

        let contents = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("valid json");
        assert_eq!(parsed["leak"], "password=abc");
    }

    #[test]
    fn empty_path_rejects_the_type() {
        let sink = FileSink::new("", "/tmp/vulns.json");
        assert!(!sink.accepts(&Finding::Leak(leak())));
    }
}
