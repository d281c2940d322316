//! Declared-dependency extraction from manifest diffs.
//!
//! Recognition is by file name only: unknown names are a silent skip (most
//! diffs are not manifests), while a recognized manifest that fails to
//! parse is logged and skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use super::worker::DiffAnalyzer;
use crate::model::{Dependency, Diff, Purl};

/// A recognized manifest that could not be parsed.
#[derive(Debug, Error)]
pub enum ManifestParseError {
    #[error("bad json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad toml: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A manifest format the parser understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestKind {
    /// npm `package-lock.json`, v1 (nested) and v2+ (`packages`) layouts.
    NpmLock,
    /// pip `requirements.txt` with exact `==` pins.
    PipRequirements,
    /// `Cargo.lock`.
    CargoLock,
}

/// One parsed `{ecosystem, name, version}` triple.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DepEntry {
    pub ecosystem: &'static str,
    pub name: String,
    pub version: String,
}

impl ManifestKind {
    /// Recognize a manifest by its file name.
    #[must_use]
    pub fn detect(file_path: &str) -> Option<Self> {
        let name = std::path::Path::new(file_path).file_name()?.to_str()?;
        match name {
            "package-lock.json" => Some(Self::NpmLock),
            "requirements.txt" => Some(Self::PipRequirements),
            "Cargo.lock" => Some(Self::CargoLock),
            _ => None,
        }
    }

    /// Extract every pinned dependency.
    ///
    /// # Errors
    /// [`ManifestParseError`] when the content is not valid for the format.
    pub fn parse(self, content: &str) -> Result<Vec<DepEntry>, ManifestParseError> {
        match self {
            Self::NpmLock => parse_npm_lock(content),
            Self::PipRequirements => Ok(parse_requirements(content)),
            Self::CargoLock => parse_cargo_lock(content),
        }
    }
}

// ---------------------------------------------------------------------------
// npm
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NpmLock {
    #[serde(default)]
    dependencies: BTreeMap<String, NpmDependency>,
    #[serde(default)]
    packages: BTreeMap<String, NpmPackage>,
}

#[derive(Deserialize)]
struct NpmDependency {
    #[serde(default)]
    version: String,
    #[serde(default)]
    dependencies: BTreeMap<String, NpmDependency>,
}

#[derive(Deserialize)]
struct NpmPackage {
    #[serde(default)]
    version: String,
}

fn parse_npm_lock(content: &str) -> Result<Vec<DepEntry>, ManifestParseError> {
    let lock: NpmLock = serde_json::from_str(content)?;
    let mut seen = std::collections::BTreeSet::new();

    fn walk(
        deps: &BTreeMap<String, NpmDependency>,
        seen: &mut std::collections::BTreeSet<(String, String)>,
    ) {
        for (name, dep) in deps {
            if !dep.version.is_empty() {
                seen.insert((name.clone(), dep.version.clone()));
            }
            walk(&dep.dependencies, seen);
        }
    }
    walk(&lock.dependencies, &mut seen);

    for (path, package) in &lock.packages {
        // v2 keys are installation paths; the empty key is the root project.
        let Some(idx) = path.rfind("node_modules/") else {
            continue;
        };
        let name = &path[idx + "node_modules/".len()..];
        if name.is_empty() || package.version.is_empty() {
            continue;
        }
        seen.insert((name.to_owned(), package.version.clone()));
    }

    Ok(seen
        .into_iter()
        .map(|(name, version)| DepEntry {
            ecosystem: "npm",
            name,
            version,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// pip
// ---------------------------------------------------------------------------

fn parse_requirements(content: &str) -> Vec<DepEntry> {
    let mut out = Vec::new();
    for raw_line in content.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, version)) = line.split_once("==") else {
            // Ranges and bare names have no single version to look up.
            continue;
        };
        // Strip extras ("requests[socks]") and environment markers.
        let name = name.split('[').next().unwrap_or(name).trim();
        let version = version.split(';').next().unwrap_or(version).trim();
        if name.is_empty() || version.is_empty() {
            continue;
        }
        out.push(DepEntry {
            ecosystem: "pypi",
            name: name.to_owned(),
            version: version.to_owned(),
        });
    }
    out
}

// ---------------------------------------------------------------------------
// cargo
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoPackage>,
}

#[derive(Deserialize)]
struct CargoPackage {
    name: String,
    version: String,
}

fn parse_cargo_lock(content: &str) -> Result<Vec<DepEntry>, ManifestParseError> {
    let lock: CargoLock = toml::from_str(content)?;
    Ok(lock
        .package
        .into_iter()
        .map(|p| DepEntry {
            ecosystem: "cargo",
            name: p.name,
            version: p.version,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub(crate) struct DepsAnalyzer {
    pub deps_tx: Sender<Dependency>,
}

impl DiffAnalyzer for DepsAnalyzer {
    fn analyze(&mut self, diff: &Arc<Diff>) {
        let Some(kind) = ManifestKind::detect(&diff.file_path) else {
            return;
        };
        match kind.parse(&diff.content) {
            Ok(entries) => {
                for entry in entries {
                    let dependency = Dependency {
                        purl: Purl {
                            ecosystem: entry.ecosystem.to_owned(),
                            name: entry.name,
                            version: entry.version,
                        },
                        diff: Arc::clone(diff),
                    };
                    if self.deps_tx.send(dependency).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(file = %diff.file_path, error = %err, "could not parse manifest");
            }
        }
    }
}
