//! Sonatype OSS Index batch lookups.
//!
//! One `component-report` POST per dependency batch; basic auth raises the
//! anonymous rate limit when credentials are configured. The catalog is a
//! label on the resulting vulnerabilities, not a coupling — swapping the
//! endpoint swaps the source.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_ENDPOINT: &str = "https://ossindex.sonatype.org/api/v3/component-report";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A catalog lookup that failed. Per-batch: the caller logs it and drops
/// the whole batch — there is no finding to emit.
#[derive(Debug, Error)]
#[error("vulnerability lookup failed: {0}")]
pub struct LookupError(#[from] reqwest::Error);

/// Blocking OSS Index client.
pub struct OssIndexClient {
    user: String,
    password: String,
    endpoint: String,
    http: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ReportRequest<'a> {
    coordinates: &'a [String],
}

/// One catalog report: the queried coordinate plus its known
/// vulnerabilities.
#[derive(Debug, Deserialize)]
pub struct ComponentReport {
    pub coordinates: String,
    #[serde(default)]
    pub vulnerabilities: Vec<OssVulnerability>,
}

/// Catalog entry as returned by the API.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OssVulnerability {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cvss_score: f32,
    #[serde(default)]
    pub cvss_vector: String,
    #[serde(default)]
    pub cwe: String,
    #[serde(default)]
    pub cve: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub version_ranges: Vec<String>,
}

impl OssIndexClient {
    #[must_use]
    pub fn new(user: &str, password: &str) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            user: user.to_owned(),
            password: password.to_owned(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            http,
        }
    }

    /// Point at a different catalog endpoint (tests, mirrors).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_owned();
        self
    }

    /// Fetch reports for a batch of PURL coordinates.
    ///
    /// # Errors
    /// [`LookupError`] on transport failure or a non-2xx response.
    pub fn component_reports(
        &self,
        coordinates: &[String],
    ) -> Result<Vec<ComponentReport>, LookupError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&ReportRequest { coordinates });
        if !self.user.is_empty() {
            request = request.basic_auth(&self.user, Some(&self.password));
        }
        Ok(request.send()?.error_for_status()?.json()?)
    }
}
