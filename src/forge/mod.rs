//! Hosted-forge catalog clients.
//!
//! Thin, blocking REST clients that turn an organization, user, or project
//! search into a list of [`RepoLocation`](crate::model::RepoLocation)s for
//! the scan manager. Pagination is followed to exhaustion; everything else
//! (cloning, scanning) happens elsewhere.

pub mod github;
pub mod gitlab;

pub use github::GithubClient;
pub use gitlab::{GitlabClient, GitlabFetchOptions};

use thiserror::Error;

/// A catalog listing that failed. Per-source: discovery logs the error and
/// keeps the repositories it already knows.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cannot build http client: {reason}")]
    Client { reason: String },
}

pub(crate) fn blocking_client() -> Result<reqwest::blocking::Client, ForgeError> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("leakhound/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| ForgeError::Client {
            reason: e.to_string(),
        })
}
