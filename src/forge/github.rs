//! GitHub repository listing (orgs, users).

use serde::Deserialize;

use super::ForgeError;
use crate::model::RepoLocation;

const API_BASE: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;

/// Lists repositories of organizations and users via the GitHub REST API.
pub struct GithubClient {
    token: String,
    work_dir: String,
    http: reqwest::blocking::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct GhRepo {
    html_url: String,
    clone_url: String,
    full_name: String,
}

impl GithubClient {
    /// # Errors
    /// [`ForgeError::Client`] when the HTTP client cannot be built.
    pub fn new(token: &str, work_dir: &str) -> Result<Self, ForgeError> {
        Ok(Self {
            token: token.to_owned(),
            work_dir: work_dir.to_owned(),
            http: super::blocking_client()?,
            api_base: API_BASE.to_owned(),
        })
    }

    /// Point at a different API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_owned();
        self
    }

    /// All repositories of an organization.
    ///
    /// # Errors
    /// [`ForgeError::Http`] on transport or non-2xx responses.
    pub fn org_repos(&self, org: &str) -> Result<Vec<RepoLocation>, ForgeError> {
        self.paginate(&format!("{}/orgs/{org}/repos", self.api_base))
    }

    /// All repositories of a user.
    ///
    /// # Errors
    /// [`ForgeError::Http`] on transport or non-2xx responses.
    pub fn user_repos(&self, user: &str) -> Result<Vec<RepoLocation>, ForgeError> {
        self.paginate(&format!("{}/users/{user}/repos", self.api_base))
    }

    /// Location of one explicitly named `owner/repo`.
    #[must_use]
    pub fn repo_location(&self, full_name: &str) -> RepoLocation {
        RepoLocation {
            url: format!("https://github.com/{full_name}"),
            clone_url: format!("https://github.com/{full_name}.git"),
            data_path: self.work_dir.clone(),
            repo_path: full_name.to_owned(),
        }
    }

    fn paginate(&self, url: &str) -> Result<Vec<RepoLocation>, ForgeError> {
        let mut out = Vec::new();
        for page in 1.. {
            let mut request = self
                .http
                .get(url)
                .query(&[
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .header("Accept", "application/vnd.github+json");
            if !self.token.is_empty() {
                request = request.bearer_auth(&self.token);
            }
            let repos: Vec<GhRepo> = request.send()?.error_for_status()?.json()?;
            if repos.is_empty() {
                break;
            }
            out.extend(repos.into_iter().map(|repo| RepoLocation {
                url: repo.html_url,
                clone_url: repo.clone_url,
                data_path: self.work_dir.clone(),
                repo_path: repo.full_name,
            }));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_repo_location() {
        let client = GithubClient::new("", "/srv/forge").expect("client");
        let location = client.repo_location("acme/widget");
        assert_eq!(location.url, "https://github.com/acme/widget");
        assert_eq!(location.clone_url, "https://github.com/acme/widget.git");
        assert_eq!(location.data_path, "/srv/forge");
        assert_eq!(location.repo_path, "acme/widget");
    }
}
