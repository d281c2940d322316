//! GitLab project search.

use serde::Deserialize;

use super::ForgeError;
use crate::model::RepoLocation;

const PER_PAGE: u32 = 100;

/// Lists group projects of a GitLab instance.
pub struct GitlabClient {
    base_url: String,
    token: String,
    work_dir: String,
    http: reqwest::blocking::Client,
}

/// Filters applied while listing projects.
#[derive(Clone, Debug, Default)]
pub struct GitlabFetchOptions {
    /// Namespace names to skip entirely.
    pub exclude_namespaces: Vec<String>,
    /// `namespace/project` paths to skip.
    pub exclude_projects: Vec<String>,
    /// Server-side project search string.
    pub search: String,
}

#[derive(Debug, Deserialize)]
struct GlProject {
    ssh_url_to_repo: String,
    web_url: String,
    path_with_namespace: String,
    namespace: GlNamespace,
}

#[derive(Debug, Deserialize)]
struct GlNamespace {
    name: String,
    kind: String,
}

impl GitlabClient {
    /// # Errors
    /// [`ForgeError::Client`] when the HTTP client cannot be built.
    pub fn new(base_url: &str, token: &str, work_dir: &str) -> Result<Self, ForgeError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
            work_dir: work_dir.to_owned(),
            http: super::blocking_client()?,
        })
    }

    /// All group projects visible to the token, minus the excluded
    /// namespaces and projects.
    ///
    /// # Errors
    /// [`ForgeError::Http`] on transport or non-2xx responses.
    pub fn group_projects(
        &self,
        options: &GitlabFetchOptions,
    ) -> Result<Vec<RepoLocation>, ForgeError> {
        let url = format!("{}/api/v4/projects", self.base_url);
        let mut out = Vec::new();
        for page in 1.. {
            let mut query = vec![
                ("simple".to_owned(), "true".to_owned()),
                ("per_page".to_owned(), PER_PAGE.to_string()),
                ("page".to_owned(), page.to_string()),
            ];
            if !options.search.is_empty() {
                query.push(("search".to_owned(), options.search.clone()));
            }
            let mut request = self.http.get(&url).query(&query);
            if !self.token.is_empty() {
                request = request.header("PRIVATE-TOKEN", &self.token);
            }
            let projects: Vec<GlProject> = request.send()?.error_for_status()?.json()?;
            if projects.is_empty() {
                break;
            }
            for project in projects {
                if project.namespace.kind != "group" {
                    continue;
                }
                if options
                    .exclude_namespaces
                    .iter()
                    .any(|n| n == &project.namespace.name)
                {
                    continue;
                }
                if options
                    .exclude_projects
                    .iter()
                    .any(|p| p == &project.path_with_namespace)
                {
                    continue;
                }
                out.push(RepoLocation {
                    url: project.web_url,
                    clone_url: project.ssh_url_to_repo,
                    data_path: self.work_dir.clone(),
                    repo_path: project.path_with_namespace,
                });
            }
        }
        Ok(out)
    }
}
