//! Inspector-driven repository discovery.
//!
//! Each configured inspector contributes repository locations; forge
//! listing errors are logged per source so one unreachable API never
//! empties the scan list of the others. De-duplication is by the full
//! location tuple, before anything reaches the repo list.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::path;
use crate::config::{Config, Inspect};
use crate::forge::{GithubClient, GitlabClient, GitlabFetchOptions};
use crate::model::{RepoLocation, RepoOptions};

pub(crate) fn discover(config: &Config) -> Vec<(RepoLocation, RepoOptions)> {
    let mut seen: HashSet<RepoLocation> = HashSet::new();
    let mut out = Vec::new();

    for inspect in &config.inspect {
        match inspect {
            Inspect::Path {
                paths,
                url,
                trim_prefix,
                trim_suffix,
            } => match path::expand(paths) {
                Ok(dirs) => {
                    for dir in dirs {
                        let location = path::location_for(&dir, url, trim_prefix, trim_suffix);
                        // On-disk sources are never cloned or fetched.
                        push_unique(&mut seen, &mut out, location, false);
                    }
                }
                Err(err) => warn!(error = %err, "cannot expand path inspector glob"),
            },

            Inspect::Github {
                token,
                work_dir,
                users,
                repos,
                orgs,
            } => match GithubClient::new(token, work_dir) {
                Ok(client) => {
                    for org in orgs {
                        debug!(org, "listing github organization");
                        match client.org_repos(org) {
                            Ok(locations) => {
                                for location in locations {
                                    push_unique(&mut seen, &mut out, location, true);
                                }
                            }
                            Err(err) => warn!(org, error = %err, "cannot list github repos"),
                        }
                    }
                    for user in users {
                        debug!(user, "listing github user");
                        match client.user_repos(user) {
                            Ok(locations) => {
                                for location in locations {
                                    push_unique(&mut seen, &mut out, location, true);
                                }
                            }
                            Err(err) => warn!(user, error = %err, "cannot list github repos"),
                        }
                    }
                    for full_name in repos {
                        let location = client.repo_location(full_name);
                        push_unique(&mut seen, &mut out, location, true);
                    }
                }
                Err(err) => warn!(error = %err, "cannot build github client"),
            },

            Inspect::Gitlab {
                token,
                work_dir,
                gitlab_url,
                gitlab_exclude_namespaces,
                gitlab_exclude_projects,
                gitlab_filter,
            } => match GitlabClient::new(gitlab_url, token, work_dir) {
                Ok(client) => {
                    let options = GitlabFetchOptions {
                        exclude_namespaces: gitlab_exclude_namespaces.clone(),
                        exclude_projects: gitlab_exclude_projects.clone(),
                        search: gitlab_filter.clone(),
                    };
                    match client.group_projects(&options) {
                        Ok(locations) => {
                            debug!(count = locations.len(), "gitlab projects listed");
                            for location in locations {
                                push_unique(&mut seen, &mut out, location, true);
                            }
                        }
                        Err(err) => warn!(error = %err, "cannot list gitlab projects"),
                    }
                }
                Err(err) => warn!(error = %err, "cannot build gitlab client"),
            },
        }
    }
    out
}

fn push_unique(
    seen: &mut HashSet<RepoLocation>,
    out: &mut Vec<(RepoLocation, RepoOptions)>,
    location: RepoLocation,
    allow_update: bool,
) {
    if seen.insert(location.clone()) {
        out.push((location, RepoOptions { allow_update }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_inspector_discovers_directories_without_updates() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("repo-a")).expect("mkdir");

        let mut config = Config::default();
        config.inspect.push(Inspect::Path {
            paths: vec![format!("{}/*", dir.path().display())],
            url: "https://example.com".to_owned(),
            trim_prefix: dir.path().display().to_string(),
            trim_suffix: String::new(),
        });

        let discovered = discover(&config);
        assert_eq!(discovered.len(), 1);
        let (location, options) = &discovered[0];
        assert_eq!(location.url, "https://example.com/repo-a");
        assert!(!options.allow_update);
    }

    #[test]
    fn duplicate_locations_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("repo-a")).expect("mkdir");

        let inspector = Inspect::Path {
            paths: vec![format!("{}/*", dir.path().display())],
            url: "https://example.com".to_owned(),
            trim_prefix: dir.path().display().to_string(),
            trim_suffix: String::new(),
        };
        let mut config = Config::default();
        config.inspect.push(inspector.clone());
        config.inspect.push(inspector);

        assert_eq!(discover(&config).len(), 1);
    }
}
