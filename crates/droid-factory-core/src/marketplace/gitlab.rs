//! GitLab scanner
//!
//! Uses the repository tree API. Skills are always found by probing,
//! since GitLab has no cheap whole-repository listing.

use serde::Deserialize;

use crate::error::{DroidFactoryError, Result};
use crate::http::{build_url, Auth};
use crate::marketplace::git_url::join_repo_path;
use crate::marketplace::scan::{
    kind_dir, list_flat, list_skills_by_probe, override_resources, Listing, ListingEntry,
    RemoteLister,
};
use crate::marketplace::types::{
    ComponentOverride, ComponentOverrides, GitLabSource, RemoteRepo, RemoteResource, ResourceKind,
    ScanResult,
};
use crate::session::Session;

/// Entries requested per tree page
const PER_PAGE: &str = "100";
/// Pages followed before a listing is cut short
const MAX_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
struct TreeItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

pub struct GitLabLister<'a> {
    source: &'a GitLabSource,
}

impl<'a> GitLabLister<'a> {
    pub fn new(source: &'a GitLabSource) -> Self {
        Self { source }
    }

    fn project_id(&self) -> String {
        format!("{}/{}", self.source.namespace_path, self.source.repo)
    }

    fn tree_url(&self, session: &Session, path: &str, recursive: bool, page: &str) -> Result<String> {
        let project = self.project_id();
        let mut query = vec![
            ("ref", self.source.git_ref.as_str()),
            ("per_page", PER_PAGE),
            ("page", page),
        ];
        if !path.is_empty() {
            query.insert(0, ("path", path));
        }
        if recursive {
            query.push(("recursive", "true"));
        }
        build_url(
            &session.endpoints.gitlab,
            &["api", "v4", "projects", project.as_str(), "repository", "tree"],
            &query,
        )
    }

    /// All pages of a tree listing; `Missing` on 404
    fn fetch_tree(
        &self,
        session: &mut Session,
        path: &str,
        recursive: bool,
    ) -> std::result::Result<Listing, String> {
        let mut items = Vec::new();
        let mut page = "1".to_string();

        for _ in 0..MAX_PAGES {
            let url = self
                .tree_url(session, path, recursive, &page)
                .map_err(|e| e.to_string())?;
            let response = session
                .http
                .get(&url, Auth::GitLab)
                .map_err(|e| e.to_string())?;

            if response.is_not_found() {
                return Ok(Listing::Missing);
            }
            if !response.is_success() {
                return Err(format!("HTTP {}", response.status));
            }

            let batch: Vec<TreeItem> = response.json().map_err(|e| e.to_string())?;
            items.extend(batch.into_iter().map(|item| ListingEntry {
                is_dir: item.kind == "tree",
                name: item.name,
                path: item.path,
            }));

            match response.header("x-next-page").map(str::trim) {
                Some(next) if !next.is_empty() => page = next.to_string(),
                _ => return Ok(Listing::Found(items)),
            }
        }

        tracing::warn!(project = %self.project_id(), path, "tree listing cut short after {} pages", MAX_PAGES);
        Ok(Listing::Found(items))
    }
}

impl RemoteLister for GitLabLister<'_> {
    fn label(&self) -> String {
        format!("{}@{}", self.project_id(), self.source.git_ref)
    }

    fn list_dir(&self, session: &mut Session, path: &str) -> std::result::Result<Listing, String> {
        self.fetch_tree(session, path, false)
    }

    fn resource(&self, session: &Session, path: &str) -> std::result::Result<RemoteResource, String> {
        let url = session
            .endpoints
            .gitlab_raw_url(
                &self.source.namespace_path,
                &self.source.repo,
                &self.source.git_ref,
                path,
            )
            .map_err(|e| e.to_string())?;
        Ok(RemoteResource {
            url,
            repo: RemoteRepo::from(self.source),
            path: join_repo_path(&[path]),
        })
    }
}

/// Enumerate a GitLab plugin's resources
pub fn scan_plugin_gitlab(
    session: &mut Session,
    source: &GitLabSource,
    overrides: &ComponentOverrides,
) -> ScanResult {
    let lister = GitLabLister::new(source);
    let mut result = ScanResult::default();

    for kind in ResourceKind::ALL {
        let resources = match overrides.get(kind) {
            Some(ComponentOverride::Files(files)) => {
                override_resources(&lister, session, &source.path, kind, files, &mut result.errors)
            }
            _ => {
                let dir = kind_dir(&source.path, kind, overrides);
                let listed = if kind.is_directory() {
                    let max = session.max_skill_probes;
                    list_skills_by_probe(&lister, session, &dir, max, &mut result.errors)
                } else {
                    list_flat(&lister, session, &dir, kind)
                };
                listed.unwrap_or_else(|e| {
                    result.errors.push(format!(
                        "{}: failed to list {}:{} ({})",
                        kind,
                        lister.label(),
                        dir,
                        e
                    ));
                    Vec::new()
                })
            }
        };
        result.set(kind, resources);
    }

    result
}

/// Every file below `dir` in a GitLab project, as repository paths
pub fn gitlab_files_under(session: &mut Session, source: &GitLabSource, dir: &str) -> Result<Vec<String>> {
    let lister = GitLabLister::new(source);
    let dir = join_repo_path(&[dir]);
    match lister.fetch_tree(session, &dir, true) {
        Ok(Listing::Found(entries)) => Ok(entries
            .into_iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.path)
            .collect()),
        Ok(Listing::Missing) => Ok(Vec::new()),
        Err(reason) => Err(DroidFactoryError::LoadFailed {
            location: format!("{}:{}", lister.label(), dir),
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Endpoints, HttpClient};
    use std::time::Duration;

    #[test]
    fn test_tree_url_encodes_project() {
        let http = HttpClient::new(Duration::from_secs(5), None, None).unwrap();
        let session = Session::new(http, Endpoints::all("https://gitlab.example.com"));
        let source = GitLabSource {
            namespace_path: "group/sub".into(),
            repo: "tools".into(),
            git_ref: "main".into(),
            path: "".into(),
        };
        let lister = GitLabLister::new(&source);
        assert_eq!(
            lister.tree_url(&session, "plugins/a", false, "2").unwrap(),
            "https://gitlab.example.com/api/v4/projects/group%2Fsub%2Ftools/repository/tree?path=plugins%2Fa&ref=main&per_page=100&page=2"
        );
        assert_eq!(lister.label(), "group/sub/tools@main");
    }
}
