//! GitHub scanner
//!
//! Listings come from the cached recursive tree when it is available and
//! from the contents API otherwise.

use serde::Deserialize;
use tracing::debug;

use crate::error::{DroidFactoryError, Result};
use crate::http::{build_url, path_segments, Auth};
use crate::marketplace::git_url::join_repo_path;
use crate::marketplace::scan::{
    kind_dir, list_flat, list_skills_by_probe, override_resources, Listing, ListingEntry,
    RemoteLister,
};
use crate::marketplace::tree::{
    direct_children, files_under, github_repo_tree, skill_dirs, tree_key, TreeEntry, TreeLookup,
};
use crate::marketplace::types::{
    ComponentOverride, ComponentOverrides, DiscoveredResource, GitHubSource, Locator, RemoteRepo,
    RemoteResource, ResourceKind, ScanResult,
};
use crate::session::Session;

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Contents-API access to one repository at one ref
pub struct GitHubLister<'a> {
    source: &'a GitHubSource,
}

impl<'a> GitHubLister<'a> {
    pub fn new(source: &'a GitHubSource) -> Self {
        Self { source }
    }

    fn contents_url(&self, session: &Session, path: &str) -> Result<String> {
        let mut segments = vec!["repos", self.source.owner.as_str(), self.source.repo.as_str(), "contents"];
        segments.extend(path_segments(path));
        build_url(
            &session.endpoints.github_api,
            &segments,
            &[("ref", self.source.git_ref.as_str())],
        )
    }
}

impl RemoteLister for GitHubLister<'_> {
    fn label(&self) -> String {
        tree_key(&self.source.owner, &self.source.repo, &self.source.git_ref)
    }

    fn list_dir(&self, session: &mut Session, path: &str) -> std::result::Result<Listing, String> {
        let url = self.contents_url(session, path).map_err(|e| e.to_string())?;
        let response = session
            .http
            .get(&url, Auth::GitHub)
            .map_err(|e| e.to_string())?;

        if response.is_not_found() {
            return Ok(Listing::Missing);
        }
        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }

        // A file path returns an object instead of an array
        let value: serde_json::Value = response.json().map_err(|e| e.to_string())?;
        if !value.is_array() {
            return Ok(Listing::Found(Vec::new()));
        }
        let entries: Vec<ContentsEntry> = serde_json::from_value(value).map_err(|e| e.to_string())?;

        Ok(Listing::Found(
            entries
                .into_iter()
                .map(|e| ListingEntry {
                    is_dir: e.kind == "dir",
                    name: e.name,
                    path: e.path,
                })
                .collect(),
        ))
    }

    fn resource(&self, session: &Session, path: &str) -> std::result::Result<RemoteResource, String> {
        let url = session
            .endpoints
            .github_raw_url(&self.source.owner, &self.source.repo, &self.source.git_ref, path)
            .map_err(|e| e.to_string())?;
        Ok(RemoteResource {
            url,
            repo: RemoteRepo::from(self.source),
            path: join_repo_path(&[path]),
        })
    }
}

/// Enumerate a GitHub plugin's resources
pub fn scan_plugin_github(
    session: &mut Session,
    source: &GitHubSource,
    overrides: &ComponentOverrides,
) -> ScanResult {
    let lister = GitHubLister::new(source);
    let mut result = ScanResult::default();

    if overrides.all_explicit() {
        for kind in ResourceKind::ALL {
            if let Some(ComponentOverride::Files(files)) = overrides.get(kind) {
                let resources =
                    override_resources(&lister, session, &source.path, kind, files, &mut result.errors);
                result.set(kind, resources);
            }
        }
        return result;
    }

    let tree = github_repo_tree(session, &source.owner, &source.repo, &source.git_ref);
    match &tree {
        TreeLookup::RefNotFound => {
            result.errors.push(
                DroidFactoryError::RefNotFound {
                    repo: lister.label(),
                }
                .to_string(),
            );
            return result;
        }
        TreeLookup::Unavailable(reason) => {
            debug!(repo = %lister.label(), %reason, "tree unavailable, using contents API");
        }
        TreeLookup::Ready(_) => {}
    }

    for kind in ResourceKind::ALL {
        let resources = match overrides.get(kind) {
            Some(ComponentOverride::Files(files)) => {
                override_resources(&lister, session, &source.path, kind, files, &mut result.errors)
            }
            _ => {
                let dir = kind_dir(&source.path, kind, overrides);
                let listed = match &tree {
                    TreeLookup::Ready(entries) => from_tree(&lister, session, entries, &dir, kind),
                    _ if kind.is_directory() => {
                        let max = session.max_skill_probes;
                        list_skills_by_probe(&lister, session, &dir, max, &mut result.errors)
                    }
                    _ => list_flat(&lister, session, &dir, kind),
                };
                match listed {
                    Ok(resources) => resources,
                    Err(e) => {
                        result.errors.push(format!(
                            "{}: failed to list {}:{} ({})",
                            kind,
                            lister.label(),
                            dir,
                            e
                        ));
                        Vec::new()
                    }
                }
            }
        };
        result.set(kind, resources);
    }

    result
}

fn from_tree(
    lister: &GitHubLister<'_>,
    session: &Session,
    entries: &[TreeEntry],
    dir: &str,
    kind: ResourceKind,
) -> std::result::Result<Vec<DiscoveredResource>, String> {
    let mut resources = Vec::new();
    if kind.is_directory() {
        for name in skill_dirs(entries, dir) {
            let remote = lister.resource(session, &join_repo_path(&[dir, &name]))?;
            resources.push(DiscoveredResource {
                locator: Locator::Remote(remote),
                rel_path: name,
            });
        }
    } else {
        for entry in direct_children(entries, dir) {
            let name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
            if !kind.accepts_file(name) {
                continue;
            }
            let remote = lister.resource(session, &entry.path)?;
            resources.push(DiscoveredResource {
                locator: Locator::Remote(remote),
                rel_path: name.to_string(),
            });
        }
    }
    Ok(resources)
}

/// Every file below `dir` in a GitHub repository, as repository paths.
///
/// Uses the cached tree, or walks the contents API when the tree is not
/// available.
pub fn github_files_under(session: &mut Session, source: &GitHubSource, dir: &str) -> Result<Vec<String>> {
    match github_repo_tree(session, &source.owner, &source.repo, &source.git_ref) {
        TreeLookup::Ready(entries) => Ok(files_under(&entries, dir)),
        TreeLookup::RefNotFound => Err(DroidFactoryError::RefNotFound {
            repo: tree_key(&source.owner, &source.repo, &source.git_ref),
        }),
        TreeLookup::Unavailable(_) => {
            let lister = GitHubLister::new(source);
            let mut files = Vec::new();
            let mut pending = vec![join_repo_path(&[dir])];
            while let Some(current) = pending.pop() {
                let listing = lister
                    .list_dir(session, &current)
                    .map_err(|reason| DroidFactoryError::LoadFailed {
                        location: format!("{}:{}", lister.label(), current),
                        reason,
                    })?;
                if let Listing::Found(entries) = listing {
                    for entry in entries {
                        if entry.is_dir {
                            pending.push(entry.path);
                        } else {
                            files.push(entry.path);
                        }
                    }
                }
            }
            files.sort();
            Ok(files)
        }
    }
}
