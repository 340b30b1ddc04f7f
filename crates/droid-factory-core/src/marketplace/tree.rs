//! GitHub recursive tree cache
//!
//! One `git/trees/{ref}?recursive=1` call per (owner, repo, ref) per
//! session. Failures are memoized too, so a broken ref costs one request.

use std::rc::Rc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::http::{build_url, path_segments, Auth};
use crate::marketplace::types::SKILL_MARKER;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }

    pub fn is_tree(&self) -> bool {
        self.kind == "tree"
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// Outcome of a tree lookup
#[derive(Debug, Clone)]
pub enum TreeLookup {
    Ready(Rc<[TreeEntry]>),
    /// 404 on the tree endpoint: the ref (or repository) does not exist
    RefNotFound,
    /// Any other failure, including truncated trees
    Unavailable(String),
}

pub fn tree_key(owner: &str, repo: &str, git_ref: &str) -> String {
    format!("{}/{}@{}", owner, repo, git_ref)
}

/// Fetch (or reuse) the full tree for `owner/repo@git_ref`
pub fn github_repo_tree(session: &mut Session, owner: &str, repo: &str, git_ref: &str) -> TreeLookup {
    let key = tree_key(owner, repo, git_ref);
    if let Some(cached) = session.trees.get(&key) {
        debug!(%key, "tree cache hit");
        return cached.clone();
    }

    debug!(%key, "tree cache miss");
    let lookup = fetch_tree(session, owner, repo, git_ref);
    session.trees.insert(key, lookup.clone());
    lookup
}

fn fetch_tree(session: &mut Session, owner: &str, repo: &str, git_ref: &str) -> TreeLookup {
    let mut segments = vec!["repos", owner, repo, "git", "trees"];
    segments.extend(path_segments(git_ref));
    let url = match build_url(
        &session.endpoints.github_api,
        &segments,
        &[("recursive", "1")],
    ) {
        Ok(url) => url,
        Err(e) => return TreeLookup::Unavailable(e.to_string()),
    };

    let response = match session.http.get(&url, Auth::GitHub) {
        Ok(r) => r,
        Err(e) => return TreeLookup::Unavailable(e.to_string()),
    };

    if response.is_not_found() {
        return TreeLookup::RefNotFound;
    }
    if !response.is_success() {
        return TreeLookup::Unavailable(format!("HTTP {} for {}", response.status, url));
    }

    match response.json::<TreeResponse>() {
        Ok(parsed) if parsed.truncated => {
            warn!(owner, repo, git_ref, "tree truncated, falling back to directory listing");
            TreeLookup::Unavailable("tree truncated".to_string())
        }
        Ok(parsed) => TreeLookup::Ready(parsed.tree.into()),
        Err(e) => TreeLookup::Unavailable(e.to_string()),
    }
}

/// Rest of `path` below `dir`, if `path` is inside it
fn strip_dir<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    if dir.is_empty() {
        return Some(path);
    }
    path.strip_prefix(dir)?.strip_prefix('/')
}

/// Blobs that are direct children of `dir` (not recursive)
pub fn direct_children<'a>(entries: &'a [TreeEntry], dir: &str) -> Vec<&'a TreeEntry> {
    entries
        .iter()
        .filter(|e| e.is_blob())
        .filter(|e| strip_dir(&e.path, dir).is_some_and(|rest| !rest.is_empty() && !rest.contains('/')))
        .collect()
}

/// Names of `<dir>/<name>/SKILL.md` directories, in tree order
pub fn skill_dirs(entries: &[TreeEntry], dir: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for entry in entries.iter().filter(|e| e.is_blob()) {
        let Some(rest) = strip_dir(&entry.path, dir) else {
            continue;
        };
        if let Some((name, file)) = rest.split_once('/') {
            if file == SKILL_MARKER && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Every blob below `dir`, recursively
pub fn files_under(entries: &[TreeEntry], dir: &str) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.is_blob())
        .filter(|e| strip_dir(&e.path, dir).is_some_and(|rest| !rest.is_empty()))
        .map(|e| e.path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<TreeEntry> {
        [
            ("plugins/demo/commands", "tree"),
            ("plugins/demo/commands/plan.md", "blob"),
            ("plugins/demo/commands/workflows/review.md", "blob"),
            ("plugins/demo/commands-extra/x.md", "blob"),
            ("plugins/demo/skills/frontend/SKILL.md", "blob"),
            ("plugins/demo/skills/frontend/assets/logo.svg", "blob"),
            ("plugins/demo/skills/lower/skill.md", "blob"),
            ("plugins/demo/skills/nested/sub/SKILL.md", "blob"),
            ("plugins/demo/skills/README.md", "blob"),
        ]
        .into_iter()
        .map(|(path, kind)| TreeEntry {
            path: path.to_string(),
            kind: kind.to_string(),
        })
        .collect()
    }

    #[test]
    fn test_direct_children_only() {
        let entries = entries();
        let children: Vec<_> = direct_children(&entries, "plugins/demo/commands")
            .into_iter()
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(children, vec!["plugins/demo/commands/plan.md"]);
    }

    #[test]
    fn test_skill_dirs_require_direct_marker() {
        let entries = entries();
        assert_eq!(skill_dirs(&entries, "plugins/demo/skills"), vec!["frontend"]);
    }

    #[test]
    fn test_files_under_is_recursive() {
        let entries = entries();
        assert_eq!(
            files_under(&entries, "plugins/demo/skills/frontend"),
            vec![
                "plugins/demo/skills/frontend/SKILL.md",
                "plugins/demo/skills/frontend/assets/logo.svg"
            ]
        );
    }

    #[test]
    fn test_root_dir() {
        let entries = vec![TreeEntry {
            path: "commands/a.md".into(),
            kind: "blob".into(),
        }];
        assert_eq!(direct_children(&entries, "commands").len(), 1);
        assert_eq!(files_under(&entries, "").len(), 1);
    }
}
