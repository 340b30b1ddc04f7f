//! GitHub / GitLab repository URL parsing

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::http::path_segments;

static SCP_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+@([A-Za-z0-9_.-]+):(.+)$").expect("valid regex"));

static SHORTHAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("valid regex"));

/// `owner/repo`
pub fn is_github_shorthand(input: &str) -> bool {
    SHORTHAND.is_match(input)
}

/// A repository URL with optional `/tree/<ref>/<path>` suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoUrl {
    GitHub {
        owner: String,
        repo: String,
        git_ref: Option<String>,
        path: Option<String>,
    },
    GitLab {
        namespace_path: String,
        repo: String,
        git_ref: Option<String>,
        path: Option<String>,
    },
}

/// Parse an https, ssh or scp-style (`git@host:owner/repo.git`) URL
/// pointing at github.com or gitlab.com. Other hosts yield `None`.
pub fn parse_repo_url(input: &str) -> Option<RepoUrl> {
    let input = input.trim();
    let (host, path) = if let Some(caps) = SCP_URL.captures(input) {
        (caps[1].to_ascii_lowercase(), caps[2].to_string())
    } else {
        let url = Url::parse(input).ok()?;
        (url.host_str()?.to_ascii_lowercase(), url.path().to_string())
    };
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    let segments = path_segments(&path);

    match host.as_str() {
        "github.com" => parse_github_segments(&segments),
        "gitlab.com" => parse_gitlab_segments(&segments),
        _ => None,
    }
}

fn parse_github_segments(segments: &[&str]) -> Option<RepoUrl> {
    if segments.len() < 2 {
        return None;
    }
    let owner = segments[0].to_string();
    let repo = strip_git_suffix(segments[1]);
    if repo.is_empty() {
        return None;
    }

    let (git_ref, path) = match segments.get(2) {
        Some(&"tree") | Some(&"blob") | Some(&"raw") => split_ref_path(&segments[3..]),
        _ => (None, None),
    };

    Some(RepoUrl::GitHub {
        owner,
        repo,
        git_ref,
        path,
    })
}

fn parse_gitlab_segments(segments: &[&str]) -> Option<RepoUrl> {
    let dash = segments.iter().position(|s| *s == "-");
    let project = &segments[..dash.unwrap_or(segments.len())];
    if project.len() < 2 {
        return None;
    }

    let repo = strip_git_suffix(project[project.len() - 1]);
    let namespace_path = project[..project.len() - 1].join("/");

    let (git_ref, path) = match dash {
        Some(i) => match segments.get(i + 1) {
            Some(&"tree") | Some(&"blob") | Some(&"raw") => split_ref_path(&segments[i + 2..]),
            _ => (None, None),
        },
        None => (None, None),
    };

    Some(RepoUrl::GitLab {
        namespace_path,
        repo,
        git_ref,
        path,
    })
}

fn split_ref_path(rest: &[&str]) -> (Option<String>, Option<String>) {
    match rest.split_first() {
        Some((git_ref, path)) => {
            let path = (!path.is_empty()).then(|| path.join("/"));
            (Some(git_ref.to_string()), path)
        }
        None => (None, None),
    }
}

fn strip_git_suffix(repo: &str) -> String {
    repo.strip_suffix(".git").unwrap_or(repo).to_string()
}

/// Normalize slash paths: drops empty and `.` segments, resolves `..`
/// without climbing above the root.
pub fn join_repo_path(parts: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in parts {
        for segment in part.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    out.pop();
                }
                s => out.push(s),
            }
        }
    }
    out.join("/")
}
