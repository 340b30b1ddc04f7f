//! Marketplace location and loading
//!
//! Classifies the user's marketplace argument and fetches the manifest,
//! producing the [`MarketplaceContext`] later used to resolve relative
//! plugin sources.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{DroidFactoryError, Result};
use crate::http::{is_url, path_segments, Auth};
use crate::marketplace::git_url::{is_github_shorthand, join_repo_path, parse_repo_url, RepoUrl};
use crate::marketplace::types::{MarketplaceContext, MARKETPLACE_FILE, PLUGIN_DIR};
use crate::session::Session;

/// Refs tried, in order, when none is given
pub const FALLBACK_REFS: [&str; 2] = ["main", "master"];

const GITHUB_RAW_HOST: &str = "raw.githubusercontent.com";

/// What kind of marketplace argument was given
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketplaceLocator {
    /// Directory holding `.claude-plugin/marketplace.json`, or the file itself
    Local(PathBuf),
    /// `owner/repo`
    GitHubShorthand { owner: String, repo: String },
    /// Direct raw-content URL of a GitHub-hosted manifest
    GitHubRaw {
        url: String,
        owner: String,
        repo: String,
        git_ref: String,
        base_path: String,
    },
    GitHubRepo {
        owner: String,
        repo: String,
        git_ref: Option<String>,
        path: String,
    },
    GitLabRepo {
        namespace_path: String,
        repo: String,
        git_ref: Option<String>,
        path: String,
    },
    /// Any other manifest URL
    Url(String),
}

impl MarketplaceLocator {
    /// Classify `input`.
    ///
    /// URLs are checked against the configured GitHub raw endpoint, then
    /// github.com / gitlab.com repository shapes. Bare `owner/repo` is GitHub
    /// shorthand even when a directory of that name exists; write `./owner/repo`
    /// to load it. Anything else is a local path.
    pub fn classify(input: &str, github_raw: &str) -> Self {
        let trimmed = input.trim();
        let as_path = Path::new(trimmed);

        if is_url(trimmed) {
            if let Some(raw) = parse_github_raw(trimmed, github_raw) {
                return raw;
            }
            return match parse_repo_url(trimmed) {
                Some(RepoUrl::GitHub {
                    owner,
                    repo,
                    git_ref,
                    path,
                }) => Self::GitHubRepo {
                    owner,
                    repo,
                    git_ref,
                    path: path.unwrap_or_default(),
                },
                Some(RepoUrl::GitLab {
                    namespace_path,
                    repo,
                    git_ref,
                    path,
                }) => Self::GitLabRepo {
                    namespace_path,
                    repo,
                    git_ref,
                    path: path.unwrap_or_default(),
                },
                None => Self::Url(trimmed.to_string()),
            };
        }

        if !trimmed.starts_with('.') && is_github_shorthand(trimmed) {
            if let Some((owner, repo)) = trimmed.split_once('/') {
                return Self::GitHubShorthand {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                };
            }
        }

        Self::Local(as_path.to_path_buf())
    }
}

/// `https://raw.githubusercontent.com/{owner}/{repo}/{ref}/{path...}`
fn parse_github_raw(input: &str, github_raw: &str) -> Option<MarketplaceLocator> {
    let url = Url::parse(input).ok()?;
    let configured = Url::parse(github_raw).ok();

    let rest = if url.host_str() == Some(GITHUB_RAW_HOST) {
        url.path().to_string()
    } else {
        let base = configured?;
        if url.host_str() != base.host_str() || url.port_or_known_default() != base.port_or_known_default() {
            return None;
        }
        url.path()
            .strip_prefix(base.path().trim_end_matches('/'))?
            .to_string()
    };

    let segments = path_segments(&rest);
    if segments.len() < 4 {
        return None;
    }
    let manifest_dir = &segments[3..segments.len() - 1];

    Some(MarketplaceLocator::GitHubRaw {
        url: input.to_string(),
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        git_ref: segments[2].to_string(),
        base_path: marketplace_root(&manifest_dir.join("/")),
    })
}

/// Marketplace root for a manifest directory: the parent of `.claude-plugin`
fn marketplace_root(manifest_dir: &str) -> String {
    let dir = join_repo_path(&[manifest_dir]);
    if dir == PLUGIN_DIR {
        return String::new();
    }
    dir.strip_suffix(&format!("/{}", PLUGIN_DIR))
        .map(str::to_string)
        .unwrap_or(dir)
}

/// A loaded manifest and where it came from
#[derive(Debug, Clone)]
pub struct LoadedMarketplace {
    pub json: Value,
    pub context: MarketplaceContext,
    /// Path or URL the manifest was read from
    pub location: String,
}

impl LoadedMarketplace {
    /// `name` field of the manifest, if present
    pub fn name(&self) -> Option<&str> {
        self.json.get("name").and_then(Value::as_str)
    }
}

/// Locate, fetch and parse a marketplace manifest.
///
/// `git_ref` overrides any ref embedded in the input; without one,
/// repository inputs try `main` then `master`.
pub fn load_marketplace(
    session: &mut Session,
    input: &str,
    git_ref: Option<&str>,
) -> Result<LoadedMarketplace> {
    let locator = MarketplaceLocator::classify(input, &session.endpoints.github_raw);
    debug!(?locator, "classified marketplace input");

    match locator {
        MarketplaceLocator::Local(path) => load_local(&path),
        MarketplaceLocator::GitHubShorthand { owner, repo } => {
            load_github(session, owner, repo, git_ref.map(str::to_string), String::new())
        }
        MarketplaceLocator::GitHubRepo {
            owner,
            repo,
            git_ref: url_ref,
            path,
        } => load_github(session, owner, repo, git_ref.map(str::to_string).or(url_ref), path),
        MarketplaceLocator::GitHubRaw {
            url,
            owner,
            repo,
            git_ref,
            base_path,
        } => {
            let json = fetch_manifest(session, &url, Auth::GitHub)?;
            Ok(LoadedMarketplace {
                json,
                context: MarketplaceContext::GitHub {
                    owner,
                    repo,
                    git_ref,
                    base_path,
                },
                location: url,
            })
        }
        MarketplaceLocator::GitLabRepo {
            namespace_path,
            repo,
            git_ref: url_ref,
            path,
        } => {
            let refs = refs_to_try(git_ref.map(str::to_string).or(url_ref));
            let manifest = join_repo_path(&[&path, MARKETPLACE_FILE]);
            try_refs(session, &refs, Auth::GitLab, |endpoints, r| {
                endpoints.gitlab_raw_url(&namespace_path, &repo, r, &manifest)
            })
            .map(|(json, used_ref, location)| LoadedMarketplace {
                json,
                context: MarketplaceContext::GitLab {
                    namespace_path: namespace_path.clone(),
                    repo: repo.clone(),
                    git_ref: used_ref,
                    base_path: path.clone(),
                },
                location,
            })
        }
        MarketplaceLocator::Url(url) => {
            let json = fetch_manifest(session, &url, Auth::None)?;
            let base_url = url
                .rsplit_once('/')
                .map(|(base, _)| base.to_string())
                .unwrap_or_else(|| url.clone());
            Ok(LoadedMarketplace {
                json,
                context: MarketplaceContext::Url { base_url },
                location: url,
            })
        }
    }
}

fn refs_to_try(explicit: Option<String>) -> Vec<String> {
    match explicit {
        Some(r) => vec![r],
        None => FALLBACK_REFS.iter().map(|r| r.to_string()).collect(),
    }
}

fn load_github(
    session: &mut Session,
    owner: String,
    repo: String,
    git_ref: Option<String>,
    path: String,
) -> Result<LoadedMarketplace> {
    let refs = refs_to_try(git_ref);
    let manifest = join_repo_path(&[&path, MARKETPLACE_FILE]);
    let (json, used_ref, location) = try_refs(session, &refs, Auth::GitHub, |endpoints, r| {
        endpoints.github_raw_url(&owner, &repo, r, &manifest)
    })?;
    Ok(LoadedMarketplace {
        json,
        context: MarketplaceContext::GitHub {
            owner,
            repo,
            git_ref: used_ref,
            base_path: path,
        },
        location,
    })
}

/// Fetch the manifest at each ref in turn; the error names the last attempt
fn try_refs<F>(
    session: &mut Session,
    refs: &[String],
    auth: Auth,
    url_for: F,
) -> Result<(Value, String, String)>
where
    F: Fn(&crate::http::Endpoints, &str) -> Result<String>,
{
    let mut last_error = None;
    for git_ref in refs {
        let url = url_for(&session.endpoints, git_ref)?;
        match fetch_manifest(session, &url, auth) {
            Ok(json) => {
                info!(%url, git_ref = %git_ref, "loaded marketplace");
                return Ok((json, git_ref.clone(), url));
            }
            Err(e @ DroidFactoryError::ManifestParse { .. }) => return Err(e),
            Err(e) => {
                debug!(%url, error = %e, "marketplace attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| DroidFactoryError::ManifestNotFound {
        location: "no refs to try".to_string(),
    }))
}

fn fetch_manifest(session: &mut Session, url: &str, auth: Auth) -> Result<Value> {
    let response = session.http.get(url, auth).map_err(|e| DroidFactoryError::LoadFailed {
        location: url.to_string(),
        reason: e.to_string(),
    })?;
    if !response.is_success() {
        return Err(DroidFactoryError::LoadFailed {
            location: url.to_string(),
            reason: format!("HTTP {}", response.status),
        });
    }
    serde_json::from_slice(&response.body).map_err(|e| DroidFactoryError::ManifestParse {
        location: url.to_string(),
        message: e.to_string(),
    })
}

fn load_local(input: &Path) -> Result<LoadedMarketplace> {
    let manifest = if input.is_dir() {
        input.join(MARKETPLACE_FILE)
    } else {
        input.to_path_buf()
    };
    if !manifest.is_file() {
        return Err(DroidFactoryError::ManifestNotFound {
            location: manifest.display().to_string(),
        });
    }

    let content = fs::read_to_string(&manifest)?;
    let json = serde_json::from_str(&content).map_err(|e| DroidFactoryError::ManifestParse {
        location: manifest.display().to_string(),
        message: e.to_string(),
    })?;

    let manifest = manifest.canonicalize()?;
    let mut base_dir = manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if base_dir.file_name().is_some_and(|n| n == PLUGIN_DIR) {
        if let Some(parent) = base_dir.parent() {
            base_dir = parent.to_path_buf();
        }
    }

    Ok(LoadedMarketplace {
        json,
        context: MarketplaceContext::Local { base_dir },
        location: manifest.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_GITHUB_RAW;
    use crate::http::{Endpoints, HttpClient};
    use std::time::Duration;
    use tempfile::TempDir;

    fn classify(input: &str) -> MarketplaceLocator {
        MarketplaceLocator::classify(input, DEFAULT_GITHUB_RAW)
    }

    fn offline_session() -> Session {
        let http = HttpClient::new(Duration::from_secs(1), None, None).unwrap();
        Session::new(http, Endpoints::all("http://127.0.0.1:9"))
    }

    fn write_manifest(root: &Path) -> PathBuf {
        let dir = root.join(PLUGIN_DIR);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("marketplace.json");
        fs::write(&path, r#"{"name":"m","plugins":[{"name":"demo","source":"./demo"}]}"#).unwrap();
        path
    }

    #[test]
    fn test_classify_shorthand_and_urls() {
        assert_eq!(
            classify("acme/tools"),
            MarketplaceLocator::GitHubShorthand {
                owner: "acme".into(),
                repo: "tools".into()
            }
        );
        assert_eq!(
            classify("https://github.com/acme/tools/tree/dev/market"),
            MarketplaceLocator::GitHubRepo {
                owner: "acme".into(),
                repo: "tools".into(),
                git_ref: Some("dev".into()),
                path: "market".into(),
            }
        );
        assert!(matches!(
            classify("https://gitlab.com/group/sub/tools"),
            MarketplaceLocator::GitLabRepo { ref namespace_path, .. } if namespace_path == "group/sub"
        ));
        assert_eq!(
            classify("https://example.com/m/marketplace.json"),
            MarketplaceLocator::Url("https://example.com/m/marketplace.json".into())
        );
        assert!(matches!(classify("./not/here/at/all"), MarketplaceLocator::Local(_)));
    }

    #[test]
    fn test_classify_raw_url_base_path() {
        assert_eq!(
            classify("https://raw.githubusercontent.com/acme/tools/v1/market/.claude-plugin/marketplace.json"),
            MarketplaceLocator::GitHubRaw {
                url: "https://raw.githubusercontent.com/acme/tools/v1/market/.claude-plugin/marketplace.json".into(),
                owner: "acme".into(),
                repo: "tools".into(),
                git_ref: "v1".into(),
                base_path: "market".into(),
            }
        );
        assert!(matches!(
            classify("https://raw.githubusercontent.com/acme/tools/main/marketplace.json"),
            MarketplaceLocator::GitHubRaw { ref base_path, .. } if base_path.is_empty()
        ));
    }

    #[test]
    fn test_shorthand_wins_over_existing_directory() {
        // Relative to the crate root, where tests run
        assert!(Path::new("src/marketplace").is_dir());
        assert_eq!(
            classify("src/marketplace"),
            MarketplaceLocator::GitHubShorthand {
                owner: "src".into(),
                repo: "marketplace".into()
            }
        );
        assert_eq!(
            classify("./src/marketplace"),
            MarketplaceLocator::Local(PathBuf::from("./src/marketplace"))
        );
    }

    #[test]
    fn test_absolute_path_is_local() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("acme").join("tools");
        fs::create_dir_all(&nested).unwrap();
        let input = nested.display().to_string();
        assert_eq!(classify(&input), MarketplaceLocator::Local(nested));
    }

    #[test]
    fn test_local_base_dir_same_for_dir_and_file() {
        let temp = TempDir::new().unwrap();
        let manifest = write_manifest(temp.path());
        let mut session = offline_session();

        let from_dir = load_marketplace(&mut session, &temp.path().display().to_string(), None).unwrap();
        let from_file = load_marketplace(&mut session, &manifest.display().to_string(), None).unwrap();

        let expected = MarketplaceContext::Local {
            base_dir: temp.path().canonicalize().unwrap(),
        };
        assert_eq!(from_dir.context, expected);
        assert_eq!(from_file.context, expected);
        assert_eq!(from_dir.name(), Some("m"));
        assert_eq!(session.request_count(), 0);
    }

    #[test]
    fn test_local_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let mut session = offline_session();
        let err = load_marketplace(&mut session, &temp.path().display().to_string(), None).unwrap_err();
        assert!(matches!(err, DroidFactoryError::ManifestNotFound { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_local_malformed_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("marketplace.json");
        fs::write(&path, "{ not json").unwrap();
        let mut session = offline_session();
        let err = load_marketplace(&mut session, &path.display().to_string(), None).unwrap_err();
        assert!(matches!(err, DroidFactoryError::ManifestParse { .. }));
    }

    #[test]
    fn test_marketplace_root() {
        assert_eq!(marketplace_root(".claude-plugin"), "");
        assert_eq!(marketplace_root("a/b/.claude-plugin"), "a/b");
        assert_eq!(marketplace_root("a/b"), "a/b");
        assert_eq!(marketplace_root(""), "");
    }
}
