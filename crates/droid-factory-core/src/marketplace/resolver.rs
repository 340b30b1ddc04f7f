//! Plugin source resolution
//!
//! Pure mapping from a plugin's declared source plus the marketplace
//! context to a concrete location. Every input yields exactly one
//! [`ResolvedSource`]; failures are the `Unsupported` variant.

use std::path::{Component, Path, PathBuf};

use crate::marketplace::git_url::{join_repo_path, parse_repo_url, RepoUrl};
use crate::marketplace::types::{
    GitHubSource, GitLabSource, MarketplaceContext, PluginRecord, ResolvedSource, SourceSpec,
    DEFAULT_REF,
};

pub fn resolve_plugin_source(plugin: &PluginRecord, context: &MarketplaceContext) -> ResolvedSource {
    match &plugin.source {
        SourceSpec::Path(path) => resolve_relative(path, plugin.plugin_root.as_deref(), context),
        SourceSpec::GitHub {
            repo,
            git_ref,
            path,
        } => {
            let Some(repo) = repo else {
                return ResolvedSource::unsupported("GitHub source missing repo");
            };
            match split_owner_repo(repo) {
                Some((owner, repo)) => ResolvedSource::GitHub(GitHubSource {
                    owner,
                    repo,
                    git_ref: pick_ref(git_ref.as_deref(), None, context),
                    path: join_repo_path(&[path.as_deref().unwrap_or("")]),
                }),
                None => ResolvedSource::unsupported(format!("Invalid GitHub repo '{}'", repo)),
            }
        }
        SourceSpec::Git {
            url,
            git_ref,
            path,
        } => {
            let Some(url) = url else {
                return ResolvedSource::unsupported("Git source missing url");
            };
            resolve_git_url(url, git_ref.as_deref(), path.as_deref(), context)
        }
        SourceSpec::Unknown(what) => {
            ResolvedSource::unsupported(format!("Unknown source type ({})", what))
        }
    }
}

fn resolve_relative(
    source: &str,
    plugin_root: Option<&str>,
    context: &MarketplaceContext,
) -> ResolvedSource {
    let root = plugin_root.unwrap_or("");
    match context {
        MarketplaceContext::Local { base_dir } => {
            let dir = base_dir.join(root).join(source);
            ResolvedSource::Local {
                local_dir: normalize_local(&dir),
            }
        }
        MarketplaceContext::GitHub {
            owner,
            repo,
            git_ref,
            base_path,
        } => ResolvedSource::GitHub(GitHubSource {
            owner: owner.clone(),
            repo: repo.clone(),
            git_ref: git_ref.clone(),
            path: join_repo_path(&[base_path, root, source]),
        }),
        MarketplaceContext::GitLab {
            namespace_path,
            repo,
            git_ref,
            base_path,
        } => ResolvedSource::GitLab(GitLabSource {
            namespace_path: namespace_path.clone(),
            repo: repo.clone(),
            git_ref: git_ref.clone(),
            path: join_repo_path(&[base_path, root, source]),
        }),
        MarketplaceContext::Url { .. } => {
            ResolvedSource::unsupported("Non-GitHub remote source path")
        }
    }
}

fn resolve_git_url(
    url: &str,
    source_ref: Option<&str>,
    source_path: Option<&str>,
    context: &MarketplaceContext,
) -> ResolvedSource {
    match parse_repo_url(url) {
        Some(RepoUrl::GitHub {
            owner,
            repo,
            git_ref,
            path,
        }) => ResolvedSource::GitHub(GitHubSource {
            owner,
            repo,
            git_ref: pick_ref(source_ref, git_ref.as_deref(), context),
            path: join_repo_path(&[path.as_deref().unwrap_or(""), source_path.unwrap_or("")]),
        }),
        Some(RepoUrl::GitLab {
            namespace_path,
            repo,
            git_ref,
            path,
        }) => ResolvedSource::GitLab(GitLabSource {
            namespace_path,
            repo,
            git_ref: pick_ref(source_ref, git_ref.as_deref(), context),
            path: join_repo_path(&[path.as_deref().unwrap_or(""), source_path.unwrap_or("")]),
        }),
        None => ResolvedSource::unsupported(format!("Unsupported git/url provider: {}", url)),
    }
}

/// Source ref, then a ref embedded in the URL, then the marketplace ref, then `main`
fn pick_ref(source_ref: Option<&str>, url_ref: Option<&str>, context: &MarketplaceContext) -> String {
    source_ref
        .or(url_ref)
        .or_else(|| context.git_ref())
        .unwrap_or(DEFAULT_REF)
        .to_string()
}

fn split_owner_repo(repo: &str) -> Option<(String, String)> {
    if let Some(RepoUrl::GitHub { owner, repo, .. }) = parse_repo_url(repo) {
        return Some((owner, repo));
    }
    let (owner, name) = repo.trim().trim_matches('/').split_once('/')?;
    let name = name.strip_suffix(".git").unwrap_or(name);
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner.to_string(), name.to_string()))
}

/// Lexical normalization; does not touch the filesystem
fn normalize_local(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::types::ComponentOverrides;

    fn record(source: SourceSpec, plugin_root: Option<&str>) -> PluginRecord {
        PluginRecord {
            name: "p".into(),
            description: String::new(),
            version: None,
            plugin_root: plugin_root.map(str::to_string),
            source,
            overrides: ComponentOverrides::default(),
        }
    }

    fn github_ctx(git_ref: &str, base_path: &str) -> MarketplaceContext {
        MarketplaceContext::GitHub {
            owner: "acme".into(),
            repo: "market".into(),
            git_ref: git_ref.into(),
            base_path: base_path.into(),
        }
    }

    #[test]
    fn test_relative_local() {
        let ctx = MarketplaceContext::Local {
            base_dir: PathBuf::from("/m"),
        };
        let resolved = resolve_plugin_source(
            &record(SourceSpec::Path("./demo".into()), Some("./plugins")),
            &ctx,
        );
        assert_eq!(
            resolved,
            ResolvedSource::Local {
                local_dir: PathBuf::from("/m/plugins/demo")
            }
        );
    }

    #[test]
    fn test_relative_github_joins_base_and_root() {
        let resolved = resolve_plugin_source(
            &record(SourceSpec::Path("./demo".into()), Some("plugins")),
            &github_ctx("dev", "market"),
        );
        assert_eq!(
            resolved,
            ResolvedSource::GitHub(GitHubSource {
                owner: "acme".into(),
                repo: "market".into(),
                git_ref: "dev".into(),
                path: "market/plugins/demo".into(),
            })
        );
    }

    #[test]
    fn test_relative_gitlab() {
        let ctx = MarketplaceContext::GitLab {
            namespace_path: "group/sub".into(),
            repo: "market".into(),
            git_ref: "main".into(),
            base_path: "".into(),
        };
        let resolved = resolve_plugin_source(&record(SourceSpec::Path("./a".into()), None), &ctx);
        assert!(matches!(resolved, ResolvedSource::GitLab(ref gl) if gl.path == "a" && gl.namespace_path == "group/sub"));
    }

    #[test]
    fn test_relative_against_url_context_is_unsupported() {
        let ctx = MarketplaceContext::Url {
            base_url: "https://example.com/m".into(),
        };
        let resolved = resolve_plugin_source(&record(SourceSpec::Path("./a".into()), None), &ctx);
        assert_eq!(
            resolved,
            ResolvedSource::unsupported("Non-GitHub remote source path")
        );
    }

    #[test]
    fn test_github_object_ref_precedence() {
        let with_ref = record(
            SourceSpec::GitHub {
                repo: Some("o/r".into()),
                git_ref: Some("v1".into()),
                path: None,
            },
            None,
        );
        let without_ref = record(
            SourceSpec::GitHub {
                repo: Some("o/r".into()),
                git_ref: None,
                path: Some("./pkg".into()),
            },
            None,
        );
        let local = MarketplaceContext::Local {
            base_dir: PathBuf::from("/m"),
        };

        let a = resolve_plugin_source(&with_ref, &github_ctx("dev", ""));
        let b = resolve_plugin_source(&without_ref, &github_ctx("dev", ""));
        let c = resolve_plugin_source(&without_ref, &local);

        assert!(matches!(a, ResolvedSource::GitHub(ref gh) if gh.git_ref == "v1"));
        assert!(matches!(b, ResolvedSource::GitHub(ref gh) if gh.git_ref == "dev" && gh.path == "pkg"));
        assert!(matches!(c, ResolvedSource::GitHub(ref gh) if gh.git_ref == "main"));
    }

    #[test]
    fn test_github_object_missing_repo() {
        let resolved = resolve_plugin_source(
            &record(
                SourceSpec::GitHub {
                    repo: None,
                    git_ref: None,
                    path: None,
                },
                None,
            ),
            &github_ctx("main", ""),
        );
        assert!(!resolved.is_supported());
    }

    #[test]
    fn test_git_url_providers() {
        let ctx = github_ctx("main", "");
        let gitlab = resolve_plugin_source(
            &record(
                SourceSpec::Git {
                    url: Some("https://gitlab.com/g/sub/r.git".into()),
                    git_ref: None,
                    path: None,
                },
                None,
            ),
            &ctx,
        );
        assert_eq!(
            gitlab,
            ResolvedSource::GitLab(GitLabSource {
                namespace_path: "g/sub".into(),
                repo: "r".into(),
                git_ref: "main".into(),
                path: "".into(),
            })
        );

        let other = resolve_plugin_source(
            &record(
                SourceSpec::Git {
                    url: Some("https://bitbucket.org/o/r.git".into()),
                    git_ref: None,
                    path: None,
                },
                None,
            ),
            &ctx,
        );
        assert!(
            matches!(other, ResolvedSource::Unsupported { ref reason } if reason.starts_with("Unsupported git/url provider"))
        );
    }

    #[test]
    fn test_unknown_source() {
        let resolved = resolve_plugin_source(
            &record(SourceSpec::Unknown("number source".into()), None),
            &github_ctx("main", ""),
        );
        assert!(
            matches!(resolved, ResolvedSource::Unsupported { ref reason } if reason.starts_with("Unknown source type"))
        );
    }
}
