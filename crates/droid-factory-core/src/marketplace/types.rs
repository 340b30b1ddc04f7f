//! Marketplace type definitions
//!
//! Canonical forms of marketplace manifests, plugin sources and the
//! resources discovered for each plugin.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Manifest location relative to a marketplace or repository root
pub const MARKETPLACE_FILE: &str = ".claude-plugin/marketplace.json";
/// Directory holding marketplace/plugin manifests
pub const PLUGIN_DIR: &str = ".claude-plugin";
/// Marker file that makes a directory a skill
pub const SKILL_MARKER: &str = "SKILL.md";
/// Ref used when neither the source nor the marketplace names one
pub const DEFAULT_REF: &str = "main";

/// How relative plugin sources are resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarketplaceContext {
    Local {
        base_dir: PathBuf,
    },
    #[serde(rename = "github")]
    GitHub {
        owner: String,
        repo: String,
        git_ref: String,
        base_path: String,
    },
    #[serde(rename = "gitlab")]
    GitLab {
        namespace_path: String,
        repo: String,
        git_ref: String,
        base_path: String,
    },
    Url {
        base_url: String,
    },
}

impl MarketplaceContext {
    /// Ref the marketplace itself was loaded from
    pub fn git_ref(&self) -> Option<&str> {
        match self {
            Self::GitHub { git_ref, .. } | Self::GitLab { git_ref, .. } => Some(git_ref),
            Self::Local { .. } | Self::Url { .. } => None,
        }
    }
}

impl fmt::Display for MarketplaceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { base_dir } => write!(f, "local:{}", base_dir.display()),
            Self::GitHub {
                owner,
                repo,
                git_ref,
                base_path,
            } => write!(f, "github:{}/{}@{}/{}", owner, repo, git_ref, base_path),
            Self::GitLab {
                namespace_path,
                repo,
                git_ref,
                base_path,
            } => write!(
                f,
                "gitlab:{}/{}@{}/{}",
                namespace_path, repo, git_ref, base_path
            ),
            Self::Url { base_url } => write!(f, "url:{}", base_url),
        }
    }
}

/// Resource categories, in scan order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Commands,
    Agents,
    Hooks,
    Skills,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Commands,
        ResourceKind::Agents,
        ResourceKind::Hooks,
        ResourceKind::Skills,
    ];

    /// Conventional directory name inside a plugin
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::Agents => "agents",
            Self::Hooks => "hooks",
            Self::Skills => "skills",
        }
    }

    /// Skills are directories, everything else is a single file
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Skills)
    }

    /// File filter for flat kinds (hooks may be any script)
    pub fn accepts_file(&self, file_name: &str) -> bool {
        match self {
            Self::Commands | Self::Agents => is_markdown(file_name),
            Self::Hooks => !file_name.starts_with('.'),
            Self::Skills => false,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

pub(crate) fn is_markdown(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".markdown")
}

/// Declared plugin source, classified once at normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Relative path (e.g. "./plugins/my-plugin")
    Path(String),
    /// `{"source": "github", "repo": "owner/repo"}`
    GitHub {
        repo: Option<String>,
        git_ref: Option<String>,
        path: Option<String>,
    },
    /// `{"source": "git" | "url", "url": "..."}`
    Git {
        url: Option<String>,
        git_ref: Option<String>,
        path: Option<String>,
    },
    /// Anything else; the string describes what was found
    Unknown(String),
}

/// Per-kind override of where resources live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentOverride {
    /// A directory to enumerate instead of the default one
    Dir(String),
    /// Explicit resource paths; no enumeration at all
    Files(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentOverrides {
    pub commands: Option<ComponentOverride>,
    pub agents: Option<ComponentOverride>,
    pub hooks: Option<ComponentOverride>,
    pub skills: Option<ComponentOverride>,
}

impl ComponentOverrides {
    pub fn get(&self, kind: ResourceKind) -> Option<&ComponentOverride> {
        match kind {
            ResourceKind::Commands => self.commands.as_ref(),
            ResourceKind::Agents => self.agents.as_ref(),
            ResourceKind::Hooks => self.hooks.as_ref(),
            ResourceKind::Skills => self.skills.as_ref(),
        }
    }

    /// Every kind names its files, so nothing needs listing
    pub fn all_explicit(&self) -> bool {
        ResourceKind::ALL
            .iter()
            .all(|kind| matches!(self.get(*kind), Some(ComponentOverride::Files(_))))
    }

    pub fn set(&mut self, kind: ResourceKind, value: Option<ComponentOverride>) {
        match kind {
            ResourceKind::Commands => self.commands = value,
            ResourceKind::Agents => self.agents = value,
            ResourceKind::Hooks => self.hooks = value,
            ResourceKind::Skills => self.skills = value,
        }
    }
}

/// Canonical marketplace plugin entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRecord {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    pub plugin_root: Option<String>,
    pub source: SourceSpec,
    pub overrides: ComponentOverrides,
}

impl PluginRecord {
    /// Minimal record with a relative path source
    pub fn with_path(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            version: None,
            plugin_root: None,
            source: SourceSpec::Path(source.to_string()),
            overrides: ComponentOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitHubSource {
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitLabSource {
    pub namespace_path: String,
    pub repo: String,
    pub git_ref: String,
    pub path: String,
}

/// Concrete location of a plugin's resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResolvedSource {
    Local { local_dir: PathBuf },
    #[serde(rename = "github")]
    GitHub(GitHubSource),
    #[serde(rename = "gitlab")]
    GitLab(GitLabSource),
    Unsupported { reason: String },
}

impl ResolvedSource {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }
}

impl fmt::Display for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { local_dir } => write!(f, "{}", local_dir.display()),
            Self::GitHub(gh) => write!(f, "github:{}/{}@{}/{}", gh.owner, gh.repo, gh.git_ref, gh.path),
            Self::GitLab(gl) => write!(
                f,
                "gitlab:{}/{}@{}/{}",
                gl.namespace_path, gl.repo, gl.git_ref, gl.path
            ),
            Self::Unsupported { reason } => write!(f, "unsupported ({})", reason),
        }
    }
}

/// Repository coordinates of a remote resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum RemoteRepo {
    #[serde(rename = "github")]
    GitHub {
        owner: String,
        repo: String,
        git_ref: String,
    },
    #[serde(rename = "gitlab")]
    GitLab {
        namespace_path: String,
        repo: String,
        git_ref: String,
    },
}

impl From<&GitHubSource> for RemoteRepo {
    fn from(gh: &GitHubSource) -> Self {
        Self::GitHub {
            owner: gh.owner.clone(),
            repo: gh.repo.clone(),
            git_ref: gh.git_ref.clone(),
        }
    }
}

impl From<&GitLabSource> for RemoteRepo {
    fn from(gl: &GitLabSource) -> Self {
        Self::GitLab {
            namespace_path: gl.namespace_path.clone(),
            repo: gl.repo.clone(),
            git_ref: gl.git_ref.clone(),
        }
    }
}

/// A file or directory in a remote repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteResource {
    /// Raw-content URL
    pub url: String,
    pub repo: RemoteRepo,
    /// Path inside the repository
    pub path: String,
}

/// Where a discovered resource can be read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Locator {
    Local(PathBuf),
    Remote(RemoteResource),
}

impl Locator {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(remote) => f.write_str(&remote.url),
        }
    }
}

/// One resource found by a scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredResource {
    pub locator: Locator,
    /// Path below the resource-type directory, `/`-separated
    pub rel_path: String,
}

/// Scanner output for one plugin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub commands: Vec<DiscoveredResource>,
    pub agents: Vec<DiscoveredResource>,
    pub hooks: Vec<DiscoveredResource>,
    pub skills: Vec<DiscoveredResource>,
    pub errors: Vec<String>,
}

impl ScanResult {
    /// Result holding a single error and no resources
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    pub fn resources(&self, kind: ResourceKind) -> &[DiscoveredResource] {
        match kind {
            ResourceKind::Commands => &self.commands,
            ResourceKind::Agents => &self.agents,
            ResourceKind::Hooks => &self.hooks,
            ResourceKind::Skills => &self.skills,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, resources: Vec<DiscoveredResource>) {
        match kind {
            ResourceKind::Commands => self.commands = resources,
            ResourceKind::Agents => self.agents = resources,
            ResourceKind::Hooks => self.hooks = resources,
            ResourceKind::Skills => self.skills = resources,
        }
    }

    pub fn total(&self) -> usize {
        ResourceKind::ALL
            .iter()
            .map(|k| self.resources(*k).len())
            .sum()
    }
}

/// A plugin together with everything found for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPlugin {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    pub source: ResolvedSource,
    pub commands: Vec<DiscoveredResource>,
    pub agents: Vec<DiscoveredResource>,
    pub hooks: Vec<DiscoveredResource>,
    pub skills: Vec<DiscoveredResource>,
    pub errors: Vec<String>,
}

impl DiscoveredPlugin {
    pub fn new(record: &PluginRecord, source: ResolvedSource, scan: ScanResult) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            version: record.version.clone(),
            source,
            commands: scan.commands,
            agents: scan.agents,
            hooks: scan.hooks,
            skills: scan.skills,
            errors: scan.errors,
        }
    }

    pub fn resources(&self, kind: ResourceKind) -> &[DiscoveredResource] {
        match kind {
            ResourceKind::Commands => &self.commands,
            ResourceKind::Agents => &self.agents,
            ResourceKind::Hooks => &self.hooks,
            ResourceKind::Skills => &self.skills,
        }
    }

    pub fn total_resources(&self) -> usize {
        ResourceKind::ALL
            .iter()
            .map(|k| self.resources(*k).len())
            .sum()
    }

    /// Why nothing could be installed, when nothing was found
    pub fn unresolved_reason(&self) -> String {
        match &self.source {
            ResolvedSource::Unsupported { reason } => format!("Unsupported source: {}", reason),
            _ => "No components found".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_file_filters() {
        assert!(ResourceKind::Commands.accepts_file("plan.md"));
        assert!(ResourceKind::Agents.accepts_file("Reviewer.MD"));
        assert!(!ResourceKind::Commands.accepts_file("plan.sh"));
        assert!(ResourceKind::Hooks.accepts_file("pre-commit.sh"));
        assert!(!ResourceKind::Hooks.accepts_file(".DS_Store"));
        assert!(ResourceKind::Skills.is_directory());
    }

    #[test]
    fn test_scan_order_is_fixed() {
        let names: Vec<_> = ResourceKind::ALL.iter().map(|k| k.dir_name()).collect();
        assert_eq!(names, vec!["commands", "agents", "hooks", "skills"]);
    }

    #[test]
    fn test_unresolved_reason() {
        let record = PluginRecord::with_path("a", "./a");
        let unsupported = DiscoveredPlugin::new(
            &record,
            ResolvedSource::unsupported("Unknown source type"),
            ScanResult::default(),
        );
        assert_eq!(
            unsupported.unresolved_reason(),
            "Unsupported source: Unknown source type"
        );

        let empty = DiscoveredPlugin::new(
            &record,
            ResolvedSource::Local {
                local_dir: PathBuf::from("/tmp/a"),
            },
            ScanResult::default(),
        );
        assert_eq!(empty.unresolved_reason(), "No components found");
        assert_eq!(empty.total_resources(), 0);
    }

    #[test]
    fn test_context_display() {
        let ctx = MarketplaceContext::GitHub {
            owner: "acme".into(),
            repo: "market".into(),
            git_ref: "main".into(),
            base_path: "".into(),
        };
        assert_eq!(ctx.to_string(), "github:acme/market@main/");
        assert_eq!(ctx.git_ref(), Some("main"));
    }
}
