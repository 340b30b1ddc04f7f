//! Marketplace loading, source resolution and resource discovery
//!
//! Pipeline: [`load_marketplace`] → [`normalize_plugins`] →
//! [`discover_plugins`] (resolve + scan each plugin).

pub mod discover;
pub mod git_url;
pub mod github;
pub mod gitlab;
pub mod local;
pub mod locator;
pub mod normalize;
pub mod resolver;
pub mod scan;
pub mod tree;
pub mod types;

pub use discover::{discover_plugins, discover_template_dir, scan_plugin, PluginCallback};
pub use github::{github_files_under, scan_plugin_github};
pub use gitlab::{gitlab_files_under, scan_plugin_gitlab};
pub use local::scan_plugin_local;
pub use locator::{load_marketplace, LoadedMarketplace, MarketplaceLocator};
pub use normalize::normalize_plugins;
pub use resolver::resolve_plugin_source;
pub use tree::{github_repo_tree, TreeEntry, TreeLookup};
pub use types::{
    ComponentOverride, ComponentOverrides, DiscoveredPlugin, DiscoveredResource, GitHubSource,
    GitLabSource, Locator, MarketplaceContext, PluginRecord, RemoteRepo, RemoteResource,
    ResolvedSource, ResourceKind, ScanResult, SourceSpec, MARKETPLACE_FILE, SKILL_MARKER,
};
