pub mod config;
pub mod error;
pub mod http;
pub mod installer;
pub mod marketplace;
pub mod plan;
pub mod session;
pub mod target;

pub use config::Config;
pub use error::{DroidFactoryError, Result};
pub use http::{Auth, Endpoints, HttpClient, HttpResponse, RateLimitInfo};
pub use installer::{
    FileCallback, InstallOptions, InstallResult, Installer, ItemOutcome,
};
pub use marketplace::{
    discover_plugins, discover_template_dir, load_marketplace, normalize_plugins,
    resolve_plugin_source, DiscoveredPlugin, DiscoveredResource, LoadedMarketplace, Locator,
    MarketplaceContext, PluginRecord, ResolvedSource, ResourceKind,
};
pub use plan::{
    compute_marketplace_plan, Collision, CollisionOutcome, CollisionPolicy, InstallPlanItem,
    MarketplacePlan, PlanOptions, PluginSelection, SourceType, Unresolved,
};
pub use session::Session;
pub use target::{DestDirs, InstallScope};
