//! Plugin discovery: resolve each plugin's source and scan it
//!
//! Failures never escape a single plugin; they end up in
//! [`DiscoveredPlugin::errors`] or as an unsupported source.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{DroidFactoryError, Result};
use crate::marketplace::github::scan_plugin_github;
use crate::marketplace::gitlab::scan_plugin_gitlab;
use crate::marketplace::local::scan_plugin_local;
use crate::marketplace::resolver::resolve_plugin_source;
use crate::marketplace::types::{
    ComponentOverride, ComponentOverrides, DiscoveredPlugin, MarketplaceContext, PluginRecord,
    ResolvedSource, ScanResult,
};
use crate::plan::PluginSelection;
use crate::session::Session;
use crate::target::DROIDS_DIR;

/// Called with each plugin name before it is scanned
pub type PluginCallback<'a> = Option<&'a dyn Fn(&str)>;

/// Resolve and scan one plugin
pub fn scan_plugin(
    session: &mut Session,
    record: &PluginRecord,
    context: &MarketplaceContext,
) -> DiscoveredPlugin {
    let source = resolve_plugin_source(record, context);
    debug!(plugin = %record.name, %source, "resolved plugin source");

    let scan = match &source {
        ResolvedSource::Local { local_dir } => scan_plugin_local(local_dir, &record.overrides),
        ResolvedSource::GitHub(gh) => scan_plugin_github(session, gh, &record.overrides),
        ResolvedSource::GitLab(gl) => scan_plugin_gitlab(session, gl, &record.overrides),
        ResolvedSource::Unsupported { .. } => ScanResult::default(),
    };

    let plugin = DiscoveredPlugin::new(record, source, scan);
    info!(
        plugin = %plugin.name,
        resources = plugin.total_resources(),
        errors = plugin.errors.len(),
        "scanned plugin"
    );
    plugin
}

/// Scan the selected plugins sequentially, in manifest order
pub fn discover_plugins(
    session: &mut Session,
    records: &[PluginRecord],
    context: &MarketplaceContext,
    selection: &PluginSelection,
    on_plugin: PluginCallback<'_>,
) -> Vec<DiscoveredPlugin> {
    records
        .iter()
        .filter(|record| selection.includes(&record.name))
        .map(|record| {
            if let Some(f) = on_plugin {
                f(&record.name);
            }
            scan_plugin(session, record, context)
        })
        .collect()
}

/// Treat a local template directory as one plugin.
///
/// The directory holds `commands/`, `hooks/`, `skills/` and either
/// `droids/` or `agents/`.
pub fn discover_template_dir(dir: &Path) -> Result<DiscoveredPlugin> {
    if !dir.is_dir() {
        return Err(DroidFactoryError::TargetNotFound {
            path: dir.to_path_buf(),
        });
    }

    let name = dir
        .canonicalize()?
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("templates")
        .to_string();

    let mut record = PluginRecord::with_path(&name, ".");
    if dir.join(DROIDS_DIR).is_dir() && !dir.join("agents").is_dir() {
        record.overrides = ComponentOverrides {
            agents: Some(ComponentOverride::Dir(DROIDS_DIR.to_string())),
            ..ComponentOverrides::default()
        };
    }

    let context = MarketplaceContext::Local {
        base_dir: dir.to_path_buf(),
    };
    let source = resolve_plugin_source(&record, &context);
    let scan = match &source {
        ResolvedSource::Local { local_dir } => scan_plugin_local(local_dir, &record.overrides),
        _ => ScanResult::default(),
    };
    Ok(DiscoveredPlugin::new(&record, source, scan))
}
