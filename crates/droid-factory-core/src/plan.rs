//! Install plan computation
//!
//! Turns discovered plugins into per-type lists of (source, destination)
//! items. Nested resources are flattened into unique names
//! (`workflows/review.md` → `workflows__review.md`) and destination
//! collisions between items are settled by a [`CollisionPolicy`].

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::marketplace::{DiscoveredPlugin, Locator, ResourceKind};
use crate::target::DestDirs;

/// Separator replacing `/` in flattened names
pub const FLATTEN_SEPARATOR: &str = "__";

/// Which plugins to plan for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PluginSelection {
    #[default]
    All,
    Named(Vec<String>),
}

impl PluginSelection {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(names) => names.iter().any(|n| n == name),
        }
    }
}

impl std::str::FromStr for PluginSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let mut names: Vec<String> = Vec::new();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        if names.is_empty() {
            return Err("Expected 'all' or a comma-separated list of plugin names".to_string());
        }
        Ok(Self::Named(names))
    }
}

impl std::fmt::Display for PluginSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Named(names) => f.write_str(&names.join(",")),
        }
    }
}

/// What happens when two items map to the same destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Keep the first item in manifest order
    #[default]
    Skip,
    /// Rename the later item to `<plugin>__<name>`
    Namespace,
    /// Keep the later item
    Overwrite,
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Namespace => "namespace",
            Self::Overwrite => "overwrite",
        })
    }
}

impl std::str::FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "namespace" => Ok(Self::Namespace),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(format!(
                "Unknown collision policy: {} (expected skip, namespace or overwrite)",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Local,
    Remote,
}

impl From<&Locator> for SourceType {
    fn from(locator: &Locator) -> Self {
        if locator.is_remote() {
            Self::Remote
        } else {
            Self::Local
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPlanItem {
    pub plugin: String,
    pub kind: ResourceKind,
    /// Flattened name, without extension
    pub name: String,
    pub src: Locator,
    pub src_type: SourceType,
    pub dest: PathBuf,
    pub is_skill: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unresolved {
    pub plugin: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "dest", rename_all = "lowercase")]
pub enum CollisionOutcome {
    /// Later item dropped
    Skipped,
    /// Later item installed under a new destination
    Renamed(PathBuf),
    /// Later item replaced the earlier one
    Overwritten,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub kind: ResourceKind,
    pub dest: PathBuf,
    /// Plugin owning the item already planned
    pub existing: String,
    /// Plugin whose item collided
    pub incoming: String,
    pub outcome: CollisionOutcome,
}

impl std::fmt::Display for Collision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match &self.outcome {
            CollisionOutcome::Skipped => format!("kept {}, skipped {}", self.existing, self.incoming),
            CollisionOutcome::Renamed(dest) => {
                format!("{} installed as {}", self.incoming, dest.display())
            }
            CollisionOutcome::Overwritten => {
                format!("{} replaces {}", self.incoming, self.existing)
            }
        };
        write!(f, "{} {}: {}", self.kind, self.dest.display(), what)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarketplacePlan {
    pub commands: Vec<InstallPlanItem>,
    pub droids: Vec<InstallPlanItem>,
    pub hooks: Vec<InstallPlanItem>,
    pub skills: Vec<InstallPlanItem>,
    pub unresolved: Vec<Unresolved>,
    pub collisions: Vec<Collision>,
}

impl MarketplacePlan {
    pub fn items(&self, kind: ResourceKind) -> &[InstallPlanItem] {
        match kind {
            ResourceKind::Commands => &self.commands,
            ResourceKind::Agents => &self.droids,
            ResourceKind::Hooks => &self.hooks,
            ResourceKind::Skills => &self.skills,
        }
    }

    fn items_mut(&mut self, kind: ResourceKind) -> &mut Vec<InstallPlanItem> {
        match kind {
            ResourceKind::Commands => &mut self.commands,
            ResourceKind::Agents => &mut self.droids,
            ResourceKind::Hooks => &mut self.hooks,
            ResourceKind::Skills => &mut self.skills,
        }
    }

    /// Every item, in type order
    pub fn all_items(&self) -> impl Iterator<Item = &InstallPlanItem> {
        ResourceKind::ALL.into_iter().flat_map(move |k| self.items(k).iter())
    }

    pub fn total_items(&self) -> usize {
        self.all_items().count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub on_collision: CollisionPolicy,
    /// Matched against flattened names
    pub exclude: Vec<glob::Pattern>,
}

impl PlanOptions {
    fn is_excluded(&self, name: &str, file_name: &str) -> bool {
        self.exclude
            .iter()
            .any(|p| p.matches(name) || p.matches(file_name))
    }
}

/// Flatten a path below the type directory into `(name, extension)`.
///
/// `workflows/review.md` → `("workflows__review", Some("md"))`.
/// Directories (skills) keep their name untouched. Within a file path, `%`
/// and any `_` that touches another `_` or a segment edge are
/// percent-escaped, so a literal `a__b.md` (`a%5F%5Fb`) never meets the
/// flattened `a/b.md` (`a__b`).
pub fn flatten_name(rel_path: &str, is_dir: bool) -> (String, Option<String>) {
    let segments: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return (String::new(), None);
    };

    let (stem, ext) = if is_dir {
        (*last, None)
    } else {
        match last.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext.to_string())),
            _ => (*last, None),
        }
    };

    if is_dir {
        let mut parts: Vec<&str> = parents.to_vec();
        parts.push(stem);
        return (parts.join(FLATTEN_SEPARATOR), ext);
    }
    let parts: Vec<String> = parents
        .iter()
        .copied()
        .chain(std::iter::once(stem))
        .map(escape_segment)
        .collect();
    (parts.join(FLATTEN_SEPARATOR), ext)
}

fn escape_segment(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len());
    for (i, c) in chars.iter().enumerate() {
        let edge = i == 0 || i + 1 == chars.len();
        let doubled = (i > 0 && chars[i - 1] == '_') || chars.get(i + 1) == Some(&'_');
        match c {
            '%' => out.push_str("%25"),
            '_' if edge || doubled => out.push_str("%5F"),
            _ => out.push(*c),
        }
    }
    out
}

fn file_name(name: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{}.{}", name, ext),
        None => name.to_string(),
    }
}

/// Build the install plan for the selected plugins
pub fn compute_marketplace_plan(
    selection: &PluginSelection,
    discovered: &[DiscoveredPlugin],
    dest_dirs: &DestDirs,
    options: &PlanOptions,
) -> MarketplacePlan {
    let mut plan = MarketplacePlan::default();
    let mut owners: HashMap<(ResourceKind, PathBuf), usize> = HashMap::new();

    if let PluginSelection::Named(names) = selection {
        for name in names {
            if !discovered.iter().any(|p| &p.name == name) {
                plan.unresolved.push(Unresolved {
                    plugin: name.clone(),
                    reason: "Plugin not found in marketplace".to_string(),
                });
            }
        }
    }

    for plugin in discovered.iter().filter(|p| selection.includes(&p.name)) {
        for error in &plugin.errors {
            plan.unresolved.push(Unresolved {
                plugin: plugin.name.clone(),
                reason: error.clone(),
            });
        }
        if plugin.total_resources() == 0 {
            if plugin.errors.is_empty() {
                plan.unresolved.push(Unresolved {
                    plugin: plugin.name.clone(),
                    reason: plugin.unresolved_reason(),
                });
            }
            continue;
        }

        for kind in ResourceKind::ALL {
            let dir = dest_dirs.for_kind(kind);
            for resource in plugin.resources(kind) {
                let (name, ext) = flatten_name(&resource.rel_path, kind.is_directory());
                if name.is_empty() {
                    continue;
                }
                let target_name = file_name(&name, ext.as_deref());
                if options.is_excluded(&name, &target_name) {
                    debug!(plugin = %plugin.name, %name, "excluded by pattern");
                    continue;
                }

                let item = InstallPlanItem {
                    plugin: plugin.name.clone(),
                    kind,
                    name,
                    src: resource.locator.clone(),
                    src_type: SourceType::from(&resource.locator),
                    dest: dir.join(&target_name),
                    is_skill: kind.is_directory(),
                };
                place(&mut plan, &mut owners, item, ext.as_deref(), dir, options.on_collision);
            }
        }
    }

    plan
}

fn place(
    plan: &mut MarketplacePlan,
    owners: &mut HashMap<(ResourceKind, PathBuf), usize>,
    mut item: InstallPlanItem,
    ext: Option<&str>,
    dir: &std::path::Path,
    policy: CollisionPolicy,
) {
    let key = (item.kind, item.dest.clone());
    let index = match owners.get(&key).copied() {
        Some(index) => index,
        None => {
            let items = plan.items_mut(item.kind);
            owners.insert(key, items.len());
            items.push(item);
            return;
        }
    };

    let existing = plan.items(item.kind)[index].plugin.clone();
    let mut collision = Collision {
        kind: item.kind,
        dest: item.dest.clone(),
        existing,
        incoming: item.plugin.clone(),
        outcome: CollisionOutcome::Skipped,
    };

    match policy {
        CollisionPolicy::Skip => {}
        CollisionPolicy::Overwrite => {
            collision.outcome = CollisionOutcome::Overwritten;
            let kind = item.kind;
            plan.items_mut(kind)[index] = item;
        }
        CollisionPolicy::Namespace => {
            let renamed = format!("{}{}{}", item.plugin, FLATTEN_SEPARATOR, item.name);
            let dest = dir.join(file_name(&renamed, ext));
            let renamed_key = (item.kind, dest.clone());
            if !owners.contains_key(&renamed_key) {
                collision.outcome = CollisionOutcome::Renamed(dest.clone());
                item.name = renamed;
                item.dest = dest;
                let items = plan.items_mut(item.kind);
                owners.insert(renamed_key, items.len());
                items.push(item);
            }
        }
    }

    debug!(%collision, "destination collision");
    plan.collisions.push(collision);
}
