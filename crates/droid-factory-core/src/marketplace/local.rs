//! Local filesystem scanner

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::marketplace::scan::relative_to_kind_dir;
use crate::marketplace::types::{
    ComponentOverride, ComponentOverrides, DiscoveredResource, Locator, ResourceKind, ScanResult,
    SKILL_MARKER,
};

/// Enumerate a plugin directory on disk.
///
/// Commands and agents are collected recursively (`workflows/review.md`
/// keeps its sub-path), hooks are the files directly in `hooks/`, and a
/// skill is any immediate subdirectory of `skills/` holding `SKILL.md`.
pub fn scan_plugin_local(plugin_dir: &Path, overrides: &ComponentOverrides) -> ScanResult {
    if !plugin_dir.is_dir() {
        return ScanResult::failed(format!(
            "plugin directory not found: {}",
            plugin_dir.display()
        ));
    }

    let mut result = ScanResult::default();
    for kind in ResourceKind::ALL {
        let resources = match overrides.get(kind) {
            Some(ComponentOverride::Files(files)) => {
                override_files(plugin_dir, kind, files, &mut result.errors)
            }
            Some(ComponentOverride::Dir(dir)) => scan_kind_dir(&plugin_dir.join(dir), kind),
            None => scan_kind_dir(&plugin_dir.join(kind.dir_name()), kind),
        };
        result.set(kind, resources);
    }
    result
}

fn scan_kind_dir(dir: &Path, kind: ResourceKind) -> Vec<DiscoveredResource> {
    if !dir.is_dir() {
        return Vec::new();
    }
    match kind {
        ResourceKind::Commands | ResourceKind::Agents => walk_files(dir, kind),
        ResourceKind::Hooks => immediate_files(dir, kind),
        ResourceKind::Skills => skill_dirs(dir),
    }
}

fn walk_files(dir: &Path, kind: ResourceKind) -> Vec<DiscoveredResource> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(|n| kind.accepts_file(n)))
        .filter_map(|e| {
            let rel = e.path().strip_prefix(dir).ok()?;
            Some(DiscoveredResource {
                rel_path: slash_path(rel)?,
                locator: Locator::Local(e.into_path()),
            })
        })
        .collect()
}

fn immediate_files(dir: &Path, kind: ResourceKind) -> Vec<DiscoveredResource> {
    sorted_entries(dir)
        .into_iter()
        .filter(|p| p.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            kind.accepts_file(&name).then(|| DiscoveredResource {
                locator: Locator::Local(path.clone()),
                rel_path: name,
            })
        })
        .collect()
}

fn skill_dirs(dir: &Path) -> Vec<DiscoveredResource> {
    sorted_entries(dir)
        .into_iter()
        .filter(|p| p.is_dir() && p.join(SKILL_MARKER).is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some(DiscoveredResource {
                locator: Locator::Local(path),
                rel_path: name,
            })
        })
        .collect()
}

fn override_files(
    plugin_dir: &Path,
    kind: ResourceKind,
    files: &[String],
    errors: &mut Vec<String>,
) -> Vec<DiscoveredResource> {
    let mut resources = Vec::new();
    for file in files {
        let path = plugin_dir.join(file);
        let present = if kind.is_directory() {
            path.is_dir()
        } else {
            path.is_file()
        };
        if !present {
            errors.push(format!("{}: {} not found", kind, path.display()));
            continue;
        }
        resources.push(DiscoveredResource {
            locator: Locator::Local(path),
            rel_path: relative_to_kind_dir(file, kind),
        });
    }
    resources
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

fn slash_path(path: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = path.components().map(|c| c.as_os_str().to_str()).collect();
    parts.map(|p| p.join("/"))
}
