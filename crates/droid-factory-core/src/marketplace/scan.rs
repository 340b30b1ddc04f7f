//! Scanning logic shared by the remote providers
//!
//! Providers implement [`RemoteLister`]; override handling, flat listings
//! and the skill probe fallback live here.

use tracing::debug;

use crate::marketplace::git_url::join_repo_path;
use crate::marketplace::types::{
    ComponentOverride, ComponentOverrides, DiscoveredResource, Locator, RemoteResource,
    ResourceKind, SKILL_MARKER,
};
use crate::session::Session;

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

/// Directory listing outcome; a missing directory is not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Found(Vec<ListingEntry>),
    Missing,
}

pub trait RemoteLister {
    /// `owner/repo@ref` style label for messages
    fn label(&self) -> String;

    /// List the immediate children of `path`
    fn list_dir(&self, session: &mut Session, path: &str) -> Result<Listing, String>;

    /// Locator for a file or directory at `path`
    fn resource(&self, session: &Session, path: &str) -> Result<RemoteResource, String>;
}

/// Directory to enumerate for `kind`: override dir or the conventional name
pub fn kind_dir(base: &str, kind: ResourceKind, overrides: &ComponentOverrides) -> String {
    match overrides.get(kind) {
        Some(ComponentOverride::Dir(dir)) => join_repo_path(&[base, dir]),
        _ => join_repo_path(&[base, kind.dir_name()]),
    }
}

/// Path below the resource-type directory used for destination naming.
///
/// `./agents/review/security.md` becomes `review/security.md`; paths that
/// never pass through the kind's directory keep only their last segment.
pub fn relative_to_kind_dir(path: &str, kind: ResourceKind) -> String {
    let normalized = join_repo_path(&[path]);
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(pos) = segments.iter().position(|s| *s == kind.dir_name()) {
        if pos + 1 < segments.len() {
            return segments[pos + 1..].join("/");
        }
    }
    segments.last().map(|s| s.to_string()).unwrap_or_default()
}

/// Explicit override paths become locators without any listing call
pub fn override_resources(
    lister: &dyn RemoteLister,
    session: &Session,
    base: &str,
    kind: ResourceKind,
    files: &[String],
    errors: &mut Vec<String>,
) -> Vec<DiscoveredResource> {
    let mut resources = Vec::new();
    for file in files {
        let path = join_repo_path(&[base, file]);
        match lister.resource(session, &path) {
            Ok(remote) => resources.push(DiscoveredResource {
                locator: Locator::Remote(remote),
                rel_path: relative_to_kind_dir(file, kind),
            }),
            Err(e) => errors.push(format!("{}: {}: {}", kind, file, e)),
        }
    }
    resources
}

/// Direct-child files of `dir` via the listing API
pub fn list_flat(
    lister: &dyn RemoteLister,
    session: &mut Session,
    dir: &str,
    kind: ResourceKind,
) -> Result<Vec<DiscoveredResource>, String> {
    let entries = match lister.list_dir(session, dir)? {
        Listing::Found(entries) => entries,
        Listing::Missing => {
            debug!(%kind, dir, "directory missing, treating as empty");
            return Ok(Vec::new());
        }
    };

    let mut resources = Vec::new();
    for entry in entries {
        if entry.is_dir || !kind.accepts_file(&entry.name) {
            continue;
        }
        let remote = lister.resource(session, &entry.path)?;
        resources.push(DiscoveredResource {
            locator: Locator::Remote(remote),
            rel_path: entry.name,
        });
    }
    Ok(resources)
}

/// Skills via listing: every subdirectory of `dir` is probed for a
/// `SKILL.md` child, one request each, up to `max_probes` requests.
pub fn list_skills_by_probe(
    lister: &dyn RemoteLister,
    session: &mut Session,
    dir: &str,
    max_probes: usize,
    errors: &mut Vec<String>,
) -> Result<Vec<DiscoveredResource>, String> {
    let candidates: Vec<ListingEntry> = match lister.list_dir(session, dir)? {
        Listing::Found(entries) => entries.into_iter().filter(|e| e.is_dir).collect(),
        Listing::Missing => return Ok(Vec::new()),
    };

    let mut skills = Vec::new();
    for (probed, candidate) in candidates.iter().enumerate() {
        if probed >= max_probes {
            errors.push(format!(
                "skills: probe limit of {} reached under {}:{}; {} directories not checked",
                max_probes,
                lister.label(),
                dir,
                candidates.len() - probed
            ));
            break;
        }

        match lister.list_dir(session, &candidate.path) {
            Ok(Listing::Found(children)) => {
                if children.iter().any(|c| !c.is_dir && c.name == SKILL_MARKER) {
                    let remote = lister.resource(session, &candidate.path)?;
                    skills.push(DiscoveredResource {
                        locator: Locator::Remote(remote),
                        rel_path: candidate.name.clone(),
                    });
                }
            }
            Ok(Listing::Missing) => {}
            Err(e) => errors.push(format!(
                "skills: failed to probe {}:{} ({})",
                lister.label(),
                candidate.path,
                e
            )),
        }
    }
    Ok(skills)
}
