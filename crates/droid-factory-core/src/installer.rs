//! Plan executor
//!
//! Copies local resources and downloads remote ones into the destination
//! directories. Existing destinations are left alone unless `force` is
//! set; identical content is reported as unchanged. A failing item is
//! recorded and the remaining items still run.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{DroidFactoryError, Result};
use crate::http::Auth;
use crate::marketplace::{
    github_files_under, gitlab_files_under, GitHubSource, GitLabSource, Locator, RemoteRepo,
    RemoteResource,
};
use crate::plan::{InstallPlanItem, MarketplacePlan};
use crate::session::Session;

/// Callback type for file operation progress reporting
pub type FileCallback<'a> = Option<&'a dyn Fn(&str, &str)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Written,
    /// Destination exists and `force` is off
    Skipped,
    /// Destination already has the same content
    Unchanged,
}

impl ItemOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Written => "OK",
            Self::Skipped => "SKIP",
            Self::Unchanged => "SAME",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct InstallResult {
    pub written: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub failures: Vec<(PathBuf, String)>,
}

impl InstallResult {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Written => self.written += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

pub fn compute_file_hash(path: &Path) -> Result<String> {
    Ok(compute_hash(&fs::read(path)?))
}

pub struct Installer<'s> {
    session: &'s mut Session,
    options: InstallOptions,
}

impl<'s> Installer<'s> {
    pub fn new(session: &'s mut Session, options: InstallOptions) -> Self {
        Self { session, options }
    }

    /// Execute every item of `plan`, in type order
    pub fn install_plan(&mut self, plan: &MarketplacePlan, on_file: FileCallback<'_>) -> InstallResult {
        let mut result = InstallResult::default();

        for item in plan.all_items() {
            let shown = item.dest.display().to_string();
            match self.install_item(item) {
                Ok(outcome) => {
                    if let Some(f) = on_file {
                        f(outcome.label(), &shown);
                    }
                    result.record(outcome);
                }
                Err(e) => {
                    warn!(plugin = %item.plugin, dest = %shown, error = %e, "install failed");
                    if let Some(f) = on_file {
                        f("FAIL", &shown);
                    }
                    result.failures.push((item.dest.clone(), e.to_string()));
                }
            }
        }

        result
    }

    pub fn install_item(&mut self, item: &InstallPlanItem) -> Result<ItemOutcome> {
        debug!(plugin = %item.plugin, src = %item.src, dest = %item.dest.display(), "install item");
        match (&item.src, item.is_skill) {
            (Locator::Local(src), false) => copy_file(src, &item.dest, self.options),
            (Locator::Local(src), true) => copy_dir(src, &item.dest, self.options),
            (Locator::Remote(remote), false) => {
                download_file(self.session, &remote.url, auth_for(&remote.repo), &item.dest, self.options)
            }
            (Locator::Remote(remote), true) => download_dir(self.session, remote, &item.dest, self.options),
        }
    }
}

fn auth_for(repo: &RemoteRepo) -> Auth {
    match repo {
        RemoteRepo::GitHub { .. } => Auth::GitHub,
        RemoteRepo::GitLab { .. } => Auth::GitLab,
    }
}

/// Copy one file, respecting `force`
pub fn copy_file(src: &Path, dest: &Path, options: InstallOptions) -> Result<ItemOutcome> {
    let content = fs::read(src)?;

    if dest.exists() {
        if compute_file_hash(dest)? == compute_hash(&content) {
            return Ok(ItemOutcome::Unchanged);
        }
        if !options.force {
            return Ok(ItemOutcome::Skipped);
        }
    }

    if !options.dry_run {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &content)?;
    }
    Ok(ItemOutcome::Written)
}

/// Copy a directory tree (a skill), respecting `force` for the directory
/// as a whole
pub fn copy_dir(src: &Path, dest: &Path, options: InstallOptions) -> Result<ItemOutcome> {
    if !src.is_dir() {
        return Err(DroidFactoryError::TargetNotFound {
            path: src.to_path_buf(),
        });
    }
    let files = list_dir_files(src)?;

    if dest.exists() {
        if dir_matches(src, &files, dest)? {
            return Ok(ItemOutcome::Unchanged);
        }
        if !options.force {
            return Ok(ItemOutcome::Skipped);
        }
    }

    if !options.dry_run {
        for rel in &files {
            let target = dest.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(src.join(rel), &target)?;
        }
    }
    Ok(ItemOutcome::Written)
}

fn list_dir_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if entry.file_type().is_file() {
            if let Ok(rel) = entry.path().strip_prefix(dir) {
                files.push(rel.to_path_buf());
            }
        }
    }
    Ok(files)
}

fn dir_matches(src: &Path, files: &[PathBuf], dest: &Path) -> Result<bool> {
    for rel in files {
        let target = dest.join(rel);
        if !target.is_file() || compute_file_hash(&target)? != compute_file_hash(&src.join(rel))? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Download `url` to `dest` through a temporary sibling file.
///
/// Existing destinations are not fetched at all unless `force` is set.
/// Nothing is left behind on a non-2xx response or transport error.
pub fn download_file(
    session: &mut Session,
    url: &str,
    auth: Auth,
    dest: &Path,
    options: InstallOptions,
) -> Result<ItemOutcome> {
    if dest.exists() && !options.force {
        return Ok(ItemOutcome::Skipped);
    }
    if options.dry_run {
        return Ok(ItemOutcome::Written);
    }

    let response = session.http.get(url, auth)?.error_for_status()?;

    if dest.is_file() && compute_file_hash(dest)? == compute_hash(&response.body) {
        return Ok(ItemOutcome::Unchanged);
    }

    let temp = staging_path(dest)?;
    let written = fs::write(&temp, &response.body).and_then(|_| fs::rename(&temp, dest));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(ItemOutcome::Written)
}

/// Hidden `.part` sibling of `dest`, with the parent directory created
fn staging_path(dest: &Path) -> Result<PathBuf> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    Ok(parent.join(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4())))
}

/// Download every file of a remote skill directory.
///
/// Files land in a staging directory next to `dest`, which replaces `dest`
/// only once every file has arrived. A failed download removes the staging
/// directory and leaves `dest` as it was.
pub fn download_dir(
    session: &mut Session,
    remote: &RemoteResource,
    dest: &Path,
    options: InstallOptions,
) -> Result<ItemOutcome> {
    if dest.exists() && !options.force {
        return Ok(ItemOutcome::Skipped);
    }

    let files = skill_files(session, remote)?;
    if files.is_empty() {
        return Err(DroidFactoryError::LoadFailed {
            location: remote.url.clone(),
            reason: "no files found in skill directory".to_string(),
        });
    }
    if options.dry_run {
        return Ok(ItemOutcome::Written);
    }

    let staging = staging_path(dest)?;
    let outcome = stage_skill(session, remote, &files, &staging).and_then(|_| commit_dir(&staging, dest));
    if outcome.is_err() && staging.exists() {
        let _ = fs::remove_dir_all(&staging);
    }
    outcome
}

fn skill_files(session: &mut Session, remote: &RemoteResource) -> Result<Vec<String>> {
    match &remote.repo {
        RemoteRepo::GitHub {
            owner,
            repo,
            git_ref,
        } => {
            let source = GitHubSource {
                owner: owner.clone(),
                repo: repo.clone(),
                git_ref: git_ref.clone(),
                path: remote.path.clone(),
            };
            github_files_under(session, &source, &remote.path)
        }
        RemoteRepo::GitLab {
            namespace_path,
            repo,
            git_ref,
        } => {
            let source = GitLabSource {
                namespace_path: namespace_path.clone(),
                repo: repo.clone(),
                git_ref: git_ref.clone(),
                path: remote.path.clone(),
            };
            gitlab_files_under(session, &source, &remote.path)
        }
    }
}

fn stage_skill(
    session: &mut Session,
    remote: &RemoteResource,
    files: &[String],
    staging: &Path,
) -> Result<()> {
    let prefix = format!("{}/", remote.path.trim_end_matches('/'));
    for path in files {
        let rel = path.strip_prefix(&prefix).unwrap_or(path);
        let url = match &remote.repo {
            RemoteRepo::GitHub {
                owner,
                repo,
                git_ref,
            } => session.endpoints.github_raw_url(owner, repo, git_ref, path)?,
            RemoteRepo::GitLab {
                namespace_path,
                repo,
                git_ref,
            } => session.endpoints.gitlab_raw_url(namespace_path, repo, git_ref, path)?,
        };
        let response = session.http.get(&url, auth_for(&remote.repo))?.error_for_status()?;

        let target = staging.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &response.body)?;
    }
    Ok(())
}

/// Move a fully staged skill into place, or drop it when `dest` already
/// holds the same files
fn commit_dir(staging: &Path, dest: &Path) -> Result<ItemOutcome> {
    if dest.is_dir() {
        let staged = list_dir_files(staging)?;
        if staged.len() == list_dir_files(dest)?.len() && dir_matches(staging, &staged, dest)? {
            fs::remove_dir_all(staging)?;
            return Ok(ItemOutcome::Unchanged);
        }
        fs::remove_dir_all(dest)?;
    } else if dest.exists() {
        fs::remove_file(dest)?;
    }
    fs::rename(staging, dest)?;
    Ok(ItemOutcome::Written)
}
