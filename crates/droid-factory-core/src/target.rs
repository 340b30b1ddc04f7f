//! Install scopes and destination directories
//!
//! - personal: `~/.factory/`
//! - project: `<project>/.factory/`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DroidFactoryError, Result};
use crate::marketplace::ResourceKind;

/// Configuration directory name, in the home or project directory
pub const FACTORY_DIR: &str = ".factory";

/// Agents are installed as droids
pub const DROIDS_DIR: &str = "droids";

/// Where resources are installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallScope {
    /// `~/.factory`
    #[default]
    Personal,
    /// `<project>/.factory`
    Project,
}

impl InstallScope {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Project => "project",
        }
    }

    /// Factory directory for this scope. `project` is the project root
    /// (current directory when `None`) and must exist.
    pub fn factory_dir(&self, project: Option<&Path>) -> Result<PathBuf> {
        match self {
            Self::Personal => {
                let home = dirs::home_dir().ok_or(DroidFactoryError::HomeNotFound)?;
                Ok(home.join(FACTORY_DIR))
            }
            Self::Project => {
                let base = match project {
                    Some(p) => p.to_path_buf(),
                    None => std::env::current_dir()?,
                };
                if !base.is_dir() {
                    return Err(DroidFactoryError::TargetNotFound { path: base });
                }
                Ok(base.join(FACTORY_DIR))
            }
        }
    }
}

impl std::fmt::Display for InstallScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for InstallScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "personal" | "user" | "global" => Ok(Self::Personal),
            "project" | "local" => Ok(Self::Project),
            _ => Err(format!("Unknown scope: {} (expected personal or project)", s)),
        }
    }
}

/// One destination directory per resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestDirs {
    pub commands: PathBuf,
    pub droids: PathBuf,
    pub hooks: PathBuf,
    pub skills: PathBuf,
}

impl DestDirs {
    /// Conventional layout under a factory directory
    pub fn under(root: &Path) -> Self {
        Self {
            commands: root.join("commands"),
            droids: root.join(DROIDS_DIR),
            hooks: root.join("hooks"),
            skills: root.join("skills"),
        }
    }

    pub fn for_scope(scope: InstallScope, project: Option<&Path>) -> Result<Self> {
        Ok(Self::under(&scope.factory_dir(project)?))
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &Path {
        match kind {
            ResourceKind::Commands => &self.commands,
            ResourceKind::Agents => &self.droids,
            ResourceKind::Hooks => &self.hooks,
            ResourceKind::Skills => &self.skills,
        }
    }
}
