use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DroidFactoryError, Result};
use crate::http::Endpoints;
use crate::plan::{CollisionPolicy, PlanOptions};

const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_RAW: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_GITLAB: &str = "https://gitlab.com";
pub const DEFAULT_MAX_SKILL_PROBES: usize = 50;

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# droid-factory configuration file
# Location: ~/.droid-factory/config.toml

[github]
# Environment variable holding a GitHub token (GH_TOKEN is also consulted)
token_env = "GITHUB_TOKEN"
# API and raw-content endpoints (change for GitHub Enterprise)
api_url = "https://api.github.com"
raw_url = "https://raw.githubusercontent.com"

[gitlab]
token_env = "GITLAB_TOKEN"
url = "https://gitlab.com"

[network]
# Per-request timeout in seconds
timeout_secs = 30

[scan]
# Upper bound on SKILL.md probe requests per skills directory
max_skill_probes = 50

[install]
# What to do when two plugins install the same destination name:
#   skip      - keep the first plugin's file, report the rest
#   namespace - rename later files to <plugin>__<name>
#   overwrite - later plugins replace earlier ones
on_collision = "skip"

# Glob patterns matched against flattened resource names
# Example: exclude = ["draft-*", "*__internal"]
exclude = []
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub gitlab: GitlabConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default = "default_github_api")]
    pub api_url: String,
    #[serde(default = "default_github_raw")]
    pub raw_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabConfig {
    #[serde(default = "default_gitlab_token_env")]
    pub token_env: String,
    #[serde(default = "default_gitlab")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_max_skill_probes")]
    pub max_skill_probes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstallConfig {
    #[serde(default)]
    pub on_collision: CollisionPolicy,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_github_api() -> String {
    DEFAULT_GITHUB_API.to_string()
}

fn default_github_raw() -> String {
    DEFAULT_GITHUB_RAW.to_string()
}

fn default_gitlab_token_env() -> String {
    "GITLAB_TOKEN".to_string()
}

fn default_gitlab() -> String {
    DEFAULT_GITLAB.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_skill_probes() -> usize {
    DEFAULT_MAX_SKILL_PROBES
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token_env: default_github_token_env(),
            api_url: default_github_api(),
            raw_url: default_github_raw(),
        }
    }
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            token_env: default_gitlab_token_env(),
            url: default_gitlab(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_skill_probes: default_max_skill_probes(),
        }
    }
}

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|e| DroidFactoryError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "github.token_env" => self.github.token_env = value.to_string(),
            "github.api_url" => self.github.api_url = parse_url(key, value)?,
            "github.raw_url" => self.github.raw_url = parse_url(key, value)?,
            "gitlab.token_env" => self.gitlab.token_env = value.to_string(),
            "gitlab.url" => self.gitlab.url = parse_url(key, value)?,
            "network.timeout_secs" => self.network.timeout_secs = parse_number(key, value)?,
            "scan.max_skill_probes" => self.scan.max_skill_probes = parse_number(key, value)?,
            "install.on_collision" => {
                self.install.on_collision =
                    value
                        .parse()
                        .map_err(|message| DroidFactoryError::InvalidConfigValue {
                            key: key.to_string(),
                            message,
                        })?
            }
            "install.exclude" => {
                let patterns = parse_string_list(value);
                for p in &patterns {
                    glob::Pattern::new(p).map_err(|e| DroidFactoryError::InvalidConfigValue {
                        key: key.to_string(),
                        message: format!("{}: {}", p, e),
                    })?;
                }
                self.install.exclude = patterns;
            }
            _ => {
                return Err(DroidFactoryError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("github.token_env".to_string(), self.github.token_env.clone()),
            ("github.api_url".to_string(), self.github.api_url.clone()),
            ("github.raw_url".to_string(), self.github.raw_url.clone()),
            ("gitlab.token_env".to_string(), self.gitlab.token_env.clone()),
            ("gitlab.url".to_string(), self.gitlab.url.clone()),
            (
                "network.timeout_secs".to_string(),
                self.network.timeout_secs.to_string(),
            ),
            (
                "scan.max_skill_probes".to_string(),
                self.scan.max_skill_probes.to_string(),
            ),
            (
                "install.on_collision".to_string(),
                self.install.on_collision.to_string(),
            ),
            (
                "install.exclude".to_string(),
                format!("{:?}", self.install.exclude),
            ),
        ]
    }

    /// Endpoints for the HTTP layer
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            github_api: self.github.api_url.trim_end_matches('/').to_string(),
            github_raw: self.github.raw_url.trim_end_matches('/').to_string(),
            gitlab: self.gitlab.url.trim_end_matches('/').to_string(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs.max(1))
    }

    /// GitHub token from the configured env var, then GH_TOKEN
    pub fn github_token(&self) -> Option<String> {
        read_env_token(&self.github.token_env).or_else(|| read_env_token("GH_TOKEN"))
    }

    pub fn gitlab_token(&self) -> Option<String> {
        read_env_token(&self.gitlab.token_env)
    }

    /// Compiled exclude patterns (invalid ones are ignored)
    pub fn exclude_patterns(&self) -> Vec<glob::Pattern> {
        self.install
            .exclude
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect()
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            on_collision: self.install.on_collision,
            exclude: self.exclude_patterns(),
        }
    }
}

fn read_env_token(var: &str) -> Option<String> {
    if var.is_empty() {
        return None;
    }
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_url(key: &str, value: &str) -> Result<String> {
    reqwest::Url::parse(value).map_err(|e| DroidFactoryError::InvalidConfigValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| DroidFactoryError::InvalidConfigValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Parse a comma-separated or JSON-like list string
fn parse_string_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    let inner = if trimmed.starts_with('[') && trimmed.ends_with(']') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    inner
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_string_list_comma() {
        assert_eq!(parse_string_list("draft-*,wip"), vec!["draft-*", "wip"]);
    }

    #[test]
    fn test_parse_string_list_json() {
        assert_eq!(
            parse_string_list(r#"["draft-*", "wip"]"#),
            vec!["draft-*", "wip"]
        );
        assert!(parse_string_list("[]").is_empty());
    }

    #[test]
    fn test_init_template_parses_to_defaults() {
        let temp = TempDir::new().unwrap();
        let path = Config::init(temp.path()).unwrap();
        assert!(path.exists());

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.github.api_url, DEFAULT_GITHUB_API);
        assert_eq!(config.scan.max_skill_probes, DEFAULT_MAX_SKILL_PROBES);
        assert_eq!(config.install.on_collision, CollisionPolicy::Skip);
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.network.timeout_secs, 30);
    }

    #[test]
    fn test_config_get_set() {
        let mut config = Config::default();

        config.set("install.on_collision", "namespace").unwrap();
        assert_eq!(config.install.on_collision, CollisionPolicy::Namespace);
        assert_eq!(config.get("install.on_collision").unwrap(), "namespace");

        config.set("scan.max_skill_probes", "5").unwrap();
        assert_eq!(config.scan.max_skill_probes, 5);

        config.set("github.api_url", "https://ghe.example.com/api/v3/").unwrap();
        assert_eq!(config.endpoints().github_api, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_config_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("scan.max_skill_probes", "many").is_err());
        assert!(config.set("install.on_collision", "merge").is_err());
        assert!(config.set("gitlab.url", "not a url").is_err());
        assert!(matches!(
            config.set("nope", "1"),
            Err(DroidFactoryError::ConfigKeyNotFound { .. })
        ));
    }

    #[test]
    fn test_save_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.set("install.exclude", "draft-*").unwrap();
        config.save(temp.path()).unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert_eq!(loaded.install.exclude, vec!["draft-*"]);
        assert_eq!(loaded.exclude_patterns().len(), 1);
    }
}
