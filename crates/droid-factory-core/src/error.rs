use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DroidFactoryError {
    #[error("Marketplace manifest not found: {location}")]
    ManifestNotFound { location: String },

    #[error("Failed to parse marketplace manifest {location}: {message}")]
    ManifestParse { location: String, message: String },

    #[error("Failed to load marketplace from {location}: {reason}")]
    LoadFailed { location: String, reason: String },

    #[error("Ref not found: {repo}")]
    RefNotFound { repo: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Too many redirects while fetching {url}")]
    TooManyRedirects { url: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Target directory does not exist: {path}")]
    TargetNotFound { path: PathBuf },

    #[error("Config parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidConfigValue { key: String, message: String },

    #[error("{failed} of {total} items failed to install")]
    InstallFailed { failed: usize, total: usize },

    #[error("Home directory not found")]
    HomeNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, DroidFactoryError>;

impl DroidFactoryError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ManifestNotFound { .. } | Self::ManifestParse { .. } | Self::LoadFailed { .. } => {
                2
            }
            Self::RefNotFound { .. } => 3,
            Self::HttpStatus { .. } | Self::TooManyRedirects { .. } | Self::Http(_) => 4,
            Self::ConfigParse { .. }
            | Self::ConfigKeyNotFound { .. }
            | Self::InvalidConfigValue { .. }
            | Self::TomlSer(_)
            | Self::TomlDe(_) => 5,
            _ => 1,
        }
    }

    /// True when the failure is a plain 404 from a remote endpoint.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_group_by_failure_class() {
        let load = DroidFactoryError::ManifestNotFound {
            location: "/tmp/x".into(),
        };
        let missing_ref = DroidFactoryError::RefNotFound {
            repo: "o/r@dev".into(),
        };
        let status = DroidFactoryError::HttpStatus {
            status: 500,
            url: "https://api.github.com".into(),
        };
        let key = DroidFactoryError::ConfigKeyNotFound { key: "nope".into() };

        assert_eq!(load.exit_code(), 2);
        assert_eq!(missing_ref.exit_code(), 3);
        assert_eq!(status.exit_code(), 4);
        assert_eq!(key.exit_code(), 5);
        assert_eq!(DroidFactoryError::HomeNotFound.exit_code(), 1);
    }

    #[test]
    fn test_not_found_only_matches_404() {
        let nf = DroidFactoryError::HttpStatus {
            status: 404,
            url: "u".into(),
        };
        let other = DroidFactoryError::HttpStatus {
            status: 403,
            url: "u".into(),
        };
        assert!(nf.is_not_found());
        assert!(!other.is_not_found());
    }
}
