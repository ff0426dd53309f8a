//! # Configuration Management
//!
//! The feed is configured from a JSON file. Every section is optional and falls
//! back to the defaults below, so an empty object `{}` is a valid configuration.
//!
//! - [`ServerConfig`]: bind address and the public base URL
//! - [`StorageConfig`]: where package blobs live
//! - [`LimitsConfig`]: upload and descriptor size limits
//! - [`SecurityConfig`]: users, API keys and anonymous permissions
//! - [`RegistrationConfig`]: registration endpoint behaviour
//!
//! ```rust,no_run
//! # use nuget_feed::config::Config;
//! // Load from file with fallback to defaults
//! let config = Config::load_or_default("nuget-feed.json")?;
//!
//! // Load from file (fails if file doesn't exist)
//! let config = Config::load("nuget-feed.json")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::auth::Action;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Main configuration structure for the feed server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub security: SecurityConfig,
    pub registration: RegistrationConfig,
}

/// Server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host/IP address to bind to
    pub host: String,
    pub port: u16,
    /// Public URL clients use to reach the feed. Its path is where the feed is
    /// mounted; resource URLs in responses are built from it.
    pub base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3080,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_upload_size_mb: usize,
    /// Largest decompressed `.nuspec` accepted inside an archive
    pub max_descriptor_size_kb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_upload_size_mb: 100,
            max_descriptor_size_kb: 1024,
        }
    }
}

/// A configured user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub password: String,
    /// Token accepted via `Authorization: Bearer` or `X-NuGet-ApiKey`
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub permissions: Vec<Action>,
}

/// Security configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub require_authentication: bool,
    /// Actions allowed without credentials. When absent this is every action
    /// unless `require_authentication` is set.
    pub anonymous_permissions: Option<Vec<Action>>,
    pub users: Vec<UserConfig>,
}

impl SecurityConfig {
    /// Actions granted to requests without credentials
    pub fn anonymous_actions(&self) -> Vec<Action> {
        match &self.anonymous_permissions {
            Some(actions) => actions.clone(),
            None if self.require_authentication => Vec::new(),
            None => vec![Action::Read, Action::Write],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Answer 404 instead of an empty registration for unknown packages
    pub not_found_for_unknown_package: bool,
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not match the configuration format.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&config_str).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from file with fallback to defaults when the file
    /// doesn't exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> usize {
        self.limits.max_upload_size_mb * 1024 * 1024
    }

    /// Get the maximum descriptor size in bytes.
    pub fn max_descriptor_size_bytes(&self) -> u64 {
        self.limits.max_descriptor_size_kb * 1024
    }

    /// Public base URL of the feed, always ending in `/`.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.server.port));
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: raw.clone(),
            reason,
        };

        let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("expected an http or https URL".to_string()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query strings and fragments are not allowed".to_string()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}
