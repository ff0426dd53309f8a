//! # Application State Management
//!
//! [`AppState`] bundles the repository, the authentication collaborators and the
//! resolved configuration. It is built once at startup and shared across handlers
//! in an `Arc`.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nuget_feed::{config::Config, state::AppState, storage::MemoryStorage};
//!
//! let state = Arc::new(AppState::from_config(Config::default(), Arc::new(MemoryStorage::new()))?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::auth::{ConfiguredPermissions, ConfiguredUsers, IdentityVerifier, PermissionChecker};
use crate::config::{Config, ConfigError};
use crate::identity::PackageIdentity;
use crate::nuspec::NuspecField;
use crate::repository::Repository;
use crate::storage::Storage;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Application state containing shared configuration and resources.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<Repository>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub permissions: Arc<dyn PermissionChecker>,
    /// Public base URL of the feed, ending in `/`
    pub base_url: Url,
    pub config: Arc<Config>,
}

impl AppState {
    /// State with config-backed users and permissions over `storage`.
    pub fn from_config(config: Config, storage: Arc<dyn Storage>) -> Result<Self, ConfigError> {
        let base_url = config.base_url()?;
        let repository =
            Repository::new(storage).with_descriptor_limit(config.max_descriptor_size_bytes());
        Ok(Self {
            repository: Arc::new(repository),
            verifier: Arc::new(ConfiguredUsers::from_config(&config.security)),
            permissions: Arc::new(ConfiguredPermissions::from_config(&config.security)),
            base_url,
            config: Arc::new(config),
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Path the feed is mounted at, without a trailing slash (empty at the root)
    pub fn mount_path(&self) -> &str {
        self.base_url.path().trim_end_matches('/')
    }

    /// Absolute URL of a feed resource given its path relative to the base URL
    pub fn resource_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `<base>/package/<id>/<version>/<id>.<version>.nupkg`
    pub fn package_content_url(&self, identity: &PackageIdentity) -> String {
        self.resource_url(&format!(
            "package/{}/{}/{}",
            identity.id().lower(),
            identity.version().normalized(),
            identity.archive_file_name()
        ))
    }
}

/// Body returned by successful write operations
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}
