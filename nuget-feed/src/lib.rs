//! # NuGet Feed
//!
//! A NuGet v3 compatible package feed. Clients publish `.nupkg` archives and
//! discover, resolve and download packages through the service index,
//! registration and flat-container endpoints.
//!
//! ## Key Modules
//!
//! - [`version`]: version parsing and precedence
//! - [`nuspec`] / [`archive`]: reading identity and metadata out of uploads
//! - [`index`]: the per-package version list
//! - [`repository`]: publish and lookup over a [`storage::Storage`] backend
//! - [`auth`]: credentials, principals and the authorization gate
//! - [`routes`]: the HTTP surface
//! - [`config`], [`state`], [`error`], [`logging`], [`server`]: runtime plumbing

pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod logging;
pub mod nuspec;
pub mod repository;
pub mod routes;
pub mod server;
pub mod state;
pub mod storage;
pub mod version;

// Re-export key types for convenience
pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use identity::PackageIdentity;
pub use repository::{PublishResult, Repository, RepositoryError};
pub use routes::create_router;
pub use server::run_server;
pub use state::AppState;
pub use version::PackageVersion;
