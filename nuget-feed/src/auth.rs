//! Authentication and authorization for feed routes
//!
//! Credentials are read from `Authorization: Basic`, `Authorization: Bearer` or
//! the `X-NuGet-ApiKey` header. An [`IdentityVerifier`] turns them into a
//! [`Principal`]; requests without credentials run as the anonymous principal.
//! A [`PermissionChecker`] then decides whether the principal may perform the
//! route's [`Action`].
//!
//! Failures are reported as 401 when the caller could fix them by presenting
//! (valid) credentials and as 403 when an authenticated user lacks permission.

use crate::config::SecurityConfig;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header used by NuGet clients to send API keys
pub const API_KEY_HEADER: &str = "x-nuget-apikey";

/// Operation a route performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Discovery, metadata and content downloads
    Read,
    /// Publishing
    Write,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => f.write_str("read"),
            Action::Write => f.write_str("write"),
        }
    }
}

/// Credentials presented by a request
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Token(_) => f.write_str("Token(..)"),
        }
    }
}

impl Credentials {
    /// Extract credentials from request headers.
    ///
    /// Returns `Ok(None)` when no credentials are present and
    /// [`AppError::InvalidCredentials`] when a header is present but unusable.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, AppError> {
        if let Some(value) = headers.get(header::AUTHORIZATION) {
            let value = value.to_str().map_err(|_| AppError::InvalidCredentials)?;
            let (scheme, param) = value
                .split_once(' ')
                .ok_or(AppError::InvalidCredentials)?;
            let param = param.trim();
            return if scheme.eq_ignore_ascii_case("basic") {
                Self::decode_basic(param).map(Some)
            } else if scheme.eq_ignore_ascii_case("bearer") && !param.is_empty() {
                Ok(Some(Credentials::Token(param.to_string())))
            } else {
                Err(AppError::InvalidCredentials)
            };
        }

        match headers.get(API_KEY_HEADER) {
            Some(value) => {
                let key = value.to_str().map_err(|_| AppError::InvalidCredentials)?.trim();
                if key.is_empty() {
                    return Err(AppError::InvalidCredentials);
                }
                Ok(Some(Credentials::Token(key.to_string())))
            }
            None => Ok(None),
        }
    }

    fn decode_basic(encoded: &str) -> Result<Self, AppError> {
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| AppError::InvalidCredentials)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AppError::InvalidCredentials)?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or(AppError::InvalidCredentials)?;
        Ok(Credentials::Basic {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Who a request runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: String,
    anonymous: bool,
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            anonymous: false,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
            anonymous: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

/// Resolves credentials to a principal.
pub trait IdentityVerifier: Send + Sync {
    /// `None` when the credentials are not valid
    fn authenticate(&self, credentials: &Credentials) -> Option<Principal>;
}

/// Decides whether a principal may perform an action on a resource.
pub trait PermissionChecker: Send + Sync {
    fn allowed(&self, principal: &Principal, action: Action, resource: &str) -> bool;
}

/// Users listed in the configuration file.
///
/// Basic credentials match a user's password or API key; tokens match API keys.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredUsers {
    passwords: HashMap<String, String>,
    api_keys: HashMap<String, String>,
}

impl ConfiguredUsers {
    pub fn from_config(security: &SecurityConfig) -> Self {
        let mut users = Self::default();
        for user in &security.users {
            users
                .passwords
                .insert(user.name.clone(), user.password.clone());
            if let Some(key) = &user.api_key {
                users.api_keys.insert(key.clone(), user.name.clone());
            }
        }
        users
    }
}

impl IdentityVerifier for ConfiguredUsers {
    fn authenticate(&self, credentials: &Credentials) -> Option<Principal> {
        match credentials {
            Credentials::Basic { username, password } => {
                let by_password = self.passwords.get(username) == Some(password);
                let by_key = self.api_keys.get(password) == Some(username);
                (by_password || by_key).then(|| Principal::user(username.clone()))
            }
            Credentials::Token(token) => self.api_keys.get(token).map(Principal::user),
        }
    }
}

/// Per-user permissions from the configuration file, plus the actions granted
/// to anonymous requests.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPermissions {
    anonymous: Vec<Action>,
    users: HashMap<String, Vec<Action>>,
}

impl ConfiguredPermissions {
    pub fn from_config(security: &SecurityConfig) -> Self {
        Self {
            anonymous: security.anonymous_actions(),
            users: security
                .users
                .iter()
                .map(|user| (user.name.clone(), user.permissions.clone()))
                .collect(),
        }
    }
}

impl PermissionChecker for ConfiguredPermissions {
    fn allowed(&self, principal: &Principal, action: Action, _resource: &str) -> bool {
        if self.anonymous.contains(&action) {
            return true;
        }
        !principal.is_anonymous()
            && self
                .users
                .get(principal.name())
                .is_some_and(|actions| actions.contains(&action))
    }
}

/// Middleware state: the action a group of routes requires.
#[derive(Clone)]
pub struct Gate {
    pub state: Arc<AppState>,
    pub action: Action,
}

impl Gate {
    pub fn new(state: Arc<AppState>, action: Action) -> Self {
        Self { state, action }
    }
}

/// Authorization middleware. Only runs for requests that matched a route, so
/// unknown paths and unsupported methods never reach it.
///
/// On success the resolved [`Principal`] is stored in the request extensions.
pub async fn authorize(
    State(gate): State<Gate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = match Credentials::from_headers(req.headers())? {
        None => Principal::anonymous(),
        Some(credentials) => match gate.state.verifier.authenticate(&credentials) {
            Some(principal) => principal,
            None => {
                warn!(credentials = ?credentials, path = %req.uri().path(), "Rejected invalid credentials");
                return Err(AppError::InvalidCredentials);
            }
        },
    };

    let resource = req.uri().path().to_string();
    if !gate
        .state
        .permissions
        .allowed(&principal, gate.action, &resource)
    {
        warn!(user = %principal.name(), action = %gate.action, resource = %resource, "Access denied");
        return Err(if principal.is_anonymous() {
            AppError::Unauthenticated
        } else {
            AppError::Unauthorized {
                action: gate.action,
                resource,
            }
        });
    }

    debug!(user = %principal.name(), action = %gate.action, "Request authorized");
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
