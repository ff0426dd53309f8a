//! # Error Handling and Response Types
//!
//! Every HTTP-facing failure is an [`AppError`]. Domain layers keep their own
//! error enums ([`RepositoryError`], [`ArchiveError`](crate::archive::ArchiveError),
//! ...) and are folded in here, where each one is classified into an [`ErrorCode`]
//! that fixes the HTTP status.
//!
//! ## Error Response Format
//!
//! ```json
//! {
//!   "error": "Human-readable error message",
//!   "code": "machine_readable_error_code",
//!   "details": {...},
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! Internal failures (storage, corrupt indexes) are logged in full but reported
//! to the client with a generic message.

use crate::auth::Action;
use crate::repository::RepositoryError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

/// Realm announced in `WWW-Authenticate` challenges
pub const AUTH_REALM: &str = "nuget-feed";

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<Value>,
    pub timestamp: String,
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    MethodNotAllowed,
    Conflict,
    UploadError,
    AuthError,
    Forbidden,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::Conflict => "conflict",
            ErrorCode::UploadError => "upload_error",
            ErrorCode::AuthError => "auth_error",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::UploadError => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::AuthError => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not allowed to {action} {resource}")]
    Unauthorized { action: Action, resource: String },

    #[error("No route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Method {method} is not supported for {path}")]
    UnsupportedMethod { method: String, path: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Repository(e) => match e {
                RepositoryError::Archive(_) => ErrorCode::ValidationError,
                RepositoryError::DuplicatePublish { .. } => ErrorCode::Conflict,
                RepositoryError::Index(_)
                | RepositoryError::Descriptor(_)
                | RepositoryError::Storage(_)
                | RepositoryError::Task(_) => ErrorCode::InternalError,
            },
            AppError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ErrorCode::UploadError
            }
            AppError::Multipart(_) | AppError::BadRequest(_) => ErrorCode::ValidationError,
            AppError::Unauthenticated | AppError::InvalidCredentials => ErrorCode::AuthError,
            AppError::Unauthorized { .. } => ErrorCode::Forbidden,
            AppError::RouteNotFound { .. } | AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::UnsupportedMethod { .. } => ErrorCode::MethodNotAllowed,
            AppError::PayloadTooLarge { .. } => ErrorCode::UploadError,
        }
    }

    /// Get additional error details if available
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::Repository(RepositoryError::DuplicatePublish { identity }) => Some(json!({
                "id": identity.id().to_string(),
                "version": identity.version().to_string(),
            })),
            AppError::PayloadTooLarge { limit } => Some(json!({ "limit": limit })),
            _ => None,
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        let code = self.error_code();
        let error = if code == ErrorCode::InternalError {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        ApiErrorResponse {
            error,
            code: code.as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if code == ErrorCode::InternalError {
            tracing::error!(error = %self, source = ?std::error::Error::source(&self), "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let error_response = self.to_error_response();
        tracing::debug!(status = %status, code = %error_response.code, "Returning standardized error response");

        let mut response = (status, axum::Json(error_response)).into_response();
        if code == ErrorCode::AuthError {
            if let Ok(challenge) = HeaderValue::from_str(&format!("Basic realm=\"{AUTH_REALM}\"")) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, challenge);
            }
        }
        response
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
