//! NuGet v3 HTTP surface
//!
//! All feed routes hang off the path of the configured base URL:
//!
//! | method | path                                         | action |
//! |--------|----------------------------------------------|--------|
//! | GET    | `index.json`                                 | read   |
//! | PUT    | `package`                                    | write  |
//! | GET    | `registration/{id}/index.json`               | read   |
//! | GET    | `package/{id}/index.json`                    | read   |
//! | GET    | `package/{id}/{version}/{id}.{version}.nupkg`| read   |
//! | GET    | `package/{id}/{version}/{id}.nuspec`         | read   |
//!
//! `GET /health` sits outside the feed and needs no credentials.
//!
//! The authorization gate is attached with `route_layer`, so it only runs for
//! requests that matched a route and method. Unknown paths answer 404 and
//! known paths with an unsupported method answer 405, both before any
//! credential is looked at.

use crate::auth::{authorize, Action, Gate, Principal};
use crate::error::{AppError, AppResult};
use crate::identity::PackageIdentity;
use crate::nuspec::{DependencyGroup, NuspecField, PackageId, VersionField};
use crate::state::{AppState, SuccessResponse};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, OriginalUri, Path, Request, State},
    Extension,
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use http_body_util::LengthLimitError;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const PUBLISH_RESOURCE: &str = "PackagePublish/2.0.0";
const REGISTRATION_RESOURCE: &str = "RegistrationsBaseUrl/Versioned";
const CONTENT_RESOURCE: &str = "PackageBaseAddress/3.0.0";

/// Build the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let read = Router::new()
        .route("/index.json", get(service_index))
        .route("/registration/{id}/index.json", get(registration))
        .route("/package/{id}/index.json", get(package_versions))
        .route("/package/{id}/{version}/{file}", get(package_content))
        .route_layer(middleware::from_fn_with_state(
            Gate::new(state.clone(), Action::Read),
            authorize,
        ));

    let write = Router::new()
        .route("/package", put(publish))
        .route_layer(middleware::from_fn_with_state(
            Gate::new(state.clone(), Action::Write),
            authorize,
        ));

    let feed = read
        .merge(write)
        .method_not_allowed_fallback(unsupported_method);

    let app = match state.mount_path() {
        "" => Router::new().merge(feed),
        mount => Router::new().nest(mount, feed),
    };

    app.route("/health", get(health))
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(state.config.max_upload_size_bytes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ServiceIndex {
    version: &'static str,
    resources: Vec<ServiceResource>,
}

#[derive(Debug, Serialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    kind: &'static str,
}

/// `GET <base>/index.json`
async fn service_index(State(state): State<Arc<AppState>>) -> Json<ServiceIndex> {
    Json(ServiceIndex {
        version: "3.0.0",
        resources: vec![
            ServiceResource {
                id: state.resource_url("package"),
                kind: PUBLISH_RESOURCE,
            },
            ServiceResource {
                id: state.resource_url("registration"),
                kind: REGISTRATION_RESOURCE,
            },
            ServiceResource {
                id: state.resource_url("package"),
                kind: CONTENT_RESOURCE,
            },
        ],
    })
}

/// `PUT <base>/package`
///
/// The body is either the raw archive or a multipart form whose first part is
/// the archive, which is what `dotnet nuget push` sends.
async fn publish(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    request: Request,
) -> AppResult<(StatusCode, Json<SuccessResponse>)> {
    let archive = read_archive(&state, request).await?;
    debug!(user = %principal.name(), size = archive.len(), "Received package upload");

    let result = state.repository.publish(archive).await?;
    info!(
        package = %result.identity,
        size = result.size,
        user = %principal.name(),
        "Publish accepted"
    );

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse {
            message: format!("Package {} published", result.identity),
        }),
    ))
}

async fn read_archive(state: &Arc<AppState>, request: Request) -> AppResult<Bytes> {
    let limit = state.config.max_upload_size_bytes();
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if !is_multipart {
        return axum::body::to_bytes(request.into_body(), limit)
            .await
            .map_err(|e| {
                warn!(limit, error = %e, "Failed to buffer upload");
                if exceeds_limit(&e) {
                    AppError::PayloadTooLarge { limit }
                } else {
                    AppError::BadRequest("Failed to read request body".to_string())
                }
            });
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    match multipart.next_field().await? {
        Some(field) => {
            debug!(field = ?field.name(), file_name = ?field.file_name(), "Reading multipart package part");
            Ok(field.bytes().await?)
        }
        None => {
            warn!("Multipart upload without any part");
            Err(AppError::BadRequest(
                "Multipart upload contains no package".to_string(),
            ))
        }
    }
}

/// Whether a body read failed because it ran past the buffering limit
fn exceeds_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

#[derive(Debug, Serialize)]
struct Registration {
    count: usize,
    items: Vec<RegistrationItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationItem {
    lower: String,
    upper: String,
    catalog_entry: CatalogEntry,
    package_content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    id: String,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authors: Option<String>,
    dependency_groups: Vec<DependencyGroup>,
}

/// `GET <base>/registration/{id}/index.json`
async fn registration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Registration>> {
    let id = parse_id(&id)?;
    let versions = state.repository.versions(&id).await?;
    if versions.is_empty() && state.config.registration.not_found_for_unknown_package {
        return Err(AppError::NotFound(format!("Package {id} not found")));
    }

    let mut items = Vec::with_capacity(versions.len());
    for version in versions {
        let identity = PackageIdentity::new(id.clone(), VersionField::from(version));
        let catalog_entry = match state.repository.descriptor(&identity).await? {
            Some(nuspec) => CatalogEntry {
                id: nuspec.id().raw().to_string(),
                version: nuspec.version().raw().to_string(),
                description: nuspec.description().map(str::to_string),
                authors: nuspec.authors().map(str::to_string),
                dependency_groups: nuspec.dependency_groups().to_vec(),
            },
            None => {
                warn!(package = %identity, "Indexed version has no stored descriptor");
                CatalogEntry {
                    id: id.raw().to_string(),
                    version: identity.version().normalized(),
                    description: None,
                    authors: None,
                    dependency_groups: Vec::new(),
                }
            }
        };
        items.push(RegistrationItem {
            lower: identity.version().normalized(),
            upper: identity.version().normalized(),
            catalog_entry,
            package_content: state.package_content_url(&identity),
        });
    }

    debug!(package = %id, versions = items.len(), "Serving registration");
    Ok(Json(Registration {
        count: items.len(),
        items,
    }))
}

#[derive(Debug, Serialize)]
struct VersionList {
    versions: Vec<String>,
}

/// `GET <base>/package/{id}/index.json`
async fn package_versions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<VersionList>> {
    let id = parse_id(&id)?;
    let versions = state.repository.versions(&id).await?;
    if versions.is_empty() {
        return Err(AppError::NotFound(format!("Package {id} not found")));
    }
    Ok(Json(VersionList {
        versions: versions
            .iter()
            .map(|version| version.to_normalized_string())
            .collect(),
    }))
}

/// `GET <base>/package/{id}/{version}/{file}`
async fn package_content(
    State(state): State<Arc<AppState>>,
    Path((id, version, file)): Path<(String, String, String)>,
) -> AppResult<Response> {
    let identity = PackageIdentity::parse(&id, &version)
        .map_err(|_| AppError::NotFound(format!("Package {id} {version} not found")))?;
    let file = file.to_lowercase();

    let (body, content_type) = if file == identity.archive_file_name() {
        (
            state.repository.content(&identity).await?,
            "application/octet-stream",
        )
    } else if file == identity.nuspec_file_name() {
        (
            state.repository.descriptor_bytes(&identity).await?,
            "application/xml",
        )
    } else {
        return Err(AppError::NotFound(format!(
            "No file {file} in package {identity}"
        )));
    };

    let body = body.ok_or_else(|| AppError::NotFound(format!("Package {identity} not found")))?;
    debug!(package = %identity, file = %file, size = body.len(), "Serving package file");
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(body.len())),
        ],
        body,
    )
        .into_response())
}

fn parse_id(raw: &str) -> AppResult<PackageId> {
    PackageId::new(raw).map_err(|_| AppError::NotFound(format!("Package {raw} not found")))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn route_not_found(method: Method, OriginalUri(uri): OriginalUri) -> AppError {
    debug!(method = %method, path = %uri.path(), "No route matched");
    AppError::RouteNotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

async fn unsupported_method(method: Method, OriginalUri(uri): OriginalUri) -> AppError {
    debug!(method = %method, path = %uri.path(), "Method not supported");
    AppError::UnsupportedMethod {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
