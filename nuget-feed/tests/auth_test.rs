//! Integration tests for the authorization gate
//!
//! Requests are sent straight into the router with `oneshot`, so every case
//! exercises dispatch and authorization in their real order.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use nuget_feed::auth::{Action, IdentityVerifier, PermissionChecker, Principal};
use nuget_feed::{auth::Credentials, create_router, storage::MemoryStorage, AppState};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

mod common;
use common::{basic_auth, nupkg, secured_config, test_app};

fn publish_request(auth: Option<(&str, String)>, archive: Bytes) -> Request<Body> {
    let mut builder = Request::builder().method("PUT").uri("/nuget/package");
    if let Some((name, value)) = auth {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(archive)).unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn status(app: &Router, request: Request<Body>) -> StatusCode {
    app.clone().oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_anonymous_publish_is_unauthenticated_and_writes_nothing() {
    let (app, storage) = test_app(secured_config());

    let response = app
        .oneshot(publish_request(None, nupkg("Foo", "1.0.0")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"nuget-feed\""
    );
    assert!(storage.keys().await.is_empty());
}

#[tokio::test]
async fn test_reader_cannot_publish() {
    let (app, storage) = test_app(secured_config());

    let response = app
        .oneshot(publish_request(
            Some(("authorization", basic_auth("reader", "letmein"))),
            nupkg("Foo", "1.0.0"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "forbidden");
    assert!(storage.keys().await.is_empty());
}

#[tokio::test]
async fn test_publisher_credentials_are_accepted() {
    let (app, _storage) = test_app(secured_config());

    let cases = [
        ("authorization", basic_auth("publisher", "hunter2"), "A"),
        ("authorization", "Bearer publisher-key".to_string(), "B"),
        ("x-nuget-apikey", "publisher-key".to_string(), "C"),
        ("authorization", basic_auth("publisher", "publisher-key"), "D"),
    ];
    for (name, value, id) in cases {
        let status = status(
            &app,
            publish_request(Some((name, value)), nupkg(id, "1.0.0")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{name} credentials for {id}");
    }
}

#[tokio::test]
async fn test_invalid_credentials_are_rejected_even_for_reads() {
    let (app, _storage) = test_app(secured_config());

    let wrong_password = Request::builder()
        .uri("/nuget/index.json")
        .header("authorization", basic_auth("publisher", "wrong"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(status(&app, wrong_password).await, StatusCode::UNAUTHORIZED);

    let garbage = Request::builder()
        .uri("/nuget/index.json")
        .header("authorization", "Basic ???")
        .body(Body::empty())
        .unwrap();
    assert_eq!(status(&app, garbage).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_anonymous_reads_follow_configuration() {
    let (app, _storage) = test_app(secured_config());
    assert_eq!(status(&app, get_request("/nuget/index.json")).await, StatusCode::OK);

    let mut locked = secured_config();
    locked.security.anonymous_permissions = Some(Vec::new());
    let (app, _storage) = test_app(locked);
    assert_eq!(
        status(&app, get_request("/nuget/index.json")).await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status(&app, get_request("/health")).await,
        StatusCode::OK,
        "health stays open"
    );
}

#[tokio::test]
async fn test_authorization_precedes_existence_checks() {
    let mut locked = secured_config();
    locked.security.anonymous_permissions = Some(Vec::new());
    let (app, _storage) = test_app(locked);

    assert_eq!(
        status(&app, get_request("/nuget/package/missing/index.json")).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_dispatch_failures_skip_authorization() {
    let mut locked = secured_config();
    locked.security.anonymous_permissions = Some(Vec::new());
    let (app, _storage) = test_app(locked);

    assert_eq!(
        status(&app, get_request("/nuget/unknown")).await,
        StatusCode::NOT_FOUND
    );

    let delete = Request::builder()
        .method("DELETE")
        .uri("/nuget/package")
        .body(Body::empty())
        .unwrap();
    assert_eq!(status(&app, delete).await, StatusCode::METHOD_NOT_ALLOWED);
}

/// Verifier accepting a single fixed token
struct StaticToken;

impl IdentityVerifier for StaticToken {
    fn authenticate(&self, credentials: &Credentials) -> Option<Principal> {
        match credentials {
            Credentials::Token(token) if token == "ci-token" => Some(Principal::user("ci")),
            _ => None,
        }
    }
}

/// Only `ci` may write, and only to the publish endpoint
struct CiOnly;

impl PermissionChecker for CiOnly {
    fn allowed(&self, principal: &Principal, action: Action, resource: &str) -> bool {
        match action {
            Action::Read => true,
            Action::Write => principal.name() == "ci" && resource.ends_with("/package"),
        }
    }
}

#[tokio::test]
async fn test_injected_collaborators() {
    let state = AppState::from_config(secured_config(), Arc::new(MemoryStorage::new()))
        .expect("test config is valid")
        .with_verifier(Arc::new(StaticToken))
        .with_permissions(Arc::new(CiOnly));
    let app = create_router(Arc::new(state));

    let accepted = publish_request(
        Some(("authorization", "Bearer ci-token".to_string())),
        nupkg("Foo", "1.0.0"),
    );
    assert_eq!(status(&app, accepted).await, StatusCode::CREATED);

    let config_user = publish_request(
        Some(("authorization", basic_auth("publisher", "hunter2"))),
        nupkg("Foo", "2.0.0"),
    );
    assert_eq!(status(&app, config_user).await, StatusCode::UNAUTHORIZED);
}
