//! Repository tests against the filesystem backend

use nuget_feed::{
    nuspec::{NuspecField, PackageId},
    storage::FileStorage,
    Repository, RepositoryError,
};
use std::sync::Arc;
use tempfile::TempDir;

mod common;
use common::{nupkg, NupkgBuilder};

fn repository(dir: &TempDir) -> Repository {
    Repository::new(Arc::new(FileStorage::new(dir.path())))
}

#[tokio::test]
async fn test_publish_lays_out_files() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let repository = repository(&temp_dir);

    repository
        .publish(nupkg("Newtonsoft.Json", "12.0.3"))
        .await
        .expect("publish should succeed");

    let root = temp_dir.path();
    assert!(root
        .join("newtonsoft.json/12.0.3/newtonsoft.json.12.0.3.nupkg")
        .is_file());
    assert!(root
        .join("newtonsoft.json/12.0.3/newtonsoft.json.nuspec")
        .is_file());

    let index = std::fs::read_to_string(root.join("newtonsoft.json/newtonsoft.json.json"))
        .expect("index should exist");
    assert_eq!(index, r#"{"versions":["12.0.3"]}"#);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    repository(&temp_dir)
        .publish(nupkg("Foo", "1.0.0"))
        .await
        .expect("publish should succeed");

    let reopened = repository(&temp_dir);
    let id = PackageId::new("FOO").expect("valid id");
    let versions = reopened.versions(&id).await.expect("versions should load");
    assert_eq!(versions.len(), 1);

    let err = reopened
        .publish(nupkg("Foo", "1.0.0"))
        .await
        .expect_err("duplicate across restarts");
    assert!(matches!(err, RepositoryError::DuplicatePublish { .. }));
}

#[tokio::test]
async fn test_descriptor_bytes_are_stored_verbatim() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let repository = repository(&temp_dir);
    let builder = NupkgBuilder::new("Foo", "1.0.0-Beta").description("A package");

    let result = repository
        .publish(builder.build())
        .await
        .expect("publish should succeed");
    assert_eq!(result.identity.version().normalized(), "1.0.0-beta");

    let stored = std::fs::read_to_string(temp_dir.path().join("foo/1.0.0-beta/foo.nuspec"))
        .expect("descriptor should exist");
    assert_eq!(stored, builder.nuspec());

    let nuspec = repository
        .descriptor(&result.identity)
        .await
        .expect("descriptor should load")
        .expect("descriptor should exist");
    assert_eq!(nuspec.description(), Some("A package"));
}

#[tokio::test]
async fn test_concurrent_publishes_on_disk() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let repository = Arc::new(repository(&temp_dir));

    let handles: Vec<_> = (0..8)
        .map(|patch| {
            let repository = repository.clone();
            tokio::spawn(async move {
                repository
                    .publish(nupkg("Busy", &format!("1.0.{patch}")))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle
            .await
            .expect("task should not panic")
            .expect("publish should succeed");
    }

    let id = PackageId::new("busy").expect("valid id");
    let versions: Vec<String> = repository
        .versions(&id)
        .await
        .expect("versions should load")
        .iter()
        .map(|v| v.to_string())
        .collect();
    assert_eq!(
        versions,
        (0..8).map(|patch| format!("1.0.{patch}")).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_overlong_version_is_rejected_before_touching_disk() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let repository = repository(&temp_dir);

    let err = repository
        .publish(nupkg("Foo", &format!("1.0.0-{}", "a".repeat(300))))
        .await
        .expect_err("version is too long");
    assert!(matches!(err, RepositoryError::Archive(_)));
    assert_eq!(
        std::fs::read_dir(temp_dir.path())
            .expect("should read temp dir")
            .count(),
        0
    );
}
