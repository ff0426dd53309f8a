//! Shared helpers for nuget-feed integration tests

#![allow(dead_code)]

use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use nuget_feed::{
    auth::Action,
    config::{Config, UserConfig},
    create_router,
    storage::MemoryStorage,
    AppState,
};
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::write::SimpleFileOptions;

pub const BASE_URL: &str = "http://feed.test/nuget";

/// Builds `.nupkg` archives in memory.
pub struct NupkgBuilder {
    id: String,
    version: String,
    description: Option<String>,
    authors: Option<String>,
    dependencies: Vec<(String, String)>,
}

impl NupkgBuilder {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            description: None,
            authors: None,
            dependencies: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn authors(mut self, authors: &str) -> Self {
        self.authors = Some(authors.to_string());
        self
    }

    pub fn dependency(mut self, id: &str, range: &str) -> Self {
        self.dependencies.push((id.to_string(), range.to_string()));
        self
    }

    pub fn nuspec(&self) -> String {
        let mut metadata = format!(
            "<id>{}</id><version>{}</version>",
            self.id, self.version
        );
        if let Some(description) = &self.description {
            metadata.push_str(&format!("<description>{description}</description>"));
        }
        if let Some(authors) = &self.authors {
            metadata.push_str(&format!("<authors>{authors}</authors>"));
        }
        if !self.dependencies.is_empty() {
            metadata.push_str(r#"<dependencies><group targetFramework="net8.0">"#);
            for (id, range) in &self.dependencies {
                metadata.push_str(&format!(r#"<dependency id="{id}" version="{range}" />"#));
            }
            metadata.push_str("</group></dependencies>");
        }
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd"><metadata>{metadata}</metadata></package>"#
        )
    }

    pub fn build(&self) -> Bytes {
        archive(&[
            (&format!("{}.nuspec", self.id), self.nuspec().as_bytes()),
            ("lib/net8.0/Library.dll", b"MZ"),
        ])
    }
}

/// Zip archive with the given entries
pub fn archive(entries: &[(&str, &[u8])]) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("should start zip entry");
        writer.write_all(data).expect("should write zip entry");
    }
    Bytes::from(writer.finish().expect("should finish zip").into_inner())
}

pub fn nupkg(id: &str, version: &str) -> Bytes {
    NupkgBuilder::new(id, version).build()
}

/// Config for an open feed mounted under [`BASE_URL`]
pub fn open_config() -> Config {
    let mut config = Config::default();
    config.server.base_url = Some(BASE_URL.to_string());
    config
}

/// Config requiring credentials: anonymous reads, `publisher` may write,
/// `reader` may only read.
pub fn secured_config() -> Config {
    let mut config = open_config();
    config.security.require_authentication = true;
    config.security.anonymous_permissions = Some(vec![Action::Read]);
    config.security.users = vec![
        UserConfig {
            name: "publisher".to_string(),
            password: "hunter2".to_string(),
            api_key: Some("publisher-key".to_string()),
            permissions: vec![Action::Read, Action::Write],
        },
        UserConfig {
            name: "reader".to_string(),
            password: "letmein".to_string(),
            api_key: Some("reader-key".to_string()),
            permissions: vec![Action::Read],
        },
    ];
    config
}

/// Router over fresh in-memory storage. The storage handle is returned so tests
/// can inspect what was written.
pub fn test_app(config: Config) -> (Router, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let state = AppState::from_config(config, storage.clone()).expect("test config is valid");
    (create_router(Arc::new(state)), storage)
}

pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}
