//! # Blob Storage
//!
//! The feed stores every artifact (archives, descriptors, version indexes) as an
//! opaque blob addressed by a slash-delimited [`Key`]. The [`Storage`] trait is the
//! only way the rest of the crate touches bytes, so backends can be swapped freely.
//!
//! Two backends ship with the crate:
//!
//! - [`FileStorage`]: keys map to files under a root directory; writes go to a
//!   temporary file first and are renamed into place.
//! - [`MemoryStorage`]: an in-process map, handy for tests and embedding.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Maximum number of segments in a key
const MAX_KEY_DEPTH: usize = 10;

/// Storage failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(Key),

    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Storage I/O failure at '{key}': {source}")]
    Io {
        key: Key,
        #[source]
        source: std::io::Error,
    },
}

/// A validated, relative, slash-delimited storage key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(String);

impl Key {
    /// Validate a key.
    ///
    /// Keys are relative, contain no empty, `.` or `..` segments, no backslashes,
    /// no control characters and at most ten segments.
    pub fn new(key: impl Into<String>) -> Result<Self, StorageError> {
        let key = key.into();
        let invalid = |reason| StorageError::InvalidKey {
            key: key.clone(),
            reason,
        };

        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        if key.chars().any(|c| c.is_control() || c == '\\') {
            return Err(invalid("key contains control characters or backslashes"));
        }
        let segments: Vec<&str> = key.split('/').collect();
        if segments.len() > MAX_KEY_DEPTH {
            return Err(invalid("key is nested too deeply"));
        }
        if segments
            .iter()
            .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Err(invalid("key has an empty or relative segment"));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the key
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asynchronous blob storage.
///
/// Operations on independent keys may complete in any order; callers that need
/// ordering between keys must await each step.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `content` at `key`, replacing any previous value
    async fn save(&self, key: &Key, content: Bytes) -> Result<(), StorageError>;

    /// Load the value at `key`; fails with [`StorageError::NotFound`] if absent
    async fn load(&self, key: &Key) -> Result<Bytes, StorageError>;

    async fn exists(&self, key: &Key) -> Result<bool, StorageError>;

    /// Remove the value at `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &Key) -> Result<(), StorageError>;
}

/// Filesystem-backed storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &Key) -> PathBuf {
        key.as_str()
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

fn io_error(key: &Key) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        key: key.clone(),
        source,
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, key: &Key, content: Bytes) -> Result<(), StorageError> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error(key))?;
            debug!(parent = %parent.display(), "Created parent directory");
        }

        let temp = path.with_file_name(format!(
            ".{}.{}.{}.tmp",
            key.file_name(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, &content).await.map_err(io_error(key))?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_error(key)(e));
        }

        info!(key = %key, size = content.len(), "Blob saved");
        Ok(())
    }

    async fn load(&self, key: &Key) -> Result<Bytes, StorageError> {
        match fs::read(self.path(key)).await {
            Ok(data) => {
                debug!(key = %key, size = data.len(), "Blob loaded");
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.clone()))
            }
            Err(e) => Err(io_error(key)(e)),
        }
    }

    async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        let path = self.path(key);
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(key)(e)),
        }
    }

    async fn delete(&self, key: &Key) -> Result<(), StorageError> {
        match fs::remove_file(self.path(key)).await {
            Ok(()) => {
                info!(key = %key, "Blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key)(e)),
        }
    }
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: RwLock<BTreeMap<Key, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored keys, in key order
    pub async fn keys(&self) -> Vec<Key> {
        self.blobs.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, key: &Key, content: Bytes) -> Result<(), StorageError> {
        self.blobs.write().await.insert(key.clone(), content);
        Ok(())
    }

    async fn load(&self, key: &Key) -> Result<Bytes, StorageError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.clone()))
    }

    async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn delete(&self, key: &Key) -> Result<(), StorageError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
