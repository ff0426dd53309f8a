//! # Package Repository
//!
//! Coordinates publishing and reading packages on top of a [`Storage`] backend.
//! The repository holds no package state itself; everything lives in storage
//! under the keys derived by [`PackageIdentity`].
//!
//! ## Publishing
//!
//! 1. Read the identity from the archive. Nothing is written if this fails.
//! 2. Reject the upload if an archive already exists for the identity.
//! 3. Store the archive, then the descriptor.
//! 4. Append the version to the package's [`VersionIndex`] and store it.
//!
//! Steps 2-4 run under a per-package-id lock so concurrent publishes of the same
//! package cannot lose index updates. The lock is process-local: several server
//! processes sharing one storage backend can still race on the index.
//!
//! If step 4 fails, the archive and descriptor are removed again so the index
//! never lags behind stored content and the upload can be retried. Steps 2-4
//! run on their own task and finish even when the caller stops waiting.

use crate::archive::{ArchiveError, PackageArchive, DEFAULT_DESCRIPTOR_LIMIT};
use crate::identity::PackageIdentity;
use crate::index::{IndexError, VersionIndex};
use crate::nuspec::{Nuspec, NuspecError, PackageId};
use crate::storage::{Key, Storage, StorageError};
use crate::version::PackageVersion;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Package {identity} already exists")]
    DuplicatePublish { identity: PackageIdentity },

    #[error(transparent)]
    Index(#[from] IndexError),

    /// A stored descriptor could not be parsed
    #[error("Stored descriptor is unreadable: {0}")]
    Descriptor(#[from] NuspecError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The publish task panicked or was cancelled by the runtime
    #[error("Publish task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of a successful publish
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub identity: PackageIdentity,
    /// Size of the stored archive in bytes
    pub size: usize,
}

/// Per-package-id advisory locks. Entries are dropped once nobody holds them.
#[derive(Debug, Default)]
struct PackageLocks {
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl PackageLocks {
    async fn acquire(&self, id: &PackageId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(id.lower()).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(id.lower().to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }
}

/// Package repository over a storage backend.
pub struct Repository {
    storage: Arc<dyn Storage>,
    locks: Arc<PackageLocks>,
    descriptor_limit: u64,
}

impl Repository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: Arc::default(),
            descriptor_limit: DEFAULT_DESCRIPTOR_LIMIT,
        }
    }

    /// Maximum decompressed descriptor size accepted on publish
    pub fn with_descriptor_limit(mut self, limit: u64) -> Self {
        self.descriptor_limit = limit;
        self
    }

    /// Publish a package archive.
    ///
    /// Once the archive has been read, the writes run on a spawned task, so
    /// dropping the returned future does not interrupt them halfway.
    pub async fn publish(&self, archive: Bytes) -> Result<PublishResult, RepositoryError> {
        let nuspec = PackageArchive::new(&archive)
            .with_descriptor_limit(self.descriptor_limit)
            .read_nuspec()?;
        let commit = Commit {
            storage: self.storage.clone(),
            locks: self.locks.clone(),
            identity: nuspec.identity(),
            descriptor: Bytes::copy_from_slice(nuspec.bytes()),
            archive,
        };
        tokio::spawn(commit.run()).await?
    }

    /// All published versions of a package, ascending. Empty if the package is unknown.
    pub async fn versions(&self, id: &PackageId) -> Result<Vec<PackageVersion>, RepositoryError> {
        match load_index(self.storage.as_ref(), &id.versions_key()).await? {
            Some(index) => Ok(index.all()?),
            None => Ok(Vec::new()),
        }
    }

    /// Whether an archive is stored for the identity
    pub async fn exists(&self, identity: &PackageIdentity) -> Result<bool, RepositoryError> {
        Ok(self.storage.exists(&identity.content_key()).await?)
    }

    /// Raw archive bytes, if published
    pub async fn content(&self, identity: &PackageIdentity) -> Result<Option<Bytes>, RepositoryError> {
        self.load_optional(&identity.content_key()).await
    }

    /// Raw descriptor bytes, if published
    pub async fn descriptor_bytes(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Option<Bytes>, RepositoryError> {
        self.load_optional(&identity.nuspec_key()).await
    }

    /// Parsed descriptor, if published
    pub async fn descriptor(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Option<Nuspec>, RepositoryError> {
        match self.descriptor_bytes(identity).await? {
            Some(bytes) => Ok(Some(Nuspec::parse(bytes.to_vec())?)),
            None => Ok(None),
        }
    }

    async fn load_optional(&self, key: &Key) -> Result<Option<Bytes>, RepositoryError> {
        match self.storage.load(key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write phase of a publish, owned so it can outlive the request.
struct Commit {
    storage: Arc<dyn Storage>,
    locks: Arc<PackageLocks>,
    identity: PackageIdentity,
    descriptor: Bytes,
    archive: Bytes,
}

impl Commit {
    async fn run(self) -> Result<PublishResult, RepositoryError> {
        let identity = self.identity.clone();
        let _guard = self.locks.acquire(identity.id()).await;
        debug!(package = %identity, "Acquired package lock");

        let content_key = identity.content_key();
        if self.storage.exists(&content_key).await? {
            warn!(package = %identity, "Rejected duplicate publish");
            return Err(RepositoryError::DuplicatePublish { identity });
        }

        let size = self.archive.len();
        self.storage.save(&content_key, self.archive.clone()).await?;

        let nuspec_key = identity.nuspec_key();
        if let Err(e) = self.storage.save(&nuspec_key, self.descriptor.clone()).await {
            self.rollback(&[&content_key]).await;
            return Err(e.into());
        }

        if let Err(e) = self.append_version().await {
            self.rollback(&[&content_key, &nuspec_key]).await;
            return Err(e);
        }

        info!(package = %identity, size, "Package published");
        Ok(PublishResult { identity, size })
    }

    async fn append_version(&self) -> Result<(), RepositoryError> {
        let key = self.identity.id().versions_key();
        let index = load_index(self.storage.as_ref(), &key)
            .await?
            .unwrap_or_default();
        let updated = index.add(self.identity.version());
        self.storage.save(&key, updated.serialize()?).await?;
        debug!(key = %key, versions = updated.len(), "Version index updated");
        Ok(())
    }

    async fn rollback(&self, keys: &[&Key]) {
        for key in keys {
            if let Err(e) = self.storage.delete(key).await {
                error!(key = %key, error = %e, "Failed to roll back partially published package");
            }
        }
    }
}

async fn load_index(storage: &dyn Storage, key: &Key) -> Result<Option<VersionIndex>, RepositoryError> {
    match storage.load(key).await {
        Ok(bytes) => Ok(Some(VersionIndex::load(&bytes)?)),
        Err(StorageError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
