//! Package archive (`.nupkg`) reader
//!
//! A package is a zip container holding exactly one `.nuspec` descriptor next to
//! its payload. Only the descriptor entry is decompressed.

use crate::identity::PackageIdentity;
use crate::nuspec::{Nuspec, NuspecError};
use std::io::{Cursor, Read};
use tracing::{debug, warn};

/// Suffix identifying the descriptor entry
pub const DESCRIPTOR_EXTENSION: &str = ".nuspec";

/// Default upper bound on the decompressed descriptor (1 MiB)
pub const DEFAULT_DESCRIPTOR_LIMIT: u64 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Package is not a readable zip archive: {0}")]
    InvalidArchive(String),

    #[error("No .nuspec file found inside the package")]
    MissingDescriptor,

    #[error("Multiple .nuspec files found inside the package: {}", .entries.join(", "))]
    AmbiguousDescriptor { entries: Vec<String> },

    #[error(transparent)]
    Descriptor(#[from] NuspecError),
}

/// Reads metadata out of package archive bytes.
pub struct PackageArchive<'a> {
    bytes: &'a [u8],
    descriptor_limit: u64,
}

impl<'a> PackageArchive<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            descriptor_limit: DEFAULT_DESCRIPTOR_LIMIT,
        }
    }

    /// Reject descriptors that decompress to more than `limit` bytes
    pub fn with_descriptor_limit(mut self, limit: u64) -> Self {
        self.descriptor_limit = limit;
        self
    }

    /// Identity declared by the archive's descriptor
    pub fn read_meta(&self) -> Result<PackageIdentity, ArchiveError> {
        Ok(self.read_nuspec()?.identity())
    }

    /// Locate, decompress and parse the single descriptor entry.
    pub fn read_nuspec(&self) -> Result<Nuspec, ArchiveError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(self.bytes))
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

        let mut descriptors: Vec<String> = archive
            .file_names()
            .filter(|name| name.ends_with(DESCRIPTOR_EXTENSION))
            .map(str::to_string)
            .collect();
        let name = match descriptors.len() {
            0 => {
                warn!(entries = archive.len(), "Package has no descriptor");
                return Err(ArchiveError::MissingDescriptor);
            }
            1 => descriptors.remove(0),
            _ => {
                descriptors.sort();
                warn!(entries = ?descriptors, "Package has more than one descriptor");
                return Err(ArchiveError::AmbiguousDescriptor {
                    entries: descriptors,
                });
            }
        };

        let mut entry = archive
            .by_name(&name)
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;
        if entry.size() > self.descriptor_limit {
            return Err(NuspecError::Malformed(format!(
                "descriptor is {} bytes, limit is {}",
                entry.size(),
                self.descriptor_limit
            ))
            .into());
        }

        let mut xml = Vec::new();
        (&mut entry)
            .take(self.descriptor_limit + 1)
            .read_to_end(&mut xml)
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;
        if xml.len() as u64 > self.descriptor_limit {
            return Err(NuspecError::Malformed(format!(
                "descriptor exceeds {} bytes",
                self.descriptor_limit
            ))
            .into());
        }
        debug!(entry = %name, size = xml.len(), "Read package descriptor");

        Ok(Nuspec::parse(xml)?)
    }
}
