//! Package identity and the storage layout derived from it.
//!
//! Every segment of every key is lowercase:
//!
//! | blob       | key                                      |
//! |------------|------------------------------------------|
//! | archive    | `<id>/<version>/<id>.<version>.nupkg`    |
//! | descriptor | `<id>/<version>/<id>.nuspec`             |
//! | index      | `<id>/<id>.json`                         |

use crate::nuspec::{NuspecError, NuspecField, PackageId, VersionField};
use crate::storage::Key;
use std::fmt;

/// Package id plus version. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    id: PackageId,
    version: VersionField,
}

impl PackageIdentity {
    pub fn new(id: PackageId, version: VersionField) -> Self {
        Self { id, version }
    }

    /// Build an identity from raw id and version strings
    pub fn parse(id: &str, version: &str) -> Result<Self, NuspecError> {
        Ok(Self::new(PackageId::new(id)?, VersionField::new(version)?))
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn version(&self) -> &VersionField {
        &self.version
    }

    /// `<id>.<version>.nupkg`
    pub fn archive_file_name(&self) -> String {
        format!("{}.{}.nupkg", self.id.lower(), self.version.normalized())
    }

    /// `<id>.nuspec`
    pub fn nuspec_file_name(&self) -> String {
        format!("{}.nuspec", self.id.lower())
    }

    /// Key of the raw package archive
    pub fn content_key(&self) -> Key {
        self.version_key(&self.archive_file_name())
    }

    /// Key of the descriptor extracted from the archive
    pub fn nuspec_key(&self) -> Key {
        self.version_key(&self.nuspec_file_name())
    }

    fn version_key(&self, file_name: &str) -> Key {
        trusted_key(format!(
            "{}/{}/{}",
            self.id.lower(),
            self.version.normalized(),
            file_name
        ))
    }
}

impl PackageId {
    /// Key of the package's version index
    pub fn versions_key(&self) -> Key {
        trusted_key(format!("{0}/{0}.json", self.lower()))
    }
}

/// Ids and normalized versions only contain `[a-z0-9._-]`, so keys built from
/// them are always valid.
fn trusted_key(key: String) -> Key {
    match Key::new(key) {
        Ok(key) => key,
        Err(e) => unreachable!("validated identity produced an invalid key: {e}"),
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
