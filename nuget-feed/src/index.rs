//! # Version Index
//!
//! Per-package list of published versions, stored as `{"versions": [...]}`.
//!
//! [`VersionIndex`] is an immutable value: [`VersionIndex::add`] returns a new index
//! and persistence is a separate step owned by the repository. Stored order is
//! insertion order; [`VersionIndex::all`] computes the precedence order on read.

use crate::nuspec::NuspecField;
use crate::version::PackageVersion;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Version index is corrupt: {0}")]
    Corrupt(String),

    #[error("Failed to encode version index: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionIndex {
    versions: Vec<String>,
    /// Unknown top-level fields survive a load/add/serialize cycle
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl VersionIndex {
    /// Index with no versions
    pub fn empty() -> Self {
        Self {
            versions: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Decode a stored index.
    pub fn load(bytes: &[u8]) -> Result<Self, IndexError> {
        serde_json::from_slice(bytes).map_err(|e| IndexError::Corrupt(e.to_string()))
    }

    /// New index with the field's normalized value appended.
    ///
    /// No deduplication happens here; the repository rejects duplicate
    /// publishes before an index is ever updated.
    pub fn add(&self, version: &impl NuspecField) -> Self {
        let mut versions = self.versions.clone();
        versions.push(version.normalized());
        Self {
            versions,
            extra: self.extra.clone(),
        }
    }

    /// All versions in ascending precedence order
    pub fn all(&self) -> Result<Vec<PackageVersion>, IndexError> {
        let mut parsed = self
            .versions
            .iter()
            .map(|text| {
                PackageVersion::parse(text)
                    .map_err(|e| IndexError::Corrupt(format!("stored entry is unusable: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        parsed.sort();
        Ok(parsed)
    }

    /// Stored version strings, in insertion order
    pub fn entries(&self) -> &[String] {
        &self.versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// JSON encoding ready to be written to storage
    pub fn serialize(&self) -> Result<Bytes, IndexError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

impl Default for VersionIndex {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nuspec::VersionField;

    fn field(text: &str) -> VersionField {
        VersionField::new(text).expect("version should parse")
    }

    fn strings(versions: &[PackageVersion]) -> Vec<String> {
        versions.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_empty_index_encoding() {
        let bytes = VersionIndex::empty().serialize().expect("should encode");
        assert_eq!(&bytes[..], br#"{"versions":[]}"#);
    }

    #[test]
    fn test_add_returns_new_index() {
        let empty = VersionIndex::empty();
        let one = empty.add(&field("1.0.0"));
        assert!(empty.is_empty(), "original index must not change");
        assert_eq!(one.entries(), ["1.0.0"]);
    }

    #[test]
    fn test_add_stores_normalized_value() {
        let index = VersionIndex::empty().add(&field("1.0.0.0-Beta+abc"));
        assert_eq!(index.entries(), ["1.0.0-beta"]);
    }

    #[test]
    fn test_all_is_sorted_regardless_of_insertion_order() {
        let index = ["2.0.0", "1.0.0-rc.1", "1.10.0", "1.2.0", "1.0.0"]
            .iter()
            .fold(VersionIndex::empty(), |index, v| index.add(&field(v)));
        assert_eq!(
            strings(&index.all().expect("index should be readable")),
            ["1.0.0-rc.1", "1.0.0", "1.2.0", "1.10.0", "2.0.0"]
        );
        assert_eq!(index.entries()[0], "2.0.0", "storage order is insertion order");
    }

    #[test]
    fn test_added_version_appears_exactly_once() {
        let index = VersionIndex::empty()
            .add(&field("1.0.0"))
            .add(&field("3.0.0"));
        let added = field("2.0.0");
        let all = index.add(&added).all().expect("index should be readable");
        assert_eq!(all.iter().filter(|v| *v == added.version()).count(), 1);
    }

    #[test]
    fn test_round_trip() {
        let index = VersionIndex::empty()
            .add(&field("1.0.0"))
            .add(&field("0.9.0-alpha"));
        let bytes = index.serialize().expect("should encode");
        assert_eq!(VersionIndex::load(&bytes).expect("should decode"), index);
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let index = VersionIndex::load(br#"{"versions":["1.0.0"],"owner":"team"}"#)
            .expect("should decode");
        let updated = index.add(&field("1.1.0"));
        let json: Value =
            serde_json::from_slice(&updated.serialize().expect("should encode")).expect("json");
        assert_eq!(json["owner"], "team");
        assert_eq!(json["versions"], serde_json::json!(["1.0.0", "1.1.0"]));
    }

    #[test]
    fn test_corrupt_indexes_are_rejected() {
        for bytes in [
            &b"not json"[..],
            br#"{}"#,
            br#"{"versions":"1.0.0"}"#,
            br#"{"versions":[1]}"#,
            br#"["1.0.0"]"#,
        ] {
            assert!(
                matches!(VersionIndex::load(bytes), Err(IndexError::Corrupt(_))),
                "{:?} should be corrupt",
                String::from_utf8_lossy(bytes)
            );
        }
    }

    #[test]
    fn test_unparseable_stored_version_is_corrupt() {
        let index = VersionIndex::load(br#"{"versions":["1.0.0","banana"]}"#)
            .expect("structure is valid");
        assert!(matches!(index.all(), Err(IndexError::Corrupt(_))));
    }
}
