//! # Package Versions
//!
//! Parsing and total ordering of NuGet package versions.
//!
//! A version string has the shape `major[.minor[.patch[.revision]]][-label][+metadata]`.
//! Missing `minor` and `patch` components default to zero; a missing revision stays
//! absent but compares as zero. Build metadata is validated and kept, but never takes
//! part in comparisons.
//!
//! ## Precedence
//!
//! 1. `major`, `minor`, `patch` and `revision` compare numerically, in that order.
//! 2. With equal numeric cores, a release orders after any pre-release.
//! 3. Pre-release labels compare identifier by identifier: all-digit identifiers
//!    compare numerically and sort before alphanumeric ones, alphanumeric identifiers
//!    compare by ordinal (case-sensitive) string order, and a label that is a strict
//!    prefix of the other sorts first.
//!
//! ```
//! # use nuget_feed::version::PackageVersion;
//! let beta: PackageVersion = "1.0.0-beta.11".parse().unwrap();
//! let rc: PackageVersion = "1.0.0-rc.1".parse().unwrap();
//! let release: PackageVersion = "1.0.0".parse().unwrap();
//! assert!(beta < rc && rc < release);
//! ```

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Maximum number of numeric components (`major.minor.patch.revision`)
const MAX_NUMERIC_COMPONENTS: usize = 4;

/// Maximum length of a version string, metadata included
pub const MAX_VERSION_LENGTH: usize = 64;

/// Error returned when a version string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("Invalid version format '{input}': {reason}")]
    InvalidFormat { input: String, reason: &'static str },
}

/// A parsed package version.
///
/// Equality follows precedence, so `1.0.0` equals `1.0.0.0` and `1.0.0+build.5`.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: Option<u64>,
    pub prerelease: Vec<String>,
    pub metadata: Option<String>,
}

impl PackageVersion {
    /// Parse a version string, trimming surrounding whitespace.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let invalid = |reason| VersionError::InvalidFormat {
            input: text.to_string(),
            reason,
        };

        let input = text.trim();
        if input.is_empty() {
            return Err(invalid("version is empty"));
        }
        if input.len() > MAX_VERSION_LENGTH {
            return Err(invalid("version is longer than 64 characters"));
        }

        let (rest, metadata) = match input.split_once('+') {
            Some((rest, meta)) => {
                if !is_valid_label(meta) {
                    return Err(invalid("build metadata is malformed"));
                }
                (rest, Some(meta.to_string()))
            }
            None => (input, None),
        };

        let (core, label) = match rest.split_once('-') {
            Some((core, label)) => (core, Some(label)),
            None => (rest, None),
        };

        let numbers = core
            .split('.')
            .map(parse_numeric_component)
            .collect::<Option<Vec<u64>>>()
            .ok_or_else(|| invalid("numeric components must be non-negative integers"))?;
        if numbers.len() > MAX_NUMERIC_COMPONENTS {
            return Err(invalid("at most four numeric components are allowed"));
        }

        let prerelease = match label {
            Some(label) if is_valid_label(label) => {
                label.split('.').map(str::to_string).collect()
            }
            Some(_) => return Err(invalid("pre-release label is malformed")),
            None => Vec::new(),
        };

        Ok(Self {
            major: numbers[0],
            minor: numbers.get(1).copied().unwrap_or(0),
            patch: numbers.get(2).copied().unwrap_or(0),
            revision: numbers.get(3).copied(),
            prerelease,
            metadata,
        })
    }

    /// Whether this version carries a pre-release label
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// Canonical lowercase form used for storage keys and the version index.
    ///
    /// Leading zeros are dropped from numeric components, a zero revision is
    /// omitted and build metadata is stripped: `1.02.3.0-Beta+sha.1` becomes
    /// `1.2.3-beta`.
    pub fn to_normalized_string(&self) -> String {
        let mut normalized = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if let Some(revision) = self.revision.filter(|r| *r != 0) {
            normalized.push_str(&format!(".{revision}"));
        }
        if self.is_prerelease() {
            normalized.push('-');
            normalized.push_str(&self.prerelease.join(".").to_lowercase());
        }
        normalized
    }
}

fn parse_numeric_component(component: &str) -> Option<u64> {
    if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    component.parse().ok()
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.split('.').all(|identifier| {
            !identifier.is_empty()
                && identifier
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn is_numeric_identifier(identifier: &str) -> bool {
    identifier.bytes().all(|b| b.is_ascii_digit())
}

/// Compare two all-digit identifiers without overflowing on long digit runs
fn compare_numeric_identifiers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_identifiers(a: &str, b: &str) -> Ordering {
    match (is_numeric_identifier(a), is_numeric_identifier(b)) {
        (true, true) => compare_numeric_identifiers(a, b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn compare_labels(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare_identifiers(x, y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(self.revision.unwrap_or(0).cmp(&other.revision.unwrap_or(0)))
            .then_with(|| compare_labels(&self.prerelease, &other.prerelease))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_normalized_string())
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
