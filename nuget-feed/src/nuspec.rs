//! # Package Descriptor (`.nuspec`)
//!
//! Parses the XML descriptor embedded in every package archive and exposes the
//! fields the feed needs: the identity (`/package/metadata/id` and
//! `/package/metadata/version`) plus the optional metadata surfaced in
//! registration catalog entries.
//!
//! Element names are matched by local name, so descriptors with or without the
//! nuspec XML namespace are treated alike. DTDs are rejected by the parser.

use crate::identity::PackageIdentity;
use crate::version::{PackageVersion, VersionError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Maximum length of a package id
pub const MAX_ID_LENGTH: usize = 100;

/// Dot or dash separated runs of ASCII word characters
static ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+([.-][A-Za-z0-9_]+)*$")
        .expect("Package id regex should compile - this is a static pattern")
});

const ID_PATH: &[&str] = &["package", "metadata", "id"];
const VERSION_PATH: &[&str] = &["package", "metadata", "version"];

/// Errors raised while reading a descriptor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NuspecError {
    #[error("Failed parsing .nuspec XML: {0}")]
    Malformed(String),

    #[error("Expected exactly one value at '{path}', found {found}")]
    MissingField { path: String, found: usize },

    #[error("Invalid package id '{0}'")]
    InvalidId(String),

    #[error(transparent)]
    InvalidVersion(#[from] VersionError),
}

/// A descriptor field: the text as written plus its canonical form.
pub trait NuspecField {
    /// Original value, as it appeared in the XML
    fn raw(&self) -> &str;

    /// Canonical value used for storage addressing and comparison
    fn normalized(&self) -> String;
}

/// Package id field. Compared and hashed by its lowercase form.
#[derive(Debug, Clone)]
pub struct PackageId {
    raw: String,
    lower: String,
}

impl PackageId {
    /// Validate a package id.
    ///
    /// Ids are dot or dash separated runs of ASCII letters, digits and
    /// underscores (`Newtonsoft.Json`, `xunit.runner-console`), at most
    /// [`MAX_ID_LENGTH`] characters long.
    pub fn new(raw: &str) -> Result<Self, NuspecError> {
        let trimmed = raw.trim();
        if trimmed.len() > MAX_ID_LENGTH || !ID_REGEX.is_match(trimmed) {
            return Err(NuspecError::InvalidId(raw.to_string()));
        }
        Ok(Self {
            raw: trimmed.to_string(),
            lower: trimmed.to_lowercase(),
        })
    }

    /// Lowercase id, as used in storage keys and URLs
    pub fn lower(&self) -> &str {
        &self.lower
    }
}

impl NuspecField for PackageId {
    fn raw(&self) -> &str {
        &self.raw
    }

    fn normalized(&self) -> String {
        self.lower.clone()
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.lower == other.lower
    }
}

impl Eq for PackageId {}

impl std::hash::Hash for PackageId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.lower.hash(state);
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Package version field: the text as written and its parsed value.
#[derive(Debug, Clone)]
pub struct VersionField {
    raw: String,
    parsed: PackageVersion,
}

impl VersionField {
    pub fn new(raw: &str) -> Result<Self, NuspecError> {
        let parsed = PackageVersion::parse(raw)?;
        Ok(Self {
            raw: raw.trim().to_string(),
            parsed,
        })
    }

    pub fn version(&self) -> &PackageVersion {
        &self.parsed
    }
}

impl From<PackageVersion> for VersionField {
    fn from(parsed: PackageVersion) -> Self {
        Self {
            raw: parsed.to_normalized_string(),
            parsed,
        }
    }
}

impl NuspecField for VersionField {
    fn raw(&self) -> &str {
        &self.raw
    }

    fn normalized(&self) -> String {
        self.parsed.to_normalized_string()
    }
}

impl PartialEq for VersionField {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed
    }
}

impl Eq for VersionField {}

impl fmt::Display for VersionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Dependencies declared for one target framework (or for all, when `None`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

/// A parsed descriptor together with its original bytes.
#[derive(Debug, Clone)]
pub struct Nuspec {
    bytes: Vec<u8>,
    id: PackageId,
    version: VersionField,
    description: Option<String>,
    authors: Option<String>,
    dependency_groups: Vec<DependencyGroup>,
}

impl Nuspec {
    /// Parse descriptor bytes.
    pub fn parse(bytes: Vec<u8>) -> Result<Self, NuspecError> {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| NuspecError::Malformed("descriptor is not valid UTF-8".to_string()))?;
        let fields = Fields::read(text.strip_prefix('\u{feff}').unwrap_or(text))?;

        Ok(Self {
            bytes,
            id: fields.id,
            version: fields.version,
            description: fields.description,
            authors: fields.authors,
            dependency_groups: fields.dependency_groups,
        })
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn version(&self) -> &VersionField {
        &self.version
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }

    /// Descriptor bytes exactly as they were read from the archive
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn authors(&self) -> Option<&str> {
        self.authors.as_deref()
    }

    pub fn dependency_groups(&self) -> &[DependencyGroup] {
        &self.dependency_groups
    }
}

/// Owned values pulled out of the XML document
struct Fields {
    id: PackageId,
    version: VersionField,
    description: Option<String>,
    authors: Option<String>,
    dependency_groups: Vec<DependencyGroup>,
}

impl Fields {
    fn read(text: &str) -> Result<Self, NuspecError> {
        let doc =
            roxmltree::Document::parse(text).map_err(|e| NuspecError::Malformed(e.to_string()))?;

        let id = PackageId::new(&single_text(&doc, ID_PATH)?)?;
        let version = VersionField::new(&single_text(&doc, VERSION_PATH)?)?;

        let metadata = elements_at(&doc, &["package", "metadata"]).into_iter().next();
        let optional_text = |name: &'static str| {
            metadata
                .and_then(|m| child_elements(m, name).next())
                .and_then(|node| node.text())
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        };

        Ok(Self {
            id,
            version,
            description: optional_text("description"),
            authors: optional_text("authors"),
            dependency_groups: metadata.map(dependency_groups).unwrap_or_default(),
        })
    }
}

fn child_elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == name)
}

/// All elements reached by walking `path` from the document root
fn elements_at<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    path: &[&'a str],
) -> Vec<roxmltree::Node<'a, 'input>> {
    let Some((first, rest)) = path.split_first() else {
        return Vec::new();
    };
    let root = doc.root_element();
    if root.tag_name().name() != *first {
        return Vec::new();
    }
    rest.iter().copied().fold(vec![root], |nodes, name| {
        nodes
            .into_iter()
            .flat_map(|node| child_elements(node, name))
            .collect()
    })
}

/// Text content at `path`, which must resolve to exactly one text node
fn single_text(doc: &roxmltree::Document<'_>, path: &[&str]) -> Result<String, NuspecError> {
    let values: Vec<&str> = elements_at(doc, path)
        .into_iter()
        .flat_map(|node| node.children().filter(|c| c.is_text()).filter_map(|c| c.text()))
        .collect();
    match values.as_slice() {
        [value] => Ok(value.to_string()),
        _ => Err(NuspecError::MissingField {
            path: format!("/{}", path.join("/")),
            found: values.len(),
        }),
    }
}

fn dependency_groups(metadata: roxmltree::Node<'_, '_>) -> Vec<DependencyGroup> {
    let mut groups = Vec::new();
    for dependencies in child_elements(metadata, "dependencies") {
        let ungrouped: Vec<Dependency> = child_elements(dependencies, "dependency")
            .filter_map(dependency)
            .collect();
        if !ungrouped.is_empty() {
            groups.push(DependencyGroup {
                target_framework: None,
                dependencies: ungrouped,
            });
        }
        for group in child_elements(dependencies, "group") {
            groups.push(DependencyGroup {
                target_framework: group.attribute("targetFramework").map(str::to_string),
                dependencies: child_elements(group, "dependency")
                    .filter_map(dependency)
                    .collect(),
            });
        }
    }
    groups
}

fn dependency(node: roxmltree::Node<'_, '_>) -> Option<Dependency> {
    Some(Dependency {
        id: node.attribute("id")?.to_string(),
        range: node.attribute("version").map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEWTONSOFT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2012/06/nuspec.xsd">
  <metadata minClientVersion="2.12">
    <id>Newtonsoft.Json</id>
    <version>12.0.3</version>
    <authors>James Newton-King</authors>
    <description>Json.NET is a popular high-performance JSON framework for .NET</description>
    <dependencies>
      <group targetFramework=".NETFramework2.0" />
      <group targetFramework=".NETStandard1.0">
        <dependency id="Microsoft.CSharp" version="4.3.0" exclude="Build,Analyzers" />
        <dependency id="NETStandard.Library" version="1.6.1" />
      </group>
    </dependencies>
  </metadata>
</package>"#;

    fn parse(xml: &str) -> Result<Nuspec, NuspecError> {
        Nuspec::parse(xml.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_identity_and_metadata() {
        let nuspec = parse(NEWTONSOFT).expect("descriptor should parse");
        assert_eq!(nuspec.id().raw(), "Newtonsoft.Json");
        assert_eq!(nuspec.id().normalized(), "newtonsoft.json");
        assert_eq!(nuspec.version().raw(), "12.0.3");
        assert_eq!(nuspec.authors(), Some("James Newton-King"));
        assert!(nuspec.description().is_some());
        assert_eq!(nuspec.bytes(), NEWTONSOFT.as_bytes());

        let groups = nuspec.dependency_groups();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].dependencies.is_empty());
        assert_eq!(groups[1].target_framework.as_deref(), Some(".NETStandard1.0"));
        assert_eq!(groups[1].dependencies[0].id, "Microsoft.CSharp");
        assert_eq!(groups[1].dependencies[0].range.as_deref(), Some("4.3.0"));
    }

    #[test]
    fn test_parse_without_namespace_and_with_bom() {
        let xml = "\u{feff}<package><metadata><id>Foo</id><version>1.0.0-Beta</version></metadata></package>";
        let nuspec = parse(xml).expect("descriptor should parse");
        assert_eq!(nuspec.id().raw(), "Foo");
        assert_eq!(nuspec.version().normalized(), "1.0.0-beta");
        assert!(nuspec.dependency_groups().is_empty());
    }

    #[test]
    fn test_ungrouped_dependencies() {
        let xml = r#"<package><metadata><id>Foo</id><version>1.0.0</version>
            <dependencies><dependency id="Bar" /></dependencies></metadata></package>"#;
        let nuspec = parse(xml).expect("descriptor should parse");
        assert_eq!(
            nuspec.dependency_groups(),
            &[DependencyGroup {
                target_framework: None,
                dependencies: vec![Dependency {
                    id: "Bar".to_string(),
                    range: None
                }],
            }]
        );
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let err = parse("<package><metadata><version>1.0.0</version></metadata></package>")
            .expect_err("id is missing");
        assert_eq!(
            err,
            NuspecError::MissingField {
                path: "/package/metadata/id".to_string(),
                found: 0
            }
        );
    }

    #[test]
    fn test_empty_id_element_is_missing() {
        let err = parse("<package><metadata><id/><version>1.0.0</version></metadata></package>")
            .expect_err("id has no text");
        assert!(matches!(err, NuspecError::MissingField { found: 0, .. }));
    }

    #[test]
    fn test_duplicate_version_is_rejected() {
        let xml = "<package><metadata><id>Foo</id><version>1.0.0</version><version>2.0.0</version></metadata></package>";
        let err = parse(xml).expect_err("version is duplicated");
        assert_eq!(
            err,
            NuspecError::MissingField {
                path: "/package/metadata/version".to_string(),
                found: 2
            }
        );
    }

    #[test]
    fn test_wrong_root_element_has_no_fields() {
        let err = parse("<project><metadata><id>Foo</id></metadata></project>")
            .expect_err("root is not <package>");
        assert!(matches!(err, NuspecError::MissingField { .. }));
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        let err = parse("<package><metadata><id>Foo</metadata>").expect_err("unbalanced tags");
        assert!(matches!(err, NuspecError::Malformed(_)));

        let err = Nuspec::parse(vec![0xff, 0xfe, 0x00]).expect_err("not UTF-8");
        assert!(matches!(err, NuspecError::Malformed(_)));
    }

    #[test]
    fn test_invalid_version_is_propagated() {
        let err = parse("<package><metadata><id>Foo</id><version>one</version></metadata></package>")
            .expect_err("version is not numeric");
        assert!(matches!(err, NuspecError::InvalidVersion(_)));
    }

    #[test]
    fn test_package_id_validation() {
        assert!(PackageId::new("Newtonsoft.Json").is_ok());
        assert!(PackageId::new("xunit.runner-console").is_ok());
        assert!(PackageId::new("My_Package").is_ok());
        assert_eq!(
            PackageId::new("Foo"),
            PackageId::new("FOO"),
            "ids compare case-insensitively"
        );

        for invalid in ["", "  ", "..", "a..b", "../etc", "a/b", "a b", ".hidden", "trailing."] {
            assert!(PackageId::new(invalid).is_err(), "{invalid:?} should be rejected");
        }
        assert!(PackageId::new(&"a".repeat(MAX_ID_LENGTH + 1)).is_err());
    }
}
