//! Serde types for registry package documents
//!
//! The HTTP and local folder registries serve the same JSON document per
//! package id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::package::{DependencyEdge, PackageVersion, Platform, VersionRange};

/// Registry document for one package id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageDocument {
    /// Package id as published
    #[serde(default)]
    pub id: String,
    /// Per-version metadata, keyed by version string
    #[serde(default)]
    pub versions: BTreeMap<String, VersionDocument>,
}

/// Metadata for a single published version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionDocument {
    /// Dependency groups keyed by platform descriptor, each mapping a
    /// package id to a version range
    #[serde(default)]
    pub dependencies: BTreeMap<String, BTreeMap<String, String>>,
    /// Artifact download information
    #[serde(default)]
    pub artifact: Option<ArtifactInfo>,
}

/// Where and how to download a version's artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    /// Absolute URL, or a path relative to the package's registry location
    pub url: String,
    /// Hex-encoded SHA-256 of the artifact
    #[serde(default)]
    pub sha256: Option<String>,
}

impl PackageDocument {
    /// All parseable versions; malformed version keys are skipped
    pub fn versions(&self) -> Vec<PackageVersion> {
        self.versions
            .keys()
            .filter_map(|raw| match PackageVersion::parse(raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("Ignoring unparseable version in {}: {}", self.id, e);
                    None
                }
            })
            .collect()
    }

    /// Metadata for a version, matching keys by parsed value (`1.0` == `1.0.0`)
    pub fn version(&self, version: &PackageVersion) -> Option<&VersionDocument> {
        self.versions
            .iter()
            .find(|(raw, _)| PackageVersion::parse(raw).ok().as_ref() == Some(version))
            .map(|(_, doc)| doc)
    }
}

impl VersionDocument {
    /// Dependencies of the group nearest to `platform`
    ///
    /// A version without dependency groups has no dependencies. A version
    /// whose groups are all incompatible with `platform` has none either.
    pub fn dependencies_for(&self, platform: &Platform) -> Result<Vec<DependencyEdge>, String> {
        let groups: Vec<&String> = self.dependencies.keys().collect();
        let Some(index) = platform.nearest(groups.as_slice()) else {
            return Ok(Vec::new());
        };

        let group = &self.dependencies[groups[index]];
        group
            .iter()
            .map(|(id, range)| {
                VersionRange::parse(range)
                    .map(|range| DependencyEdge::new(id.as_str(), range))
                    .map_err(|e| format!("dependency {}: {}", id, e))
            })
            .collect()
    }
}
