//! Package identities and dependency edges

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::package::{PackageId, PackageVersion, VersionRange};

/// Immutable (id, version) pair passed between resolver, fetcher and extractor
///
/// Two identities with the same id and version are interchangeable no
/// matter which registry produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: PackageId,
    pub version: PackageVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<PackageId>, version: PackageVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Deterministic directory/file stem: `<id-lower>.<version>`
    pub fn file_stem(&self) -> String {
        format!("{}.{}", self.id.normalized(), self.version)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Declared dependency on another package, not yet resolved to a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: PackageId,
    pub range: VersionRange,
}

impl DependencyEdge {
    pub fn new(id: impl Into<PackageId>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.range)
    }
}
