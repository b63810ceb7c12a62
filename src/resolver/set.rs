//! Resolution output

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::package::{PackageId, PackageIdentity, PackageVersion, VersionRange};
use crate::source::RegistryHandle;

/// One winning identity and the registry it was found in
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub identity: PackageIdentity,
    /// Registry used for every lookup of this id, and for its download
    pub registry: RegistryHandle,
}

impl ResolvedPackage {
    pub fn registry_name(&self) -> &str {
        self.registry.name()
    }
}

/// A dependency edge dropped during resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDependency {
    /// Package that declared the edge
    pub from: PackageIdentity,
    pub to: PackageId,
    pub range: VersionRange,
    pub reason: String,
}

impl fmt::Display for SkippedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} {}: {}", self.from, self.to, self.range, self.reason)
    }
}

/// Conflict-resolved closure of one root package
///
/// Entries keep discovery (breadth-first) order with the root first. No two
/// entries share a package id.
#[derive(Debug, Clone)]
pub struct ResolvedSet {
    root: PackageId,
    packages: Vec<ResolvedPackage>,
    index: HashMap<PackageId, usize>,
    skipped: Vec<SkippedDependency>,
}

impl ResolvedSet {
    pub(crate) fn new(root: ResolvedPackage) -> Self {
        let mut set = Self {
            root: root.identity.id.clone(),
            packages: Vec::new(),
            index: HashMap::new(),
            skipped: Vec::new(),
        };
        set.insert(root);
        set
    }

    /// Add a package not yet present; returns false if the id is taken
    pub(crate) fn insert(&mut self, package: ResolvedPackage) -> bool {
        if self.index.contains_key(&package.identity.id) {
            return false;
        }
        self.index
            .insert(package.identity.id.clone(), self.packages.len());
        self.packages.push(package);
        true
    }

    /// Replace the version of an existing entry
    pub(crate) fn upgrade(&mut self, id: &PackageId, version: PackageVersion) {
        if let Some(&i) = self.index.get(id) {
            self.packages[i].identity.version = version;
        }
    }

    pub(crate) fn record_skip(&mut self, skipped: SkippedDependency) {
        self.skipped.push(skipped);
    }

    /// The root package entry
    pub fn root(&self) -> &ResolvedPackage {
        // The root is inserted first and entries are never removed
        &self.packages[0]
    }

    pub fn root_id(&self) -> &PackageId {
        &self.root
    }

    pub fn get(&self, id: &PackageId) -> Option<&ResolvedPackage> {
        self.index.get(id).map(|&i| &self.packages[i])
    }

    pub fn contains(&self, id: &PackageId) -> bool {
        self.index.contains_key(id)
    }

    /// Selected version of `id`, if present
    pub fn version_of(&self, id: &str) -> Option<&PackageVersion> {
        self.get(&PackageId::new(id)).map(|p| &p.identity.version)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages.iter()
    }

    pub fn identities(&self) -> Vec<PackageIdentity> {
        self.packages.iter().map(|p| p.identity.clone()).collect()
    }

    /// Dependency edges that were dropped, in the order they were met
    pub fn skipped(&self) -> &[SkippedDependency] {
        &self.skipped
    }

    /// Hex SHA-256 over the sorted identities; equal sets hash equally
    pub fn fingerprint(&self) -> String {
        let mut identities = self.identities();
        identities.sort();
        let mut hasher = Sha256::new();
        for identity in &identities {
            hasher.update(identity.id.normalized().as_bytes());
            hasher.update(b"@");
            hasher.update(identity.version.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}
