//! Case-insensitive package identifiers

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Package name, unique within a registry namespace
///
/// The original spelling is kept for display and requests; equality,
/// hashing and ordering use the ASCII-lowercased form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PackageId {
    name: String,
    key: String,
}

impl PackageId {
    /// Create a package id
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into().trim().to_string();
        let key = name.to_ascii_lowercase();
        Self { name, key }
    }

    /// Original spelling
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Lowercased form used for lookups and on-disk paths
    pub fn normalized(&self) -> &str {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PackageId {}

impl Hash for PackageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        PackageId::new(s)
    }
}

impl From<String> for PackageId {
    fn from(s: String) -> Self {
        PackageId::new(s)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.name
    }
}
