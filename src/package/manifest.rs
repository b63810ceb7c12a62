//! Package manifest parsing
//!
//! Handles the `package.toml` file shipped at the root of a package artifact.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::package::{PackageId, PackageVersion};

/// File name of the manifest inside an artifact
pub const MANIFEST_FILE: &str = "package.toml";

/// Package manifest (package.toml structure)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name
    pub name: String,
    /// Package version (semantic versioning)
    pub version: String,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Package author
    #[serde(default)]
    pub author: Option<String>,
    /// Root binary name, without platform executable suffix
    #[serde(default)]
    pub entry_point: Option<String>,
}

impl PackageManifest {
    /// Parse manifest TOML
    pub fn from_toml_str(contents: &str) -> Result<Self, String> {
        let manifest: PackageManifest = toml::from_str(contents)
            .map_err(|e| format!("Failed to parse manifest TOML: {}", e))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load manifest from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read manifest file: {}", e))?;
        Self::from_toml_str(&contents)
    }

    /// Validate required fields
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Package name cannot be empty".to_string());
        }
        PackageVersion::parse(&self.version).map_err(|e| e.to_string())?;
        if let Some(entry) = &self.entry_point {
            if entry.trim().is_empty() {
                return Err("Entry point cannot be empty".to_string());
            }
            if entry.contains(|c: char| c == '/' || c == '\\') || entry == ".." {
                return Err(format!("Entry point must be a bare file name: {}", entry));
            }
        }
        Ok(())
    }

    /// Root binary name, defaulting to the package id
    pub fn entry_point_or(&self, id: &PackageId) -> String {
        self.entry_point
            .clone()
            .unwrap_or_else(|| id.as_str().to_string())
    }
}
