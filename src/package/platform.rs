//! Target platform descriptors and nearest-match negotiation
//!
//! A descriptor is a `-`-separated list of segments ordered from general to
//! specific (`linux-x86_64-gnu`). Dropping trailing segments yields the
//! compatible ancestors, ending in the universal `any`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The descriptor every platform is compatible with
pub const ANY_PLATFORM: &str = "any";

/// Target platform descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Platform {
    segments: Vec<String>,
}

impl Platform {
    /// Parse a descriptor; empty input or `any` is the universal platform
    pub fn new(descriptor: &str) -> Self {
        let normalized = descriptor.trim().to_ascii_lowercase();
        if normalized.is_empty() || normalized == ANY_PLATFORM {
            return Self::any();
        }
        let segments = normalized
            .split('-')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    /// The universal platform
    pub fn any() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Platform of the running host (`<os>-<arch>`)
    pub fn current() -> Self {
        Self::new(&format!(
            "{}-{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ))
    }

    pub fn is_any(&self) -> bool {
        self.segments.is_empty()
    }

    /// This platform followed by its ancestors, most specific first
    pub fn lineage(&self) -> Vec<Platform> {
        (0..=self.segments.len())
            .rev()
            .map(|n| Platform {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// Whether content built for `other` can run on this platform
    pub fn is_compatible_with(&self, other: &Platform) -> bool {
        other.segments.len() <= self.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Pick the candidate nearest to this platform
    ///
    /// Exact match first, then the closest compatible ancestor. Candidates
    /// that are not ancestors of this platform never match. Returns the
    /// index into `candidates`.
    pub fn nearest<S: AsRef<str>>(&self, candidates: &[S]) -> Option<usize> {
        let parsed: Vec<Platform> = candidates
            .iter()
            .map(|c| Platform::new(c.as_ref()))
            .collect();
        self.lineage()
            .iter()
            .find_map(|ancestor| parsed.iter().position(|p| p == ancestor))
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str(ANY_PLATFORM)
        } else {
            f.write_str(&self.segments.join("-"))
        }
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Platform::new(&s)
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Platform::new(s)
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_runs_to_any() {
        let platform = Platform::new("linux-x86_64-gnu");
        let lineage: Vec<String> = platform.lineage().iter().map(|p| p.to_string()).collect();
        assert_eq!(lineage, vec!["linux-x86_64-gnu", "linux-x86_64", "linux", "any"]);
    }

    #[test]
    fn test_nearest_prefers_exact() {
        let platform = Platform::new("linux-x86_64");
        let groups = ["any", "linux", "linux-x86_64", "windows-x86_64"];
        assert_eq!(platform.nearest(&groups), Some(2));
    }

    #[test]
    fn test_nearest_falls_back_to_closest_ancestor() {
        let platform = Platform::new("linux-aarch64-musl");
        let groups = ["any", "linux", "linux-x86_64"];
        assert_eq!(platform.nearest(&groups), Some(1));

        let platform = Platform::new("macos-aarch64");
        assert_eq!(platform.nearest(&groups), Some(0));
    }

    #[test]
    fn test_nearest_rejects_incompatible() {
        let platform = Platform::new("windows-x86_64");
        assert_eq!(platform.nearest(&["linux", "linux-x86_64"]), None);
    }

    #[test]
    fn test_descriptor_normalization() {
        assert_eq!(Platform::new("Linux-X86_64"), Platform::new("linux-x86_64"));
        assert!(Platform::new("").is_any());
        assert!(Platform::new("ANY").is_any());
        assert!(Platform::new("linux-x86_64").is_compatible_with(&Platform::new("linux")));
        assert!(!Platform::new("linux").is_compatible_with(&Platform::new("linux-x86_64")));
    }
}
