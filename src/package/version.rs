//! Package versions and version ranges
//!
//! Versions are semantic versions with a lenient parser (`1.0` is `1.0.0`).
//! Ranges are a conjunction of comparators and support both the
//! `>=1.0 <2.0` style and interval notation (`[1.0,2.0)`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version or range parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

impl VersionParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A semantic version, totally ordered
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageVersion(semver::Version);

impl PackageVersion {
    /// Create a stable version from its numeric parts
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a version, padding missing minor and patch components
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(VersionParseError::new(input, "empty version"));
        }

        let split_at = trimmed
            .find(|c: char| c == '-' || c == '+')
            .unwrap_or(trimmed.len());
        let (core, suffix) = trimmed.split_at(split_at);

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionParseError::new(
                input,
                "expected at most three numeric components",
            ));
        }
        if parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
            return Err(VersionParseError::new(input, "non-numeric version component"));
        }

        let mut padded = parts.join(".");
        for _ in parts.len()..3 {
            padded.push_str(".0");
        }
        padded.push_str(suffix);

        semver::Version::parse(&padded)
            .map(PackageVersion)
            .map_err(|e| VersionParseError::new(input, e.to_string()))
    }

    /// Whether this is a prerelease version (`1.0.0-beta`)
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// Underlying semver value
    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PackageVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageVersion::parse(s)
    }
}

impl TryFrom<String> for PackageVersion {
    type Error = VersionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PackageVersion::parse(&s)
    }
}

impl From<PackageVersion> for String {
    fn from(v: PackageVersion) -> Self {
        v.to_string()
    }
}

/// Comparison operator in a range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Exact,
    Greater,
    GreaterEq,
    Less,
    LessEq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: PackageVersion,
}

impl Comparator {
    fn matches(&self, v: &PackageVersion) -> bool {
        match self.op {
            Op::Exact => v == &self.version,
            Op::Greater => v > &self.version,
            Op::GreaterEq => v >= &self.version,
            Op::Less => v < &self.version,
            Op::LessEq => v <= &self.version,
        }
    }
}

/// A version constraint: every comparator must hold
///
/// An empty comparator list matches every version. Prerelease versions
/// satisfy a range by plain ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    comparators: Vec<Comparator>,
    source: String,
}

impl VersionRange {
    /// Range matching every version
    pub fn any() -> Self {
        Self {
            comparators: Vec::new(),
            source: "*".to_string(),
        }
    }

    /// Range matching exactly one version
    pub fn exact(version: PackageVersion) -> Self {
        let source = format!("={}", version);
        Self {
            comparators: vec![Comparator {
                op: Op::Exact,
                version,
            }],
            source,
        }
    }

    /// Range matching the given version or anything newer
    pub fn at_least(version: PackageVersion) -> Self {
        let source = format!(">={}", version);
        Self {
            comparators: vec![Comparator {
                op: Op::GreaterEq,
                version,
            }],
            source,
        }
    }

    /// Parse a range expression
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let comparators = if trimmed.starts_with('[') || trimmed.starts_with('(') {
            Self::parse_interval(input, trimmed)?
        } else {
            Self::parse_comparators(input, trimmed)?
        };

        Ok(Self {
            comparators,
            source: trimmed.to_string(),
        })
    }

    fn parse_interval(input: &str, s: &str) -> Result<Vec<Comparator>, VersionParseError> {
        let open_inclusive = s.starts_with('[');
        let close_inclusive = match s.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(VersionParseError::new(input, "unterminated interval")),
        };
        let inner = &s[1..s.len() - 1];

        // `[1.0]` pins a single version
        if !inner.contains(',') {
            if !(open_inclusive && close_inclusive) {
                return Err(VersionParseError::new(input, "single-version interval must be [x]"));
            }
            return Ok(vec![Comparator {
                op: Op::Exact,
                version: PackageVersion::parse(inner)?,
            }]);
        }

        let (lower, upper) = inner
            .split_once(',')
            .ok_or_else(|| VersionParseError::new(input, "malformed interval"))?;
        let mut comparators = Vec::new();
        if !lower.trim().is_empty() {
            comparators.push(Comparator {
                op: if open_inclusive { Op::GreaterEq } else { Op::Greater },
                version: PackageVersion::parse(lower)?,
            });
        }
        if !upper.trim().is_empty() {
            comparators.push(Comparator {
                op: if close_inclusive { Op::LessEq } else { Op::Less },
                version: PackageVersion::parse(upper)?,
            });
        }
        Ok(comparators)
    }

    fn parse_comparators(input: &str, s: &str) -> Result<Vec<Comparator>, VersionParseError> {
        let mut comparators = Vec::new();
        let mut pending_op: Option<Op> = None;

        for token in s.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            let (op, rest) = split_operator(token);
            match (pending_op.take(), op) {
                (Some(_), Some(_)) => {
                    return Err(VersionParseError::new(input, "operator without version"));
                }
                (Some(op), None) => comparators.push(Comparator {
                    op,
                    version: PackageVersion::parse(rest)?,
                }),
                (None, Some(op)) if rest.is_empty() => pending_op = Some(op),
                (None, op) => comparators.push(Comparator {
                    // A bare version is a minimum
                    op: op.unwrap_or(Op::GreaterEq),
                    version: PackageVersion::parse(rest)?,
                }),
            }
        }

        if pending_op.is_some() {
            return Err(VersionParseError::new(input, "operator without version"));
        }
        Ok(comparators)
    }

    /// Whether a version satisfies every comparator
    pub fn matches(&self, version: &PackageVersion) -> bool {
        self.comparators.iter().all(|c| c.matches(version))
    }

    /// Whether this range matches everything
    pub fn is_any(&self) -> bool {
        self.comparators.is_empty()
    }

    /// Pick the best version within the range
    ///
    /// Highest stable version wins; when the range holds only prereleases,
    /// the highest prerelease is chosen.
    pub fn best_match<'a, I>(&self, versions: I) -> Option<PackageVersion>
    where
        I: IntoIterator<Item = &'a PackageVersion>,
    {
        let mut best_stable: Option<&PackageVersion> = None;
        let mut best_pre: Option<&PackageVersion> = None;

        for v in versions {
            if !self.matches(v) {
                continue;
            }
            let slot = if v.is_prerelease() {
                &mut best_pre
            } else {
                &mut best_stable
            };
            if slot.map(|b| v > b).unwrap_or(true) {
                *slot = Some(v);
            }
        }

        best_stable.or(best_pre).cloned()
    }
}

fn split_operator(token: &str) -> (Option<Op>, &str) {
    for (prefix, op) in [
        (">=", Op::GreaterEq),
        ("<=", Op::LessEq),
        (">", Op::Greater),
        ("<", Op::Less),
        ("==", Op::Exact),
        ("=", Op::Exact),
    ] {
        if let Some(rest) = token.strip_prefix(prefix) {
            return (Some(op), rest);
        }
    }
    (None, token)
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for VersionRange {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        VersionRange::parse(&s)
    }
}

impl From<VersionRange> for String {
    fn from(r: VersionRange) -> Self {
        r.source
    }
}
