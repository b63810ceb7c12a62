//! Package model
//!
//! Identifiers, versions, ranges, identities and platform descriptors shared
//! by the resolver, fetcher and layout extractor.

pub mod id;
pub mod identity;
pub mod manifest;
pub mod platform;
pub mod version;

pub use id::PackageId;
pub use identity::{DependencyEdge, PackageIdentity};
pub use manifest::{PackageManifest, MANIFEST_FILE};
pub use platform::{Platform, ANY_PLATFORM};
pub use version::{PackageVersion, VersionParseError, VersionRange};
