//! Package registry clients
//!
//! A registry can list the versions of a package, report the dependencies
//! of one version for a platform, and serve the version's artifact. The
//! resolver and fetcher only see the [`PackageRegistry`] trait; several
//! registries may be configured and are tried in priority order.

pub mod integrity;
pub mod local;
pub mod memory;
pub mod types;
#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LoaderError;
use crate::package::{DependencyEdge, PackageId, PackageIdentity, Platform};

pub use local::LocalRegistry;
pub use memory::InMemoryRegistry;
pub use types::{ArtifactInfo, PackageDocument, VersionDocument};
#[cfg(feature = "http")]
pub use http::HttpRegistry;

/// Well-known public registry used when none is configured
pub const DEFAULT_REGISTRY: &str = "https://registry.component-loader.dev/v1";

/// Client for one package registry
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Endpoint or label identifying this registry
    fn name(&self) -> &str;

    /// All published versions of `id`
    ///
    /// Returns `Ok(None)` when this registry does not carry the package.
    async fn list_versions(
        &self,
        id: &PackageId,
    ) -> Result<Option<Vec<crate::package::PackageVersion>>, LoaderError>;

    /// Declared dependencies of one version for the given platform
    async fn dependencies(
        &self,
        identity: &PackageIdentity,
        platform: &Platform,
    ) -> Result<Vec<DependencyEdge>, LoaderError>;

    /// Artifact bytes of one version
    async fn download(&self, identity: &PackageIdentity) -> Result<Bytes, LoaderError>;
}

impl std::fmt::Debug for dyn PackageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PackageRegistry({})", self.name())
    }
}

/// Shared handle to a registry
pub type RegistryHandle = Arc<dyn PackageRegistry>;

/// Network options applied to registries built from configuration
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Timeout for each registry request
    pub request_timeout: Duration,
    /// Largest artifact accepted, in bytes
    pub max_download_bytes: u64,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_download_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Build a registry client from an endpoint string
///
/// `http://` and `https://` endpoints are HTTP registries; `file://` URLs
/// and plain paths are local folder registries.
pub fn open_registry(endpoint: &str, options: &RegistryOptions) -> Result<RegistryHandle, LoaderError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(LoaderError::Config("empty registry endpoint".to_string()));
    }

    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        #[cfg(feature = "http")]
        {
            return Ok(Arc::new(HttpRegistry::new(endpoint, options)?));
        }
        #[cfg(not(feature = "http"))]
        {
            let _ = options;
            return Err(LoaderError::Config(format!(
                "HTTP registry {} requires the 'http' feature",
                endpoint
            )));
        }
    }

    let path = endpoint
        .strip_prefix("file://")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(endpoint));
    Ok(Arc::new(LocalRegistry::new(path, options.max_download_bytes)))
}

/// Build registry clients for every endpoint, falling back to the default
pub fn open_registries(
    endpoints: &[String],
    options: &RegistryOptions,
) -> Result<Vec<RegistryHandle>, LoaderError> {
    if endpoints.is_empty() {
        return Ok(vec![open_registry(DEFAULT_REGISTRY, options)?]);
    }
    endpoints
        .iter()
        .map(|endpoint| open_registry(endpoint, options))
        .collect()
}
