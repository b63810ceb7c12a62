//! Artifact fetching
//!
//! Downloads each resolved package from the registry recorded during
//! resolution. A cached artifact bypasses the network. Failing to fetch the
//! root aborts that root; a failed dependency is skipped.

pub mod cache;

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LoaderError;
use crate::package::PackageIdentity;
use crate::resolver::{ResolvedPackage, ResolvedSet};
use crate::utils::cancellable;

pub use cache::ArtifactCache;

/// An artifact available on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub identity: PackageIdentity,
    pub path: PathBuf,
    /// Served from the cache without a download
    pub cached: bool,
}

/// Artifacts for one resolved set
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Fetched artifacts, root first, in resolution order
    pub artifacts: Vec<FetchedArtifact>,
    /// Dependencies whose download failed
    pub skipped: Vec<(PackageIdentity, String)>,
}

/// Downloads package artifacts into an [`ArtifactCache`]
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    cache: ArtifactCache,
}

impl PackageFetcher {
    pub fn new(cache: ArtifactCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Fetch one package from its recorded registry
    pub async fn fetch(
        &self,
        package: &ResolvedPackage,
        cancel: &CancellationToken,
    ) -> Result<FetchedArtifact, LoaderError> {
        let identity = &package.identity;
        if let Some(path) = self.cache.lookup(identity) {
            debug!("Cache hit for {}", identity);
            return Ok(FetchedArtifact {
                identity: identity.clone(),
                path,
                cached: true,
            });
        }

        info!("Downloading {} from {}", identity, package.registry_name());
        let data = cancellable(cancel, package.registry.download(identity)).await?;

        let cache = self.cache.clone();
        let owned = identity.clone();
        let path = tokio::task::spawn_blocking(move || cache.store(&owned, &data))
            .await
            .map_err(|e| LoaderError::Download {
                identity: identity.clone(),
                message: format!("cache write task failed: {}", e),
            })??;

        Ok(FetchedArtifact {
            identity: identity.clone(),
            path,
            cached: false,
        })
    }

    /// Fetch every package of a resolved set
    ///
    /// Returns an error only if the root cannot be fetched or the caller
    /// cancels.
    pub async fn fetch_all(
        &self,
        resolved: &ResolvedSet,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, LoaderError> {
        let mut report = FetchReport::default();
        let root = resolved.root_id();

        for package in resolved.iter() {
            match self.fetch(package, cancel).await {
                Ok(artifact) => report.artifacts.push(artifact),
                Err(LoaderError::Cancelled) => return Err(LoaderError::Cancelled),
                Err(e) if &package.identity.id == root => return Err(e),
                Err(e) => {
                    warn!("Skipping dependency {}: {}", package.identity, e);
                    report.skipped.push((package.identity.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
