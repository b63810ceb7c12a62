//! Dependency resolution
//!
//! Breadth-first walk from the root package. Registries are searched in
//! priority order and the first one that lists a package id owns that id
//! for the rest of the walk: version listing, dependency metadata and the
//! later download all go to it. Conflicts are settled greedily, highest
//! version wins, and an id is expanded at most once, so cyclic graphs
//! terminate. Unresolvable transitive dependencies are logged, recorded in
//! [`ResolvedSet::skipped`] and dropped.

pub mod set;

use std::collections::{HashMap, HashSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LoaderError;
use crate::package::{
    DependencyEdge, PackageId, PackageIdentity, PackageVersion, Platform, VersionRange,
};
use crate::source::RegistryHandle;
use crate::utils::cancellable;

pub use set::{ResolvedPackage, ResolvedSet, SkippedDependency};

/// Registry that owns an id, with the versions it lists
#[derive(Clone)]
struct Located {
    registry: RegistryHandle,
    versions: Vec<PackageVersion>,
}

/// Turns a root package id into a conflict-resolved [`ResolvedSet`]
#[derive(Clone)]
pub struct DependencyResolver {
    registries: Vec<RegistryHandle>,
}

impl DependencyResolver {
    /// Create a resolver over registries in priority order
    pub fn new(registries: Vec<RegistryHandle>) -> Self {
        Self { registries }
    }

    pub fn registries(&self) -> &[RegistryHandle] {
        &self.registries
    }

    /// Resolve the full dependency closure of `root`
    ///
    /// With `requested` the root version must match exactly; otherwise the
    /// highest stable version is taken, or the highest prerelease when no
    /// stable version exists.
    pub async fn resolve(
        &self,
        root: &PackageId,
        requested: Option<&PackageVersion>,
        platform: &Platform,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSet, LoaderError> {
        let mut owners: HashMap<PackageId, Option<Located>> = HashMap::new();

        let located = self
            .locate(root, &mut owners, cancel)
            .await?
            .ok_or_else(|| LoaderError::NotFound(root.clone()))?;

        let range = match requested {
            Some(version) => VersionRange::exact(version.clone()),
            None => VersionRange::any(),
        };
        let version = range
            .best_match(&located.versions)
            .ok_or_else(|| LoaderError::NoCompatibleVersion {
                id: root.clone(),
                constraint: range.to_string(),
            })?;

        info!(
            "Resolving {} {} for platform {} (registry {})",
            root,
            version,
            platform,
            located.registry.name()
        );

        let mut resolved = ResolvedSet::new(ResolvedPackage {
            identity: PackageIdentity::new(root.clone(), version),
            registry: located.registry,
        });
        let mut expanded: HashSet<PackageId> = HashSet::new();
        let mut queue: VecDeque<PackageId> = VecDeque::new();
        queue.push_back(root.clone());

        while let Some(id) = queue.pop_front() {
            if !expanded.insert(id.clone()) {
                continue;
            }
            let Some(current) = resolved.get(&id).cloned() else {
                continue;
            };

            let edges = match cancellable(
                cancel,
                current.registry.dependencies(&current.identity, platform),
            )
            .await
            {
                Ok(edges) => edges,
                Err(LoaderError::Cancelled) => return Err(LoaderError::Cancelled),
                Err(e) => {
                    warn!(
                        "Failed to read dependencies of {}; treating it as a leaf: {}",
                        current.identity, e
                    );
                    continue;
                }
            };

            for edge in edges {
                let candidate = match self.select(&edge, &mut owners, cancel).await {
                    Ok(candidate) => candidate,
                    Err(LoaderError::Cancelled) => return Err(LoaderError::Cancelled),
                    Err(e) => {
                        warn!(
                            "Skipping dependency {} of {}: {}",
                            edge, current.identity, e
                        );
                        resolved.record_skip(SkippedDependency {
                            from: current.identity.clone(),
                            to: edge.id.clone(),
                            range: edge.range.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                match resolved.get(&edge.id).map(|p| p.identity.version.clone()) {
                    None => {
                        debug!("Adding {} (required by {})", candidate.identity, current.identity);
                        queue.push_back(edge.id.clone());
                        resolved.insert(candidate);
                    }
                    Some(existing) if candidate.identity.version > existing => {
                        debug!(
                            "Upgrading {} from {} to {} (required by {})",
                            edge.id, existing, candidate.identity.version, current.identity
                        );
                        resolved.upgrade(&edge.id, candidate.identity.version);
                    }
                    Some(_) => {}
                }
            }
        }

        if !resolved.skipped().is_empty() {
            warn!(
                "Resolved {} with {} skipped dependencies",
                root,
                resolved.skipped().len()
            );
        }
        info!("Resolved {} packages for {}", resolved.len(), root);
        Ok(resolved)
    }

    /// Best candidate for an edge from the registry that owns its id
    async fn select(
        &self,
        edge: &DependencyEdge,
        owners: &mut HashMap<PackageId, Option<Located>>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPackage, LoaderError> {
        let located = self
            .locate(&edge.id, owners, cancel)
            .await?
            .ok_or_else(|| LoaderError::NotFound(edge.id.clone()))?;
        let version = edge.range.best_match(&located.versions).ok_or_else(|| {
            LoaderError::NoCompatibleVersion {
                id: edge.id.clone(),
                constraint: edge.range.to_string(),
            }
        })?;
        Ok(ResolvedPackage {
            identity: PackageIdentity::new(edge.id.clone(), version),
            registry: located.registry,
        })
    }

    /// Find the first registry, in priority order, that lists `id`
    ///
    /// The answer is remembered for the rest of the resolution. A registry
    /// that fails to answer is logged and passed over.
    async fn locate(
        &self,
        id: &PackageId,
        owners: &mut HashMap<PackageId, Option<Located>>,
        cancel: &CancellationToken,
    ) -> Result<Option<Located>, LoaderError> {
        if let Some(known) = owners.get(id) {
            return Ok(known.clone());
        }

        let mut found = None;
        for registry in &self.registries {
            match cancellable(cancel, registry.list_versions(id)).await {
                Ok(Some(versions)) if !versions.is_empty() => {
                    debug!("{} found in registry {}", id, registry.name());
                    found = Some(Located {
                        registry: registry.clone(),
                        versions,
                    });
                    break;
                }
                Ok(_) => {}
                Err(LoaderError::Cancelled) => return Err(LoaderError::Cancelled),
                Err(e) => warn!("Registry {} failed to list {}: {}", registry.name(), id, e),
            }
        }

        owners.insert(id.clone(), found.clone());
        Ok(found)
    }
}
