//! In-memory package registry
//!
//! Holds package metadata and artifacts in process. Used for embedding
//! hosts that ship their own packages and for tests; query counters make
//! registry traffic observable.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::LoaderError;
use crate::package::{
    DependencyEdge, PackageId, PackageIdentity, PackageVersion, Platform, VersionRange,
    ANY_PLATFORM,
};
use crate::source::PackageRegistry;

#[derive(Default)]
struct VersionEntry {
    /// Dependency groups keyed by platform descriptor
    groups: BTreeMap<String, Vec<DependencyEdge>>,
    artifact: Option<Bytes>,
}

#[derive(Default)]
struct State {
    packages: HashMap<PackageId, BTreeMap<PackageVersion, VersionEntry>>,
    unavailable: bool,
    version_queries: HashMap<PackageId, usize>,
    dependency_queries: HashMap<PackageId, usize>,
    downloads: usize,
}

/// Registry backed by in-process maps
pub struct InMemoryRegistry {
    name: String,
    state: Mutex<State>,
}

impl InMemoryRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a version whose dependencies apply to every platform
    pub fn publish(
        &self,
        id: &str,
        version: &str,
        dependencies: &[(&str, &str)],
    ) -> Result<(), LoaderError> {
        self.publish_for_platform(id, version, ANY_PLATFORM, dependencies)
    }

    /// Publish (or extend) a version with a dependency group for `platform`
    pub fn publish_for_platform(
        &self,
        id: &str,
        version: &str,
        platform: &str,
        dependencies: &[(&str, &str)],
    ) -> Result<(), LoaderError> {
        let version = parse_version(id, version)?;
        let edges = dependencies
            .iter()
            .map(|(dep, range)| {
                VersionRange::parse(range)
                    .map(|range| DependencyEdge::new(*dep, range))
                    .map_err(|e| LoaderError::Config(format!("dependency {} of {}: {}", dep, id, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state();
        let entry = state
            .packages
            .entry(PackageId::new(id))
            .or_default()
            .entry(version)
            .or_default();
        entry
            .groups
            .insert(Platform::new(platform).to_string(), edges);
        Ok(())
    }

    /// Attach artifact bytes to a published version
    pub fn set_artifact(
        &self,
        id: &str,
        version: &str,
        artifact: impl Into<Bytes>,
    ) -> Result<(), LoaderError> {
        let version = parse_version(id, version)?;
        let mut state = self.state();
        let entry = state
            .packages
            .get_mut(&PackageId::new(id))
            .and_then(|versions| versions.get_mut(&version))
            .ok_or_else(|| {
                LoaderError::Config(format!("cannot attach artifact to unpublished {} {}", id, version))
            })?;
        entry.artifact = Some(artifact.into());
        Ok(())
    }

    /// Make every query fail as if the registry were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Number of version listings requested for `id`
    pub fn version_queries(&self, id: &str) -> usize {
        self.state()
            .version_queries
            .get(&PackageId::new(id))
            .copied()
            .unwrap_or(0)
    }

    /// Number of dependency lookups requested for any version of `id`
    pub fn dependency_queries(&self, id: &str) -> usize {
        self.state()
            .dependency_queries
            .get(&PackageId::new(id))
            .copied()
            .unwrap_or(0)
    }

    /// Number of artifact downloads served
    pub fn download_count(&self) -> usize {
        self.state().downloads
    }

    fn check_available(&self, state: &State) -> Result<(), LoaderError> {
        if state.unavailable {
            return Err(LoaderError::Registry {
                registry: self.name.clone(),
                message: "registry unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_version(id: &str, version: &str) -> Result<PackageVersion, LoaderError> {
    PackageVersion::parse(version)
        .map_err(|e| LoaderError::Config(format!("version of {}: {}", id, e)))
}

#[async_trait]
impl PackageRegistry for InMemoryRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_versions(
        &self,
        id: &PackageId,
    ) -> Result<Option<Vec<PackageVersion>>, LoaderError> {
        let mut state = self.state();
        *state.version_queries.entry(id.clone()).or_insert(0) += 1;
        self.check_available(&state)?;
        Ok(state
            .packages
            .get(id)
            .map(|versions| versions.keys().cloned().collect()))
    }

    async fn dependencies(
        &self,
        identity: &PackageIdentity,
        platform: &Platform,
    ) -> Result<Vec<DependencyEdge>, LoaderError> {
        let mut state = self.state();
        *state
            .dependency_queries
            .entry(identity.id.clone())
            .or_insert(0) += 1;
        self.check_available(&state)?;

        let entry = state
            .packages
            .get(&identity.id)
            .and_then(|versions| versions.get(&identity.version))
            .ok_or_else(|| LoaderError::Registry {
                registry: self.name.clone(),
                message: format!("{} is not published", identity),
            })?;

        let groups: Vec<&String> = entry.groups.keys().collect();
        Ok(platform
            .nearest(groups.as_slice())
            .map(|index| entry.groups[groups[index]].clone())
            .unwrap_or_default())
    }

    async fn download(&self, identity: &PackageIdentity) -> Result<Bytes, LoaderError> {
        let mut state = self.state();
        self.check_available(&state)?;
        let artifact = state
            .packages
            .get(&identity.id)
            .and_then(|versions| versions.get(&identity.version))
            .and_then(|entry| entry.artifact.clone())
            .ok_or_else(|| LoaderError::Download {
                identity: identity.clone(),
                message: format!("no artifact published in {}", self.name),
            })?;
        state.downloads += 1;
        Ok(artifact)
    }
}
