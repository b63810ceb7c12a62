//! Component manager
//!
//! Runs the resolve → fetch → extract → load pipeline for each root package
//! and records the loaded components in the shared [`ModuleRegistry`].
//! Roots are independent: they run concurrently and one root's failure
//! never affects another.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{HostConfig, PackageRequest};
use crate::error::LoaderError;
use crate::fetch::{ArtifactCache, PackageFetcher};
use crate::layout::{ExtractedLayout, LayoutExtractor};
use crate::loader::{ComponentLauncher, IsolatedLoader, SharedContractSet};
use crate::modules::{ModuleRegistry, RegisterOutcome};
use crate::package::{PackageId, PackageIdentity, Platform};
use crate::resolver::{DependencyResolver, SkippedDependency};
use crate::source::{open_registries, RegistryHandle};

/// Outcome of loading one root package
#[derive(Debug, Clone)]
pub struct RootOutcome {
    pub root: PackageIdentity,
    pub layout: ExtractedLayout,
    /// Declared names registered from this root
    pub registered: Vec<String>,
    /// Declared names skipped because another root registered them first
    pub duplicates: Vec<String>,
    /// Dependency edges dropped during resolution
    pub skipped_dependencies: Vec<SkippedDependency>,
    /// Dependencies whose artifact could not be fetched
    pub skipped_downloads: Vec<(PackageIdentity, String)>,
}

/// Result of [`ComponentManager::load_all`]
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub loaded: Vec<RootOutcome>,
    pub failed: Vec<(PackageId, LoaderError)>,
}

impl LoadSummary {
    /// Every registered declared name, in root order
    pub fn components(&self) -> Vec<String> {
        self.loaded
            .iter()
            .flat_map(|o| o.registered.iter().cloned())
            .collect()
    }

    pub fn duplicates(&self) -> Vec<String> {
        self.loaded
            .iter()
            .flat_map(|o| o.duplicates.iter().cloned())
            .collect()
    }

    /// Whether every requested root loaded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives the loading pipeline for root packages
pub struct ComponentManager {
    resolver: DependencyResolver,
    fetcher: PackageFetcher,
    extractor: LayoutExtractor,
    loader: IsolatedLoader,
    registry: Arc<ModuleRegistry>,
    platform: Platform,
}

impl ComponentManager {
    pub fn new(
        resolver: DependencyResolver,
        fetcher: PackageFetcher,
        extractor: LayoutExtractor,
        loader: IsolatedLoader,
        registry: Arc<ModuleRegistry>,
        platform: Platform,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            extractor,
            loader,
            registry,
            platform,
        }
    }

    /// Build a manager from configuration with a custom launcher
    pub fn from_config_with_launcher(
        config: &HostConfig,
        launcher: Arc<dyn ComponentLauncher>,
        registry: Arc<ModuleRegistry>,
    ) -> Result<Self, LoaderError> {
        config
            .validate()
            .map_err(|e| LoaderError::Config(e.to_string()))?;
        let registries: Vec<RegistryHandle> =
            open_registries(&config.registry_endpoints(), &config.registry_options())?;

        Ok(Self::new(
            DependencyResolver::new(registries),
            PackageFetcher::new(ArtifactCache::new(config.cache_dir())),
            LayoutExtractor::new(config.layouts_dir(), config.content_dir()),
            IsolatedLoader::new(SharedContractSet::host(), launcher),
            registry,
            config.target_platform(),
        ))
    }

    /// Build a manager that runs components as child processes
    #[cfg(unix)]
    pub fn from_config(config: &HostConfig, registry: Arc<ModuleRegistry>) -> Result<Self, LoaderError> {
        let launcher = Arc::new(crate::loader::ProcessLauncher::new(
            config.socket_dir(),
            config.launcher.clone(),
        ));
        Self::from_config_with_launcher(config, launcher, registry)
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &IsolatedLoader {
        &self.loader
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Run the full pipeline for one root package
    pub async fn load_root(
        &self,
        request: &PackageRequest,
        cancel: &CancellationToken,
    ) -> Result<RootOutcome, LoaderError> {
        let id = request.package_id();
        let pinned = request
            .pinned_version()
            .map_err(|e| LoaderError::Config(e.to_string()))?;

        let resolved = self
            .resolver
            .resolve(&id, pinned.as_ref(), &self.platform, cancel)
            .await?;
        let fetched = self.fetcher.fetch_all(&resolved, cancel).await?;

        let extractor = self.extractor.clone();
        let platform = self.platform.clone();
        let artifacts = fetched.artifacts.clone();
        let resolved_for_layout = resolved.clone();
        let layout = tokio::task::spawn_blocking(move || {
            extractor.extract(&resolved_for_layout, &artifacts, &platform)
        })
        .await
        .map_err(|e| LoaderError::extraction(&id, format!("extraction task failed: {}", e)))??;

        let loaded = self.loader.load(&layout.root_binary).await?;

        let mut registered = Vec::new();
        let mut duplicates = Vec::new();
        for component in &loaded.components {
            let name = component.name().to_string();
            match self.registry.register(
                &name,
                component.clone(),
                &layout.root_binary,
                loaded.context.clone(),
            )? {
                RegisterOutcome::Registered => registered.push(name),
                RegisterOutcome::Duplicate { .. } => duplicates.push(name),
            }
        }

        Ok(RootOutcome {
            root: resolved.root().identity.clone(),
            layout,
            registered,
            duplicates,
            skipped_dependencies: resolved.skipped().to_vec(),
            skipped_downloads: fetched.skipped,
        })
    }

    /// Load every requested root concurrently
    ///
    /// Each failure is confined to its own root and reported in the summary.
    pub async fn load_all(&self, requests: &[PackageRequest], cancel: &CancellationToken) -> LoadSummary {
        let pipelines = requests.iter().map(|request| async move {
            (request.package_id(), self.load_root(request, cancel).await)
        });
        let results = futures::future::join_all(pipelines).await;

        let mut summary = LoadSummary::default();
        for (id, result) in results {
            match result {
                Ok(outcome) => {
                    info!(
                        "Loaded {} with components [{}]",
                        outcome.root,
                        outcome.registered.join(", ")
                    );
                    summary.loaded.push(outcome);
                }
                Err(LoaderError::Cancelled) => {
                    warn!("Loading {} was cancelled", id);
                    summary.failed.push((id, LoaderError::Cancelled));
                }
                Err(e) => {
                    error!("Failed to load {}: {}", id, e);
                    summary.failed.push((id, e));
                }
            }
        }
        summary
    }
}
