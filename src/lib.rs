//! Component Loader - runtime extension of a host process with packaged components
//!
//! A host names root packages; this crate resolves their dependency closure
//! against one or more package registries, fetches and caches the artifacts,
//! lays the binaries out in one flat directory per root, and starts each
//! root binary in its own isolation context. Components exposed by the
//! binary are recorded in a [`ModuleRegistry`] that drives their two-phase
//! lifecycle.
//!
//! ## Pipeline
//!
//! 1. [`DependencyResolver`] (registry-prioritized, highest version wins)
//! 2. [`PackageFetcher`] (on-disk artifact cache)
//! 3. [`LayoutExtractor`] (nearest platform group, flattened)
//! 4. [`IsolatedLoader`] (shared contract set, private everything else)
//! 5. [`ModuleRegistry`] (register services, then activate)
//!
//! [`ComponentManager`] runs the pipeline for many roots at once.

pub mod component;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ipc;
pub mod layout;
pub mod loader;
pub mod manager;
pub mod modules;
pub mod package;
pub mod resolver;
pub mod source;
pub mod utils;

pub use component::{
    ApplicationHandle, ApplicationInfo, Component, ComponentError, ServiceCollection,
    ServiceDescriptor, ServiceLifetime, ServiceSink, CONTRACT_ID,
};
pub use config::{HostConfig, LauncherConfig, LoggingConfig, PackageRequest};
pub use error::{LoaderError, LoaderResult};
pub use fetch::{ArtifactCache, FetchedArtifact, PackageFetcher};
pub use layout::{ExtractedLayout, LayoutExtractor};
pub use loader::{
    ComponentLauncher, IsolatedLoader, IsolationContext, LaunchedBinary, LoadedBinary,
    ModuleResolution, SharedContractSet,
};
pub use manager::{ComponentManager, LoadSummary, RootOutcome};
pub use modules::{LifecyclePhase, ModuleEntry, ModuleRegistry, RegisterOutcome};
pub use package::{
    DependencyEdge, PackageId, PackageIdentity, PackageVersion, Platform, VersionRange,
};
pub use resolver::{DependencyResolver, ResolvedPackage, ResolvedSet, SkippedDependency};
pub use source::{InMemoryRegistry, LocalRegistry, PackageRegistry, RegistryHandle};

/// Re-exported so hosts can cancel pipelines without a direct dependency
pub use tokio_util::sync::CancellationToken;
