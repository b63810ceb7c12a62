//! Shared fixtures for integration tests
//!
//! Artifacts are built in memory as gzip tarballs and published to an
//! [`InMemoryRegistry`]. Root binaries are "launched" by [`FakeLauncher`],
//! which serves real [`ComponentServer`]s over in-memory duplex streams so
//! the whole IPC path runs without spawning processes.

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use component_loader::ipc::{remote_components, ComponentIpcClient, ComponentServer};
use component_loader::loader::ModuleResolution;
use component_loader::{
    ApplicationHandle, ArtifactCache, Component, ComponentError, ComponentLauncher,
    ComponentManager, DependencyResolver, HostConfig, InMemoryRegistry, IsolatedLoader,
    IsolationContext, LaunchedBinary, LayoutExtractor, LoaderError, ModuleRegistry,
    PackageFetcher, Platform, RegistryHandle, ServiceDescriptor, ServiceSink, SharedContractSet,
};

/// Platform every fixture targets
pub const TEST_PLATFORM: &str = "linux-x86_64";

/// File name of the root binary for `id` on this host
pub fn binary_name(id: &str) -> String {
    format!("{}{}", id, std::env::consts::EXE_SUFFIX)
}

/// Builds a package artifact (`.tgz`)
#[derive(Debug, Clone, Default)]
pub struct ArtifactBuilder {
    manifest: Option<String>,
    files: Vec<(String, Vec<u8>, u32)>,
}

impl ArtifactBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact whose root binary for `id` sits in the `any` group
    pub fn component(id: &str) -> Self {
        Self::new().binary("any", &binary_name(id), id.as_bytes())
    }

    pub fn manifest(mut self, name: &str, version: &str, entry_point: Option<&str>) -> Self {
        let mut toml = format!("name = \"{}\"\nversion = \"{}\"\n", name, version);
        if let Some(entry) = entry_point {
            toml.push_str(&format!("entry_point = \"{}\"\n", entry));
        }
        self.manifest = Some(toml);
        self
    }

    pub fn binary(mut self, group: &str, name: &str, data: &[u8]) -> Self {
        self.files
            .push((format!("bin/{}/{}", group, name), data.to_vec(), 0o755));
        self
    }

    pub fn content(mut self, path: &str, data: &[u8]) -> Self {
        self.files
            .push((format!("content/{}", path), data.to_vec(), 0o644));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut append = |path: &str, data: &[u8], mode: u32| {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(mode);
            header.set_cksum();
            builder.append_data(&mut header, path, data).unwrap();
        };
        if let Some(manifest) = &self.manifest {
            append("package.toml", manifest.as_bytes(), 0o644);
        }
        for (path, data, mode) in &self.files {
            append(path, data, *mode);
        }
        builder.into_inner().unwrap().finish().unwrap()
    }
}

/// Component served by [`FakeLauncher`]
///
/// Registers one service per looked-up module describing where the module
/// resolved in its isolation context, and records activations.
pub struct TestComponent {
    name: String,
    resolutions: Vec<(String, String)>,
    activations: Arc<Mutex<Vec<String>>>,
    fail_activation: bool,
}

#[async_trait]
impl Component for TestComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register_services(&self, services: &mut dyn ServiceSink) -> Result<(), ComponentError> {
        services.add(ServiceDescriptor::singleton(
            format!("{}.service", self.name),
            self.name.clone(),
        ));
        for (module, resolution) in &self.resolutions {
            services.add(ServiceDescriptor::singleton(
                format!("module:{}", module),
                resolution.clone(),
            ));
        }
        Ok(())
    }

    async fn activate(&self, application: &dyn ApplicationHandle) -> Result<(), ComponentError> {
        if self.fail_activation {
            return Err(ComponentError::Operation(format!(
                "{} refused to start",
                self.name
            )));
        }
        self.activations
            .lock()
            .unwrap()
            .push(format!("{}@{}", self.name, application.name()));
        Ok(())
    }
}

/// What a fake root binary exposes
#[derive(Debug, Clone, Default)]
pub struct FakeBinary {
    pub components: Vec<String>,
    /// Reported contract instead of the real one
    pub contract: Option<String>,
    /// Modules resolved through the isolation context at launch
    pub lookup_modules: Vec<String>,
    pub fail_activation: bool,
}

impl FakeBinary {
    pub fn exposing(components: &[&str]) -> Self {
        Self {
            components: components.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn looking_up(mut self, modules: &[&str]) -> Self {
        self.lookup_modules = modules.iter().map(|m| m.to_string()).collect();
        self
    }
}

/// Render a resolution the way [`TestComponent`] reports it
pub fn describe(resolution: &ModuleResolution) -> String {
    match resolution {
        ModuleResolution::Host => "host".to_string(),
        ModuleResolution::Local(path) => format!("local:{}", path.display()),
    }
}

/// Stands in for a running process; counts its release
struct FakeProcess {
    released: Arc<AtomicUsize>,
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Launcher that serves fake binaries over in-memory streams
#[derive(Default)]
pub struct FakeLauncher {
    binaries: Mutex<HashMap<String, FakeBinary>>,
    launches: AtomicUsize,
    released: Arc<AtomicUsize>,
    activations: Arc<Mutex<Vec<String>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register what the root binary named `stem` exposes
    pub fn install(&self, stem: &str, binary: FakeBinary) {
        self.binaries
            .lock()
            .unwrap()
            .insert(stem.to_string(), binary);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Launched binaries the loader has let go of
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// `component@application` for every activation, in order
    pub fn activations(&self) -> Vec<String> {
        self.activations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComponentLauncher for FakeLauncher {
    async fn launch(&self, context: &IsolationContext) -> Result<LaunchedBinary, LoaderError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let root_binary = context.root_binary().to_path_buf();
        let stem = root_binary
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let binary = self
            .binaries
            .lock()
            .unwrap()
            .get(&stem)
            .cloned()
            .ok_or_else(|| LoaderError::load(&root_binary, "no fake binary installed"))?;

        let resolutions: Vec<(String, String)> = binary
            .lookup_modules
            .iter()
            .map(|m| (m.clone(), describe(&context.resolve_module(m))))
            .collect();

        let mut server = ComponentServer::new();
        for name in &binary.components {
            server = server.with_component(TestComponent {
                name: name.clone(),
                resolutions: resolutions.clone(),
                activations: self.activations.clone(),
                fail_activation: binary.fail_activation,
            });
        }

        let (host_end, component_end) = tokio::io::duplex(64 * 1024);
        tokio::spawn(server.serve_connection(component_end));

        let mut client = ComponentIpcClient::from_stream(host_end);
        let ack = client
            .handshake(&context.id().to_string())
            .await
            .map_err(|e| LoaderError::load(&root_binary, e.to_string()))?;

        Ok(LaunchedBinary {
            contract: binary.contract.unwrap_or(ack.contract),
            components: remote_components(client, &ack.components),
            keepalive: Some(Box::new(FakeProcess {
                released: self.released.clone(),
            })),
        })
    }
}

/// Temp directory, registry, launcher and module registry for one test
pub struct LoaderTestFixture {
    pub temp_dir: TempDir,
    pub registry: Arc<InMemoryRegistry>,
    pub launcher: Arc<FakeLauncher>,
    pub modules: Arc<ModuleRegistry>,
}

impl LoaderTestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            registry: Arc::new(InMemoryRegistry::new("primary")),
            launcher: Arc::new(FakeLauncher::new()),
            modules: Arc::new(ModuleRegistry::new()),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform::new(TEST_PLATFORM)
    }

    pub fn config(&self) -> HostConfig {
        HostConfig {
            platform: Some(TEST_PLATFORM.to_string()),
            base_dir: Some(self.temp_dir.path().to_string_lossy().to_string()),
            ..HostConfig::default()
        }
    }

    pub fn fetcher(&self) -> PackageFetcher {
        PackageFetcher::new(ArtifactCache::new(self.config().cache_dir()))
    }

    pub fn extractor(&self) -> LayoutExtractor {
        let config = self.config();
        LayoutExtractor::new(config.layouts_dir(), config.content_dir())
    }

    pub fn resolver(&self) -> DependencyResolver {
        DependencyResolver::new(vec![self.registry.clone() as RegistryHandle])
    }

    pub fn loader(&self) -> IsolatedLoader {
        IsolatedLoader::new(SharedContractSet::host(), self.launcher.clone())
    }

    pub fn manager(&self) -> ComponentManager {
        ComponentManager::new(
            self.resolver(),
            self.fetcher(),
            self.extractor(),
            self.loader(),
            self.modules.clone(),
            self.platform(),
        )
    }

    /// Publish a version with an artifact
    pub fn publish(&self, id: &str, version: &str, dependencies: &[(&str, &str)], artifact: ArtifactBuilder) {
        self.registry.publish(id, version, dependencies).unwrap();
        self.registry
            .set_artifact(id, version, artifact.build())
            .unwrap();
    }

    /// Publish a root package exposing `components`
    pub fn publish_root(&self, id: &str, version: &str, dependencies: &[(&str, &str)], components: &[&str]) {
        self.publish(id, version, dependencies, ArtifactBuilder::component(id));
        self.launcher.install(id, FakeBinary::exposing(components));
    }

    /// Publish a library package shipping one binary named `file`
    pub fn publish_library(&self, id: &str, version: &str, dependencies: &[(&str, &str)], file: &str) {
        let data = format!("{} {}", id, version);
        self.publish(
            id,
            version,
            dependencies,
            ArtifactBuilder::new().binary("any", file, data.as_bytes()),
        );
    }
}
