//! Isolated loading of root binaries

mod common;

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};

use common::{FakeBinary, LoaderTestFixture};
use component_loader::{
    ApplicationInfo, CancellationToken, ExtractedLayout, LoaderError, PackageId,
    ServiceCollection, ServiceDescriptor, CONTRACT_ID,
};

fn library_file(module: &str) -> String {
    format!("{}{}{}", DLL_PREFIX, module, DLL_SUFFIX)
}

async fn layout_for(fixture: &LoaderTestFixture, root: &str) -> ExtractedLayout {
    let cancel = CancellationToken::new();
    let set = fixture
        .resolver()
        .resolve(&PackageId::new(root), None, &fixture.platform(), &cancel)
        .await
        .unwrap();
    let report = fixture.fetcher().fetch_all(&set, &cancel).await.unwrap();
    fixture
        .extractor()
        .extract(&set, &report.artifacts, &fixture.platform())
        .unwrap()
}

fn service<'a>(services: &'a [ServiceDescriptor], contract: &str) -> &'a ServiceDescriptor {
    services
        .iter()
        .find(|s| s.contract == contract)
        .unwrap_or_else(|| panic!("no service for {}", contract))
}

/// Path of a `local:<path>` resolution
fn local_path(resolution: &str) -> PathBuf {
    PathBuf::from(
        resolution
            .strip_prefix("local:")
            .unwrap_or_else(|| panic!("{} is not a local resolution", resolution)),
    )
}

#[tokio::test]
async fn test_load_exposes_components_over_contract() {
    let fixture = LoaderTestFixture::new();
    fixture.publish_root("App", "1.0.0", &[], &["Reports", "Billing"]);
    let layout = layout_for(&fixture, "App").await;
    let loader = fixture.loader();

    let loaded = loader.load(&layout.root_binary).await.unwrap();

    let names: Vec<&str> = loaded.components.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["Reports", "Billing"]);
    assert_eq!(loaded.context.root_binary(), layout.root_binary.as_path());
    assert_eq!(loaded.context.flat_dir(), layout.binary_dir.as_path());
    assert_eq!(loader.context_count(), 1);

    let mut services = ServiceCollection::new();
    for component in &loaded.components {
        component.register_services(&mut services).await.unwrap();
    }
    let reports = service(services.services(), "Reports.service");
    assert_eq!(reports.component.as_deref(), Some("Reports"));
    assert_eq!(services.len(), 2);

    loaded.components[1]
        .activate(&ApplicationInfo::new("host"))
        .await
        .unwrap();
    assert_eq!(fixture.launcher.activations(), vec!["Billing@host"]);
}

#[tokio::test]
async fn test_contract_module_resolves_to_host() {
    let fixture = LoaderTestFixture::new();
    fixture.publish_root("App", "1.0.0", &[("Shadow", "*")], &["App"]);
    // A private copy of the contract module must never be used
    fixture.publish_library("Shadow", "1.0.0", &[], &library_file("component_loader"));
    fixture.launcher.install(
        "App",
        FakeBinary::exposing(&["App"]).looking_up(&["component_loader", "component_loader_macros"]),
    );
    let layout = layout_for(&fixture, "App").await;
    assert!(layout.binary_dir.join(library_file("component_loader")).is_file());

    let loaded = fixture.loader().load(&layout.root_binary).await.unwrap();
    let mut services = ServiceCollection::new();
    loaded.components[0]
        .register_services(&mut services)
        .await
        .unwrap();

    assert_eq!(
        service(services.services(), "module:component_loader").implementation,
        "host"
    );
    assert_eq!(
        service(services.services(), "module:component_loader_macros").implementation,
        "host"
    );
}

#[tokio::test]
async fn test_contract_mismatch_is_a_load_error() {
    let fixture = LoaderTestFixture::new();
    fixture.publish_root("App", "1.0.0", &[], &["App"]);
    fixture.launcher.install(
        "App",
        FakeBinary {
            contract: Some("component-loader-contract/0.0".to_string()),
            ..FakeBinary::exposing(&["App"])
        },
    );
    let layout = layout_for(&fixture, "App").await;
    let loader = fixture.loader();

    let err = loader.load(&layout.root_binary).await.unwrap_err();
    match err {
        LoaderError::Load { binary, message } => {
            assert_eq!(binary, layout.root_binary);
            assert!(message.contains(CONTRACT_ID));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(loader.context_count(), 1);
    assert_eq!(fixture.launcher.launches(), 1);
    assert_eq!(fixture.launcher.released(), 1);
}

#[tokio::test]
async fn test_binary_without_components_is_a_load_error() {
    let fixture = LoaderTestFixture::new();
    fixture.publish_root("App", "1.0.0", &[], &[]);
    let layout = layout_for(&fixture, "App").await;

    let loader = fixture.loader();

    let err = loader.load(&layout.root_binary).await.unwrap_err();
    assert!(matches!(err, LoaderError::Load { .. }));
    assert_eq!(fixture.launcher.released(), 1);
    assert_eq!(loader.context_count(), 1);
}

#[tokio::test]
async fn test_accepted_binary_stays_running() {
    let fixture = LoaderTestFixture::new();
    fixture.publish_root("App", "1.0.0", &[], &["App"]);
    let layout = layout_for(&fixture, "App").await;
    let loader = fixture.loader();

    let loaded = loader.load(&layout.root_binary).await.unwrap();
    drop(loaded);

    assert_eq!(fixture.launcher.launches(), 1);
    assert_eq!(fixture.launcher.released(), 0);
    drop(loader);
    assert_eq!(fixture.launcher.released(), 1);
}

#[tokio::test]
async fn test_missing_binary_is_not_launched() {
    let fixture = LoaderTestFixture::new();
    let loader = fixture.loader();

    let err = loader
        .load(Path::new("/nonexistent/flat/App"))
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::Load { .. }));
    assert_eq!(fixture.launcher.launches(), 0);
    assert_eq!(loader.context_count(), 0);
}

#[tokio::test]
async fn test_private_dependencies_are_isolated() {
    let fixture = LoaderTestFixture::new();
    let thirdparty = library_file("thirdparty");
    fixture.publish_root("Left", "1.0.0", &[("ThirdParty", ">=1.0 <2.0")], &["Left"]);
    fixture.publish_root("Right", "1.0.0", &[("ThirdParty", ">=2.0")], &["Right"]);
    fixture.publish_library("ThirdParty", "1.0.0", &[], &thirdparty);
    fixture.publish_library("ThirdParty", "2.0.0", &[], &thirdparty);
    for root in ["Left", "Right"] {
        fixture
            .launcher
            .install(root, FakeBinary::exposing(&[root]).looking_up(&["thirdparty"]));
    }

    let loader = fixture.loader();
    let mut observed = Vec::new();
    for root in ["Left", "Right"] {
        let layout = layout_for(&fixture, root).await;
        let loaded = loader.load(&layout.root_binary).await.unwrap();
        let mut services = ServiceCollection::new();
        loaded.components[0]
            .register_services(&mut services)
            .await
            .unwrap();
        let path = local_path(&service(services.services(), "module:thirdparty").implementation);
        assert_eq!(path.parent().unwrap(), layout.binary_dir.as_path());
        observed.push(std::fs::read_to_string(path).unwrap());
    }

    assert_eq!(observed, vec!["ThirdParty 1.0.0", "ThirdParty 2.0.0"]);
    assert_eq!(loader.context_count(), 2);
}

#[tokio::test]
async fn test_runtime_modules_prefer_the_flat_directory() {
    let fixture = LoaderTestFixture::new();
    fixture.publish_root("App", "1.0.0", &[("Runtime", "*")], &["App"]);
    fixture.publish_library("Runtime", "1.0.0", &[], &library_file("libc_shim"));
    fixture.launcher.install(
        "App",
        FakeBinary::exposing(&["App"]).looking_up(&["libc_shim", "libcrypto_absent", "unbundled"]),
    );
    let layout = layout_for(&fixture, "App").await;

    let loaded = fixture.loader().load(&layout.root_binary).await.unwrap();
    let mut services = ServiceCollection::new();
    loaded.components[0]
        .register_services(&mut services)
        .await
        .unwrap();
    let services = services.services();

    let shim = local_path(&service(services, "module:libc_shim").implementation);
    assert_eq!(shim, layout.binary_dir.join(library_file("libc_shim")));
    assert_eq!(service(services, "module:libcrypto_absent").implementation, "host");
    assert_eq!(service(services, "module:unbundled").implementation, "host");
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_launcher_confines_the_child() {
    use component_loader::loader::{ModuleResolution, ProcessLauncher, LIBRARY_PATH_ENV, MODULE_MAP_ENV};
    use component_loader::{IsolatedLoader, LauncherConfig, SharedContractSet};
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    let temp = tempfile::TempDir::new().unwrap();
    let flat = temp.path().join("flat");
    std::fs::create_dir_all(&flat).unwrap();
    std::fs::write(flat.join(library_file("thirdparty")), b"private").unwrap();

    // Records its environment and exits without ever opening the socket
    let script = flat.join("app");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\nprintf '%s' \"${}\" > module-map.json\nprintf '%s' \"${}\" > library-path.txt\n",
            MODULE_MAP_ENV, LIBRARY_PATH_ENV
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let launcher = ProcessLauncher::new(
        temp.path().join("sockets"),
        LauncherConfig {
            startup_wait_millis: 10,
            socket_check_interval_millis: 25,
            socket_max_attempts: 20,
            ..LauncherConfig::default()
        },
    );
    let loader = IsolatedLoader::new(SharedContractSet::host(), Arc::new(launcher));

    let err = loader.load(&script).await.unwrap_err();
    assert!(matches!(err, LoaderError::Load { .. }));

    let map_file = flat.join("module-map.json");
    let path_file = flat.join("library-path.txt");
    for _ in 0..100 {
        if path_file.is_file() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let map: BTreeMap<String, ModuleResolution> =
        serde_json::from_str(&std::fs::read_to_string(map_file).unwrap()).unwrap();
    assert_eq!(
        map.get("thirdparty"),
        Some(&ModuleResolution::Local(flat.join(library_file("thirdparty"))))
    );
    assert_eq!(map.get("component_loader"), Some(&ModuleResolution::Host));
    assert!(!map.contains_key("app"));
    assert_eq!(
        std::fs::read_to_string(path_file).unwrap(),
        flat.display().to_string()
    );
}
