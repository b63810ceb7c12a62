//! Per-root isolation contexts

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::layout::LAYOUT_MARKER;
use crate::loader::shared::{SharedContractSet, SharingPolicy};

/// Where a module request is satisfied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", content = "path", rename_all = "lowercase")]
pub enum ModuleResolution {
    /// The host's already loaded copy
    Host,
    /// A private copy in the flat directory
    Local(PathBuf),
}

/// Loading boundary for one root component
///
/// Resolves module names against the root binary's flat directory and the
/// host's shared contract set. Never torn down once created.
#[derive(Debug)]
pub struct IsolationContext {
    id: Uuid,
    root_binary: PathBuf,
    flat_dir: PathBuf,
    shared: Arc<SharedContractSet>,
}

impl IsolationContext {
    pub fn new(root_binary: &Path, shared: Arc<SharedContractSet>) -> Self {
        let flat_dir = root_binary
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            root_binary: root_binary.to_path_buf(),
            flat_dir,
            shared,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root_binary(&self) -> &Path {
        &self.root_binary
    }

    pub fn flat_dir(&self) -> &Path {
        &self.flat_dir
    }

    pub fn shared(&self) -> &SharedContractSet {
        &self.shared
    }

    /// Decide where a requested module comes from
    pub fn resolve_module(&self, module: &str) -> ModuleResolution {
        match self.shared.classify(module) {
            SharingPolicy::Shared => ModuleResolution::Host,
            SharingPolicy::PreferLocal | SharingPolicy::Private => match self.find_local(module) {
                Some(path) => ModuleResolution::Local(path),
                None => {
                    debug!(
                        "No local copy of {} in {:?}, using the host's",
                        module, self.flat_dir
                    );
                    ModuleResolution::Host
                }
            },
        }
    }

    /// Private file for `module`: the bare name or the platform library name
    fn find_local(&self, module: &str) -> Option<PathBuf> {
        use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
        [
            module.to_string(),
            format!("{}{}", module, DLL_SUFFIX),
            format!("{}{}{}", DLL_PREFIX, module, DLL_SUFFIX),
        ]
        .iter()
        .map(|candidate| self.flat_dir.join(candidate))
        .find(|path| path.is_file())
    }

    /// Resolution of every module in the flat directory plus every contract
    /// module, keyed by module name
    pub fn module_map(&self) -> BTreeMap<String, ModuleResolution> {
        let mut map = BTreeMap::new();
        for module in self.shared.contract_modules() {
            map.insert(module.to_string(), ModuleResolution::Host);
        }

        let entries = match std::fs::read_dir(&self.flat_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {:?}: {}", self.flat_dir, e);
                return map;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path == self.root_binary {
                continue;
            }
            let Some(module) = module_name(&path) else {
                continue;
            };
            let resolution = self.resolve_module(&module);
            map.insert(module, resolution);
        }
        map
    }
}

/// Module name of a library file: `libfoo.so` → `foo`
fn module_name(path: &Path) -> Option<String> {
    use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
    let file = path.file_name()?.to_str()?;
    if file == LAYOUT_MARKER {
        return None;
    }
    let stem = file.strip_suffix(DLL_SUFFIX).unwrap_or(file);
    let stem = if DLL_PREFIX.is_empty() {
        stem
    } else {
        stem.strip_prefix(DLL_PREFIX).unwrap_or(stem)
    };
    (!stem.is_empty()).then(|| stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
    use tempfile::TempDir;

    fn library(name: &str) -> String {
        format!("{}{}{}", DLL_PREFIX, name, DLL_SUFFIX)
    }

    fn context(dir: &Path) -> IsolationContext {
        IsolationContext::new(&dir.join("app"), Arc::new(SharedContractSet::host()))
    }

    #[test]
    fn test_contract_modules_always_delegate() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(library("component_loader")), b"private copy").unwrap();
        let ctx = context(temp.path());
        assert_eq!(ctx.resolve_module("component_loader"), ModuleResolution::Host);
    }

    #[test]
    fn test_private_modules_resolve_locally() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path().join(library("thirdparty"));
        std::fs::write(&lib, b"v1").unwrap();
        let ctx = context(temp.path());
        assert_eq!(ctx.resolve_module("thirdparty"), ModuleResolution::Local(lib));
        assert_eq!(ctx.resolve_module("absent"), ModuleResolution::Host);
    }

    #[test]
    fn test_runtime_modules_prefer_local_copy() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        assert_eq!(ctx.resolve_module("libc"), ModuleResolution::Host);

        let lib = temp.path().join("libc");
        std::fs::write(&lib, b"newer").unwrap();
        assert_eq!(ctx.resolve_module("libc"), ModuleResolution::Local(lib));
    }

    #[test]
    fn test_module_map() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("app"), b"root").unwrap();
        std::fs::write(temp.path().join(library("thirdparty")), b"v1").unwrap();
        std::fs::write(temp.path().join(LAYOUT_MARKER), b"{}").unwrap();

        let map = context(temp.path()).module_map();
        assert_eq!(map.get("component_loader"), Some(&ModuleResolution::Host));
        assert!(matches!(map.get("thirdparty"), Some(ModuleResolution::Local(_))));
        assert!(!map.contains_key("app"));
        assert!(!map.contains_key(LAYOUT_MARKER));

        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"from\":\"host\""));
    }
}
