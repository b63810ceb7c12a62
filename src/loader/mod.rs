//! Isolated loading of root binaries
//!
//! Each root binary gets its own [`IsolationContext`]. The context decides
//! per module whether the host's copy or the flat directory's private copy
//! is used; the [`ComponentLauncher`] runs the binary under that decision
//! and reports the components it exposes. Contexts are retained until the
//! host process exits; a launched binary is retained only once accepted.

pub mod context;
pub mod launcher;
pub mod shared;

use std::any::Any;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::component::{Component, CONTRACT_ID};
use crate::error::LoaderError;

pub use context::{IsolationContext, ModuleResolution};
pub use launcher::{
    ComponentLauncher, LaunchedBinary, CONTEXT_ID_ENV, LIBRARY_PATH_ENV, MODULE_MAP_ENV,
};
#[cfg(unix)]
pub use launcher::{ComponentProcess, ProcessLauncher};
pub use shared::{SharedContractSet, SharingPolicy};

/// A loaded root binary and the components it exposes
#[derive(Clone)]
pub struct LoadedBinary {
    pub context: Arc<IsolationContext>,
    pub components: Vec<Arc<dyn Component>>,
}

impl std::fmt::Debug for LoadedBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let components: Vec<&str> = self.components.iter().map(|c| c.name()).collect();
        f.debug_struct("LoadedBinary")
            .field("context", &self.context.id())
            .field("root_binary", &self.context.root_binary())
            .field("components", &components)
            .finish()
    }
}

struct Retained {
    _context: Arc<IsolationContext>,
    _keepalive: Option<Box<dyn Any + Send + Sync>>,
}

/// Loads root binaries into isolation contexts
pub struct IsolatedLoader {
    shared: Arc<SharedContractSet>,
    launcher: Arc<dyn ComponentLauncher>,
    retained: Mutex<Vec<Retained>>,
}

impl IsolatedLoader {
    pub fn new(shared: SharedContractSet, launcher: Arc<dyn ComponentLauncher>) -> Self {
        Self {
            shared: Arc::new(shared),
            launcher,
            retained: Mutex::new(Vec::new()),
        }
    }

    pub fn shared(&self) -> &SharedContractSet {
        &self.shared
    }

    /// Number of contexts kept alive
    pub fn context_count(&self) -> usize {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Load a root binary from its flat directory
    ///
    /// Fails when the binary cannot be started, was built against another
    /// contract, or exposes no components. A rejected binary is released
    /// right away; only its context is retained.
    pub async fn load(&self, root_binary: &Path) -> Result<LoadedBinary, LoaderError> {
        if !root_binary.is_file() {
            return Err(LoaderError::load(root_binary, "root binary does not exist"));
        }

        let context = Arc::new(IsolationContext::new(root_binary, self.shared.clone()));
        info!(
            "Loading {:?} in isolation context {}",
            root_binary,
            context.id()
        );

        let launched = self.launcher.launch(&context).await?;

        let rejection = if launched.contract != CONTRACT_ID {
            Some(format!(
                "built against contract {}, host provides {}",
                launched.contract, CONTRACT_ID
            ))
        } else if launched.components.is_empty() {
            Some("binary exposes no components".to_string())
        } else {
            None
        };
        if let Some(message) = rejection {
            warn!("Rejecting {:?}: {}", root_binary, message);
            drop(launched);
            self.retain(&context, None);
            return Err(LoaderError::load(root_binary, message));
        }

        let names: Vec<&str> = launched.components.iter().map(|c| c.name()).collect();
        if names.iter().any(|n| n.trim().is_empty()) {
            warn!("{:?} exposes a component with an empty name", root_binary);
        }
        info!("Loaded {:?}: {}", root_binary, names.join(", "));

        self.retain(&context, launched.keepalive);
        Ok(LoadedBinary {
            context,
            components: launched.components,
        })
    }

    fn retain(&self, context: &Arc<IsolationContext>, keepalive: Option<Box<dyn Any + Send + Sync>>) {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Retained {
                _context: context.clone(),
                _keepalive: keepalive,
            });
    }
}
