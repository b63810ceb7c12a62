//! Registry of loaded components and their two-phase lifecycle
//!
//! Entries are keyed by declared name; the first registration of a name
//! wins and later ones are skipped. Phase one (`register_services`) runs
//! before the host application is finalized, phase two (`activate`) after,
//! both in registration order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::component::{ApplicationHandle, Component, ServiceSink};
use crate::error::LoaderError;
use crate::loader::IsolationContext;

/// Lifecycle phase of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Components may be registered
    Loading,
    /// Phase one has run
    ServicesRegistered,
    /// Phase two has run
    Activated,
}

/// One loaded component
pub struct ModuleEntry {
    pub name: String,
    pub instance: Arc<dyn Component>,
    /// Root binary the component came from
    pub binary: PathBuf,
    pub context: Arc<IsolationContext>,
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .field("binary", &self.binary)
            .field("context", &self.context.id())
            .finish()
    }
}

/// Result of [`ModuleRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The name was already taken by a component from `existing_binary`
    Duplicate { existing_binary: PathBuf },
}

/// Per-component results of one lifecycle phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReport {
    pub completed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl HookReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Inner {
    entries: Vec<Arc<ModuleEntry>>,
    names: HashSet<String>,
    phase: LifecyclePhase,
}

/// Long-lived registry of every loaded component
pub struct ModuleRegistry {
    inner: Mutex<Inner>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                names: HashSet::new(),
                phase: LifecyclePhase::Loading,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.inner().phase
    }

    /// Record a loaded component
    ///
    /// A name that is already registered is skipped and reported as a
    /// duplicate. Registration is only possible before phase one.
    pub fn register(
        &self,
        name: &str,
        instance: Arc<dyn Component>,
        binary: &Path,
        context: Arc<IsolationContext>,
    ) -> Result<RegisterOutcome, LoaderError> {
        let mut inner = self.inner();
        if inner.phase != LifecyclePhase::Loading {
            return Err(LoaderError::Lifecycle(format!(
                "cannot register {} after services were registered",
                name
            )));
        }

        if inner.names.contains(name) {
            let existing_binary = inner
                .entries
                .iter()
                .find(|e| e.name == name)
                .map(|e| e.binary.clone())
                .unwrap_or_default();
            warn!(
                "Skipping component {} from {:?}: already loaded from {:?}",
                name, binary, existing_binary
            );
            return Ok(RegisterOutcome::Duplicate { existing_binary });
        }

        inner.names.insert(name.to_string());
        inner.entries.push(Arc::new(ModuleEntry {
            name: name.to_string(),
            instance,
            binary: binary.to_path_buf(),
            context,
        }));
        info!("Registered component {} from {:?}", name, binary);
        Ok(RegisterOutcome::Registered)
    }

    /// All entries in registration order
    pub fn all(&self) -> Vec<Arc<ModuleEntry>> {
        self.inner().entries.clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModuleEntry>> {
        self.inner().entries.iter().find(|e| e.name == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner().entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().entries.is_empty()
    }

    /// Move to `next` if the registry is in `expected`, returning the entries
    fn advance(
        &self,
        expected: LifecyclePhase,
        next: LifecyclePhase,
    ) -> Result<Vec<Arc<ModuleEntry>>, LoaderError> {
        let mut inner = self.inner();
        if inner.phase != expected {
            return Err(LoaderError::Lifecycle(format!(
                "expected phase {:?} before entering {:?}, registry is in {:?}",
                expected, next, inner.phase
            )));
        }
        inner.phase = next;
        Ok(inner.entries.clone())
    }

    /// Phase one: every component declares its services
    ///
    /// Must run before the host application is finalized. A failing
    /// component is logged and the others still run.
    pub async fn register_services(&self, services: &mut dyn ServiceSink) -> Result<HookReport, LoaderError> {
        let entries = self.advance(LifecyclePhase::Loading, LifecyclePhase::ServicesRegistered)?;
        let mut report = HookReport::default();
        for entry in entries {
            debug!("Registering services of {}", entry.name);
            match entry.instance.register_services(services).await {
                Ok(()) => report.completed.push(entry.name.clone()),
                Err(e) => {
                    error!("Component {} failed to register services: {}", entry.name, e);
                    report.failed.push((entry.name.clone(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Phase two: every component hooks into the finished application
    pub async fn activate(&self, application: &dyn ApplicationHandle) -> Result<HookReport, LoaderError> {
        let entries = self.advance(LifecyclePhase::ServicesRegistered, LifecyclePhase::Activated)?;
        let mut report = HookReport::default();
        for entry in entries {
            debug!("Activating {}", entry.name);
            match entry.instance.activate(application).await {
                Ok(()) => report.completed.push(entry.name.clone()),
                Err(e) => {
                    error!("Component {} failed to activate: {}", entry.name, e);
                    report.failed.push((entry.name.clone(), e.to_string()));
                }
            }
        }
        Ok(report)
    }
}
