//! Host-defined set of modules shared with every component
//!
//! Contract and framework modules must come from the host so both sides
//! agree on type identity. Low-level runtime modules are shared unless a
//! component ships its own copy. Everything else is private.

use std::collections::BTreeSet;

/// How a module name is treated by an isolation context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingPolicy {
    /// Always the host's copy
    Shared,
    /// A local copy if one exists, otherwise the host's
    PreferLocal,
    /// The component's own copy
    Private,
}

/// Closed set of shared module names, fixed when the host is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedContractSet {
    contract_modules: BTreeSet<String>,
    framework_prefixes: Vec<String>,
    runtime_prefixes: Vec<String>,
}

impl SharedContractSet {
    pub fn new<I, J, K>(contract_modules: I, framework_prefixes: J, runtime_prefixes: K) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        let lower = |s: &str| s.trim().to_ascii_lowercase();
        Self {
            contract_modules: contract_modules.into_iter().map(|s| lower(s.as_ref())).collect(),
            framework_prefixes: framework_prefixes.into_iter().map(|s| lower(s.as_ref())).collect(),
            runtime_prefixes: runtime_prefixes.into_iter().map(|s| lower(s.as_ref())).collect(),
        }
    }

    /// The set this host build shares with components
    pub fn host() -> Self {
        Self::new(
            ["component_loader", "component-loader"],
            ["component_loader_", "tokio", "serde", "bincode", "futures"],
            ["std-", "libc", "rustc_"],
        )
    }

    pub fn contract_modules(&self) -> impl Iterator<Item = &str> {
        self.contract_modules.iter().map(String::as_str)
    }

    /// Classify a module name (case-insensitive)
    pub fn classify(&self, module: &str) -> SharingPolicy {
        let name = module.trim().to_ascii_lowercase();
        if self.contract_modules.contains(&name)
            || self.framework_prefixes.iter().any(|p| name.starts_with(p.as_str()))
        {
            SharingPolicy::Shared
        } else if self.runtime_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            SharingPolicy::PreferLocal
        } else {
            SharingPolicy::Private
        }
    }
}

impl Default for SharedContractSet {
    fn default() -> Self {
        Self::host()
    }
}
