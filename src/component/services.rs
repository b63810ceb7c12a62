//! Serializable service and application descriptions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::component::{ApplicationHandle, ServiceSink};

/// How long a registered service instance lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceLifetime {
    Singleton,
    Scoped,
    Transient,
}

/// A service a component contributes to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Contract the service satisfies
    pub contract: String,
    /// Implementation name inside the component
    pub implementation: String,
    pub lifetime: ServiceLifetime,
    /// Declared name of the registering component, filled in by the host
    #[serde(default)]
    pub component: Option<String>,
}

impl ServiceDescriptor {
    pub fn new(contract: impl Into<String>, implementation: impl Into<String>, lifetime: ServiceLifetime) -> Self {
        Self {
            contract: contract.into(),
            implementation: implementation.into(),
            lifetime,
            component: None,
        }
    }

    pub fn singleton(contract: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self::new(contract, implementation, ServiceLifetime::Singleton)
    }
}

/// Plain list of registered services
#[derive(Debug, Clone, Default)]
pub struct ServiceCollection {
    services: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn into_services(self) -> Vec<ServiceDescriptor> {
        self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceSink for ServiceCollection {
    fn add(&mut self, service: ServiceDescriptor) {
        self.services.push(service);
    }
}

/// Application handle that can travel over IPC
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub name: String,
    pub properties: HashMap<String, String>,
}

impl ApplicationInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Snapshot any handle
    pub fn from_handle(handle: &dyn ApplicationHandle) -> Self {
        Self {
            name: handle.name().to_string(),
            properties: handle.properties().clone(),
        }
    }
}

impl ApplicationHandle for ApplicationInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }
}
