//! Component contract shared by host and component binaries
//!
//! Both sides compile these types from this crate, so a component process
//! and the host agree on them by construction. The handshake compares
//! [`CONTRACT_ID`] to catch binaries built against another contract.

pub mod error;
pub mod services;

use async_trait::async_trait;

pub use error::ComponentError;
pub use services::{ApplicationInfo, ServiceCollection, ServiceDescriptor, ServiceLifetime};

/// Identity of this contract revision
pub const CONTRACT_ID: &str = concat!(
    "component-loader-contract/",
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR")
);

/// Receives service registrations during the first lifecycle phase
pub trait ServiceSink: Send {
    fn add(&mut self, service: ServiceDescriptor);
}

/// Opaque handle to the host application, passed to the second phase
pub trait ApplicationHandle: Send + Sync {
    /// Application name
    fn name(&self) -> &str;

    /// Key-value settings the host exposes to components
    fn properties(&self) -> &std::collections::HashMap<String, String>;
}

/// A unit of host-extending code
///
/// Implemented inside component binaries and exposed through
/// [`crate::ipc::ComponentServer`]. On the host side the loader hands out
/// proxies implementing the same trait.
#[async_trait]
pub trait Component: Send + Sync {
    /// Declared name, unique among loaded components
    fn name(&self) -> &str;

    /// Phase one: declare services before the host application is built
    async fn register_services(&self, services: &mut dyn ServiceSink) -> Result<(), ComponentError>;

    /// Phase two: hook into the finished application
    async fn activate(&self, application: &dyn ApplicationHandle) -> Result<(), ComponentError>;
}

impl std::fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Component({})", self.name())
    }
}
