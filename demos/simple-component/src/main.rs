//! Simple example component for component-loader
//!
//! This binary demonstrates:
//! - Exposing components to the host over the IPC contract
//! - Registering services in phase one
//! - Reading host application properties in phase two
//! - Inspecting the module resolution table handed over by the host
//!
//! Usage (normally started by the host's process launcher):
//!   simple-component --socket-path <path> --instance-id <id>

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use component_loader::ipc::ComponentServer;
use component_loader::loader::{ModuleResolution, CONTEXT_ID_ENV, MODULE_MAP_ENV};
use component_loader::utils::init_component_logging;
use component_loader::{
    ApplicationHandle, Component, ComponentError, ServiceDescriptor, ServiceLifetime, ServiceSink,
};

/// Publishes a clock service
struct ClockComponent;

#[async_trait]
impl Component for ClockComponent {
    fn name(&self) -> &str {
        "SimpleClock"
    }

    async fn register_services(&self, services: &mut dyn ServiceSink) -> Result<(), ComponentError> {
        services.add(ServiceDescriptor::singleton("clock", "SystemClock"));
        Ok(())
    }

    async fn activate(&self, application: &dyn ApplicationHandle) -> Result<(), ComponentError> {
        info!("Clock attached to {}", application.name());
        Ok(())
    }
}

/// Greets in the host's configured locale
#[derive(Default)]
struct GreetingComponent {
    active: AtomicBool,
}

#[async_trait]
impl Component for GreetingComponent {
    fn name(&self) -> &str {
        "SimpleGreeting"
    }

    async fn register_services(&self, services: &mut dyn ServiceSink) -> Result<(), ComponentError> {
        services.add(ServiceDescriptor::new(
            "greeting",
            "LocalizedGreeting",
            ServiceLifetime::Scoped,
        ));
        Ok(())
    }

    async fn activate(&self, application: &dyn ApplicationHandle) -> Result<(), ComponentError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(ComponentError::Operation("already active".to_string()));
        }
        let locale = application
            .properties()
            .get("locale")
            .map(String::as_str)
            .unwrap_or("en");
        info!("Greeting active for {} (locale {})", application.name(), locale);
        Ok(())
    }
}

fn log_module_map() {
    let Ok(raw) = std::env::var(MODULE_MAP_ENV) else {
        warn!("{} not set; not started by a component host?", MODULE_MAP_ENV);
        return;
    };
    match serde_json::from_str::<BTreeMap<String, ModuleResolution>>(&raw) {
        Ok(map) => {
            for (module, resolution) in map {
                info!("Module {} -> {:?}", module, resolution);
            }
        }
        Err(e) => warn!("Unreadable module map: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_component_logging("simple-component", None);

    info!(
        "Simple component starting (context {})",
        std::env::var(CONTEXT_ID_ENV).unwrap_or_else(|_| "<none>".to_string())
    );
    log_module_map();

    ComponentServer::new()
        .with_component(ClockComponent)
        .with_component(GreetingComponent::default())
        .serve_from_args()
        .await?;

    info!("Host disconnected, exiting");
    Ok(())
}
