//! Starting root binaries
//!
//! [`ComponentLauncher`] is the seam between the loader and the mechanism
//! that runs a root binary. [`ProcessLauncher`] runs it as a child process
//! restricted to its flat directory and talks to it over a Unix socket.

use async_trait::async_trait;
use std::sync::Arc;

use crate::component::Component;
use crate::error::LoaderError;
use crate::loader::context::IsolationContext;

/// A started root binary
pub struct LaunchedBinary {
    /// Contract id the binary reported
    pub contract: String,
    /// Components the binary exposes, in declaration order
    pub components: Vec<Arc<dyn Component>>,
    /// Whatever keeps the binary alive; retained for the process lifetime
    pub keepalive: Option<Box<dyn std::any::Any + Send + Sync>>,
}

/// Runs a root binary inside an isolation context
#[async_trait]
pub trait ComponentLauncher: Send + Sync {
    async fn launch(&self, context: &IsolationContext) -> Result<LaunchedBinary, LoaderError>;
}

/// Environment variable carrying the module resolution table (JSON)
pub const MODULE_MAP_ENV: &str = "COMPONENT_MODULE_MAP";

/// Environment variable carrying the isolation context id
pub const CONTEXT_ID_ENV: &str = "COMPONENT_CONTEXT_ID";

/// Dynamic library search path variable of this platform
pub const LIBRARY_PATH_ENV: &str = if cfg!(target_os = "macos") {
    "DYLD_LIBRARY_PATH"
} else if cfg!(windows) {
    "PATH"
} else {
    "LD_LIBRARY_PATH"
};

#[cfg(unix)]
pub use process::{ComponentProcess, ProcessLauncher};

#[cfg(unix)]
mod process {
    use std::path::{Path, PathBuf};
    use std::process::Stdio;
    use std::sync::Mutex;
    use tokio::process::{Child, Command};
    use tokio::time::Duration;
    use tracing::{debug, info, warn};

    use super::*;
    use crate::config::LauncherConfig;
    use crate::ipc::client::{remote_components, ComponentIpcClient};
    use crate::ipc::server::{INSTANCE_ID_ARG, SOCKET_PATH_ARG};
    use crate::utils::with_custom_timeout;

    /// Launches root binaries as child processes
    pub struct ProcessLauncher {
        socket_dir: PathBuf,
        config: LauncherConfig,
    }

    impl ProcessLauncher {
        pub fn new<P: AsRef<Path>>(socket_dir: P, config: LauncherConfig) -> Self {
            Self {
                socket_dir: socket_dir.as_ref().to_path_buf(),
                config,
            }
        }

        /// Wait for socket file to be created
        async fn wait_for_socket(&self, socket_path: &Path) -> Result<(), String> {
            let mut attempts = 0;
            while attempts < self.config.socket_max_attempts {
                if socket_path.exists() {
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_millis(self.config.socket_check_interval_millis)).await;
                attempts += 1;
            }
            Err("component socket did not appear within timeout".to_string())
        }

        fn command(&self, context: &IsolationContext, socket_path: &Path) -> Result<Command, LoaderError> {
            let binary = context.root_binary();
            let module_map = serde_json::to_string(&context.module_map())
                .map_err(|e| LoaderError::load(binary, format!("failed to encode module map: {}", e)))?;

            let mut command = Command::new(binary);
            command
                .arg(SOCKET_PATH_ARG)
                .arg(socket_path)
                .arg(INSTANCE_ID_ARG)
                .arg(context.id().to_string())
                .current_dir(context.flat_dir())
                .env(LIBRARY_PATH_ENV, context.flat_dir())
                .env(MODULE_MAP_ENV, module_map)
                .env(CONTEXT_ID_ENV, context.id().to_string())
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .kill_on_drop(true);
            Ok(command)
        }
    }

    #[async_trait]
    impl ComponentLauncher for ProcessLauncher {
        async fn launch(&self, context: &IsolationContext) -> Result<LaunchedBinary, LoaderError> {
            let binary = context.root_binary();
            info!("Launching component binary {:?}", binary);

            std::fs::create_dir_all(&self.socket_dir)?;
            let socket_path = self.socket_dir.join(format!("{}.sock", context.id()));

            let mut command = self.command(context, &socket_path)?;
            debug!("Spawning process: {:?}", command);
            let mut child = command
                .spawn()
                .map_err(|e| LoaderError::load(binary, format!("failed to spawn: {}", e)))?;

            tokio::time::sleep(Duration::from_millis(self.config.startup_wait_millis)).await;

            let socket_timeout = Duration::from_secs(self.config.socket_timeout_seconds);
            match with_custom_timeout(self.wait_for_socket(&socket_path), socket_timeout).await {
                Ok(Ok(())) => debug!("Component socket ready at {:?}", socket_path),
                Ok(Err(e)) => {
                    let _ = child.kill().await;
                    return Err(LoaderError::load(binary, e));
                }
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(LoaderError::load(binary, "timed out waiting for component socket"));
                }
            }

            let mut client = ComponentIpcClient::connect(&socket_path)
                .await
                .map_err(|e| LoaderError::load(binary, e.to_string()))?;

            let handshake_timeout = Duration::from_secs(self.config.handshake_timeout_seconds);
            let ack = match with_custom_timeout(client.handshake(&context.id().to_string()), handshake_timeout).await {
                Ok(Ok(ack)) => ack,
                Ok(Err(e)) => {
                    let _ = child.kill().await;
                    return Err(LoaderError::load(binary, format!("handshake failed: {}", e)));
                }
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(LoaderError::load(binary, "handshake timed out"));
                }
            };

            info!(
                "Component binary {:?} exposes {} component(s)",
                binary,
                ack.components.len()
            );
            Ok(LaunchedBinary {
                contract: ack.contract,
                components: remote_components(
                    client.with_lifecycle_timeout(Duration::from_secs(
                        self.config.lifecycle_timeout_seconds,
                    )),
                    &ack.components,
                ),
                keepalive: Some(Box::new(ComponentProcess {
                    socket_path,
                    child: Mutex::new(child),
                })),
            })
        }
    }

    /// Running component process
    pub struct ComponentProcess {
        socket_path: PathBuf,
        child: Mutex<Child>,
    }

    impl ComponentProcess {
        pub fn socket_path(&self) -> &Path {
            &self.socket_path
        }

        /// Check if process is still running
        pub fn is_running(&self) -> bool {
            let mut child = self.child.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            !matches!(child.try_wait(), Ok(Some(_)))
        }
    }

    impl Drop for ComponentProcess {
        fn drop(&mut self) {
            if self.socket_path.exists() {
                if let Err(e) = std::fs::remove_file(&self.socket_path) {
                    warn!("Failed to remove socket file {:?}: {}", self.socket_path, e);
                }
            }
        }
    }
}
