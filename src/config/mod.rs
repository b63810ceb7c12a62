//! Host configuration
//!
//! Loaded from TOML or JSON. Every field has a default, so an empty file
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::package::{PackageId, PackageVersion, Platform};
use crate::source::{RegistryOptions, DEFAULT_REGISTRY};

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Registry endpoints in priority order (empty = public default)
    #[serde(default)]
    pub registries: Vec<String>,

    /// Root packages to load
    #[serde(default)]
    pub packages: Vec<PackageRequest>,

    /// Target platform descriptor (defaults to the running host)
    #[serde(default)]
    pub platform: Option<String>,

    /// Scratch directory for caches, layouts and sockets
    #[serde(default)]
    pub base_dir: Option<String>,

    /// Timeout for each registry request
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Largest artifact accepted
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,

    /// Component process startup limits
    #[serde(default)]
    pub launcher: LauncherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_max_download_bytes() -> u64 {
    512 * 1024 * 1024
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            registries: Vec::new(),
            packages: Vec::new(),
            platform: None,
            base_dir: None,
            request_timeout_seconds: default_request_timeout_seconds(),
            max_download_bytes: default_max_download_bytes(),
            launcher: LauncherConfig::default(),
            logging: None,
        }
    }
}

/// A root package to load, optionally pinned to one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequest {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl PackageRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
        }
    }

    pub fn pinned(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: Some(version.into()),
        }
    }

    pub fn package_id(&self) -> PackageId {
        PackageId::new(self.id.as_str())
    }

    /// Parsed version pin, if any
    pub fn pinned_version(&self) -> anyhow::Result<Option<PackageVersion>> {
        self.version
            .as_deref()
            .map(PackageVersion::parse)
            .transpose()
            .map_err(|e| anyhow::anyhow!("package {}: {}", self.id, e))
    }
}

/// Limits for starting component processes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Pause after spawning before polling for the socket
    #[serde(default = "default_startup_wait_millis")]
    pub startup_wait_millis: u64,

    /// Overall time allowed for the socket to appear
    #[serde(default = "default_socket_timeout_seconds")]
    pub socket_timeout_seconds: u64,

    #[serde(default = "default_socket_check_interval_millis")]
    pub socket_check_interval_millis: u64,

    #[serde(default = "default_socket_max_attempts")]
    pub socket_max_attempts: u32,

    /// Time allowed for the contract handshake
    #[serde(default = "default_handshake_timeout_seconds")]
    pub handshake_timeout_seconds: u64,

    /// Time a component gets to register services or activate
    #[serde(default = "default_lifecycle_timeout_seconds")]
    pub lifecycle_timeout_seconds: u64,
}

fn default_startup_wait_millis() -> u64 {
    100
}

fn default_socket_timeout_seconds() -> u64 {
    5
}

fn default_socket_check_interval_millis() -> u64 {
    100
}

fn default_socket_max_attempts() -> u32 {
    50
}

fn default_handshake_timeout_seconds() -> u64 {
    10
}

fn default_lifecycle_timeout_seconds() -> u64 {
    30
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            startup_wait_millis: default_startup_wait_millis(),
            socket_timeout_seconds: default_socket_timeout_seconds(),
            socket_check_interval_millis: default_socket_check_interval_millis(),
            socket_max_attempts: default_socket_max_attempts(),
            handshake_timeout_seconds: default_handshake_timeout_seconds(),
            lifecycle_timeout_seconds: default_lifecycle_timeout_seconds(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter such as "info" or "component_loader::resolver=debug"
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

impl HostConfig {
    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HostConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HostConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load by extension: `.json` is JSON, anything else TOML
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path)?,
            _ => Self::from_toml_file(path)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for endpoint in &self.registries {
            if endpoint.trim().is_empty() {
                return Err(anyhow::anyhow!("registry endpoint cannot be empty"));
            }
        }
        for request in &self.packages {
            if request.id.trim().is_empty() {
                return Err(anyhow::anyhow!("package id cannot be empty"));
            }
            request.pinned_version()?;
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("request_timeout_seconds must be greater than 0"));
        }
        if self.max_download_bytes == 0 {
            return Err(anyhow::anyhow!("max_download_bytes must be greater than 0"));
        }
        if self.launcher.socket_max_attempts == 0 {
            return Err(anyhow::anyhow!("launcher.socket_max_attempts must be greater than 0"));
        }
        if self.launcher.lifecycle_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("launcher.lifecycle_timeout_seconds must be greater than 0"));
        }
        Ok(())
    }

    /// Configured registries, or the public default
    pub fn registry_endpoints(&self) -> Vec<String> {
        if self.registries.is_empty() {
            vec![DEFAULT_REGISTRY.to_string()]
        } else {
            self.registries.clone()
        }
    }

    pub fn target_platform(&self) -> Platform {
        self.platform
            .as_deref()
            .map(Platform::new)
            .unwrap_or_else(Platform::current)
    }

    pub fn base_path(&self) -> PathBuf {
        self.base_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("component-loader"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.base_path().join("cache")
    }

    pub fn layouts_dir(&self) -> PathBuf {
        self.base_path().join("layouts")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.base_path().join("content")
    }

    pub fn socket_dir(&self) -> PathBuf {
        self.base_path().join("sockets")
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            request_timeout: std::time::Duration::from_secs(self.request_timeout_seconds),
            max_download_bytes: self.max_download_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: HostConfig = toml::from_str("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry_endpoints(), vec![DEFAULT_REGISTRY.to_string()]);
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.launcher.socket_max_attempts, 50);
        assert!(config.base_path().ends_with("component-loader"));
    }

    #[test]
    fn test_parse_toml() {
        let config: HostConfig = toml::from_str(
            r#"
            registries = ["https://packages.example.test/v1", "file:///srv/feed"]
            platform = "linux-x86_64"
            base_dir = "/var/lib/host"

            [[packages]]
            id = "App"

            [[packages]]
            id = "Reports"
            version = "2.1"

            [launcher]
            handshake_timeout_seconds = 3

            [logging]
            filter = "debug"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.registries.len(), 2);
        assert_eq!(config.packages[1].pinned_version().unwrap(), Some(PackageVersion::new(2, 1, 0)));
        assert_eq!(config.target_platform(), Platform::new("linux-x86_64"));
        assert_eq!(config.layouts_dir(), PathBuf::from("/var/lib/host/layouts"));
        assert_eq!(config.launcher.handshake_timeout_seconds, 3);
        assert_eq!(config.launcher.startup_wait_millis, 100);
        assert_eq!(config.launcher.lifecycle_timeout_seconds, 30);
        assert_eq!(config.logging.unwrap().filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = HostConfig::default();
        config.packages.push(PackageRequest::pinned("App", "not-a-version"));
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.registries.push("  ".to_string());
        assert!(config.validate().is_err());

        let config = HostConfig {
            request_timeout_seconds: 0,
            ..HostConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("host.json");
        let mut config = HostConfig::default();
        config.packages.push(PackageRequest::new("App"));
        config.to_json_file(&path).unwrap();

        let loaded = HostConfig::from_file(&path).unwrap();
        assert_eq!(loaded.packages, config.packages);
    }
}
