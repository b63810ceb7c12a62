//! Loader error taxonomy
//!
//! Every failure is scoped to the root package being processed. The manager
//! decides whether an error is fatal for a root or only skips a dependency.

use std::path::PathBuf;
use thiserror::Error;

use crate::package::{PackageId, PackageIdentity};

/// Errors produced by the resolve → fetch → extract → load pipeline
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Package is absent from every configured registry
    #[error("Package not found in any registry: {0}")]
    NotFound(PackageId),

    /// A version constraint matched none of the available versions
    #[error("No version of {id} satisfies {constraint}")]
    NoCompatibleVersion { id: PackageId, constraint: String },

    /// Network or storage failure while fetching an artifact
    #[error("Failed to download {identity}: {message}")]
    Download {
        identity: PackageIdentity,
        message: String,
    },

    /// Corrupt or unreadable artifact, or a missing expected binary
    #[error("Extraction failed for {package}: {message}")]
    Extraction { package: String, message: String },

    /// Root binary failed to load or exposed no components
    #[error("Failed to load {binary:?}: {message}")]
    Load { binary: PathBuf, message: String },

    /// Registry metadata query failed
    #[error("Registry {registry} error: {message}")]
    Registry { registry: String, message: String },

    /// Lifecycle hooks invoked out of order
    #[error("Lifecycle violation: {0}")]
    Lifecycle(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Caller cancelled the pipeline
    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    /// Build a load error for a binary
    pub fn load(binary: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LoaderError::Load {
            binary: binary.into(),
            message: message.into(),
        }
    }

    /// Build an extraction error for a package
    pub fn extraction(package: impl ToString, message: impl Into<String>) -> Self {
        LoaderError::Extraction {
            package: package.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error came from cancellation rather than a real failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoaderError::Cancelled)
    }
}

/// Result alias for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;
