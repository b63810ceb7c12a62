use thiserror::Error;

/// Errors crossing the component boundary
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("IPC communication error: {0}")]
    Ipc(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Contract mismatch: {0}")]
    Contract(String),

    #[error("Component operation failed: {0}")]
    Operation(String),

    #[error("Timeout waiting for component response")]
    Timeout,
}

impl From<bincode::Error> for ComponentError {
    fn from(e: bincode::Error) -> Self {
        ComponentError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for ComponentError {
    fn from(e: serde_json::Error) -> Self {
        ComponentError::Serialization(e.to_string())
    }
}

impl From<anyhow::Error> for ComponentError {
    fn from(e: anyhow::Error) -> Self {
        ComponentError::Operation(e.to_string())
    }
}
