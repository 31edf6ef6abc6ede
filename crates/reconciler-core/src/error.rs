use thiserror::Error;

/// Core error types for reconciler operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource status: {0}")]
    InvalidStatus(String),

    #[error("Invalid resource ID: {0}")]
    InvalidId(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidStatus error
    pub fn invalid_status(status: impl Into<String>) -> Self {
        Self::InvalidStatus(status.into())
    }

    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
