use reconciler_core::ResourceId;
use thiserror::Error;

/// Error returned when a resource id cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The queue is at capacity; only returned by `try_notify`.
    #[error("Notification queue full, dropped {0}")]
    Full(ResourceId),

    /// The controller has stopped and nothing consumes the queue.
    #[error("Notification queue closed, dropped {0}")]
    Closed(ResourceId),

    /// The id is empty or whitespace-only and was never queued.
    #[error("Invalid resource id '{0}'")]
    InvalidId(ResourceId),
}

impl NotifyError {
    /// The id that was not queued.
    pub fn id(&self) -> &ResourceId {
        match self {
            NotifyError::Full(id) | NotifyError::Closed(id) | NotifyError::InvalidId(id) => id,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, NotifyError::Full(_))
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Controller task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ControllerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
