//! Storage error types for the resource store.
//!
//! Addressing an absent resource is *not* an error: `update_status` and
//! `delete` report it as `Ok(None)`.

use std::fmt;

use reconciler_core::{ResourceId, ResourceStatus};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Attempted to insert a resource whose id is already taken.
    #[error("Resource already exists: {id}")]
    AlreadyExists {
        /// The id that is already present.
        id: ResourceId,
    },

    /// The store enforces the lifecycle graph and the edge is not in it.
    #[error("Illegal transition for {id}: {from} -> {to}")]
    IllegalTransition {
        /// The resource the update addressed.
        id: ResourceId,
        /// Status currently stored.
        from: ResourceStatus,
        /// Status that was requested.
        to: ResourceStatus,
    },

    /// The backend failed to serve the request.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(id: impl Into<ResourceId>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Creates a new `IllegalTransition` error.
    #[must_use]
    pub fn illegal_transition(
        id: impl Into<ResourceId>,
        from: ResourceStatus,
        to: ResourceStatus,
    ) -> Self {
        Self::IllegalTransition {
            id: id.into(),
            from,
            to,
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if this is an illegal transition error.
    #[must_use]
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, Self::IllegalTransition { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::IllegalTransition { .. } => ErrorCategory::Validation,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Id collision.
    Conflict,
    /// Rejected by the lifecycle graph.
    Validation,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
