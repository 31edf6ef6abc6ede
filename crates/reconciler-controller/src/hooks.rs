//! Synchronous lifecycle hooks run inline by the reconciler.
//!
//! Hooks handle the statuses that need no worker:
//! - **Running**: a health check. A negative result moves the resource to `Failed`.
//! - **Failed**: alerting, optionally asking for a retry.
//!
//! Hooks are awaited inside the reconcile pass, so they should be quick. They
//! run under the configured hook timeout and panic isolation; a hook that
//! hangs or panics affects only its own resource.

use async_trait::async_trait;
use reconciler_core::Resource;
use tracing::{info, warn};

/// Error type for hook and provisioner operations.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Hook execution failed with a message.
    #[error("Hook execution failed: {0}")]
    Execution(String),

    /// The hook could not reach the resource.
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        HookError::Execution(msg.into())
    }

    /// Create a network error from a string.
    pub fn network(msg: impl Into<String>) -> Self {
        HookError::Network(msg.into())
    }
}

/// Result of a health check on a running resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// What to do with a resource sitting in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Raise the alert and leave the resource in `Failed`.
    Alert,
    /// Move the resource back to `Creating` so it is provisioned again.
    Retry,
}

/// Hooks for statuses that are handled without a worker.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Check a `Running` resource.
    async fn health_check(&self, resource: &Resource) -> Result<HealthStatus, HookError>;

    /// Handle a `Failed` resource.
    async fn on_failed(&self, resource: &Resource) -> Result<FailureAction, HookError>;
}

/// Default hooks: every running resource is healthy, failures are logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

#[async_trait]
impl LifecycleHooks for LoggingHooks {
    fn name(&self) -> &str {
        "logging"
    }

    async fn health_check(&self, resource: &Resource) -> Result<HealthStatus, HookError> {
        info!(resource_id = %resource.id, "Health checking running resource");
        Ok(HealthStatus::Healthy)
    }

    async fn on_failed(&self, resource: &Resource) -> Result<FailureAction, HookError> {
        warn!(
            resource_id = %resource.id,
            updated_at = %resource.updated_at,
            "Resource failed, raising alert"
        );
        Ok(FailureAction::Alert)
    }
}
