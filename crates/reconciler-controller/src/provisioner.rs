//! Long-running convergence actions performed by resource workers.

use std::time::Duration;

use async_trait::async_trait;
use reconciler_core::Resource;
use tracing::info;

use crate::hooks::HookError;

/// Performs the slow part of converging a resource.
///
/// Workers race these futures against their cancellation token; an
/// implementation does not need to observe cancellation itself, but must be
/// safe to drop at any await point.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Bring a `Creating` resource up. Success moves it to `Running`.
    async fn provision(&self, resource: &Resource) -> Result<(), HookError>;

    /// Tear a `Deleting` resource down. Success removes it from the store.
    async fn teardown(&self, resource: &Resource) -> Result<(), HookError>;
}

/// Provisioner that only waits, standing in for real infrastructure calls.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedProvisioner {
    create_delay: Duration,
    delete_delay: Duration,
}

impl SimulatedProvisioner {
    pub fn new(create_delay: Duration, delete_delay: Duration) -> Self {
        Self {
            create_delay,
            delete_delay,
        }
    }
}

impl Default for SimulatedProvisioner {
    fn default() -> Self {
        Self::new(Duration::from_secs(4), Duration::from_secs(5))
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    async fn provision(&self, resource: &Resource) -> Result<(), HookError> {
        info!(
            resource_id = %resource.id,
            delay_ms = self.create_delay.as_millis() as u64,
            "Creating resource"
        );
        tokio::time::sleep(self.create_delay).await;
        Ok(())
    }

    async fn teardown(&self, resource: &Resource) -> Result<(), HookError> {
        info!(
            resource_id = %resource.id,
            delay_ms = self.delete_delay.as_millis() as u64,
            "Deleting resource"
        );
        tokio::time::sleep(self.delete_delay).await;
        Ok(())
    }
}
