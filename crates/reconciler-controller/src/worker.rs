//! Resource workers: one long-running convergence action for one resource.
//!
//! A worker races its action against its cancellation token. Whichever
//! finishes first decides the outcome; there is no partial state:
//!
//! - `Creating`: provision, then set the status to `Running`.
//! - `Deleting`: tear down, then delete the resource.
//!
//! Every commit is conditional on the stored status still being the worker's
//! target; if it moved on, nothing is written and the outcome is `Superseded`.
//! Cancellation leaves the store untouched. An action error or panic moves the
//! resource to `Failed`. On every exit path the worker's registry entry is
//! removed before `WorkerExited` is emitted.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use reconciler_core::events::{ControllerEventKind, WorkerOutcome};
use reconciler_core::{Resource, ResourceStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::hooks::HookError;
use crate::reconciler::Reconciler;
use crate::registry::RegistrationGuard;
use crate::stats::StatsCounters;

pub(crate) struct ResourceWorker {
    reconciler: Arc<Reconciler>,
    resource: Resource,
    target: ResourceStatus,
    token: CancellationToken,
    guard: RegistrationGuard,
}

impl ResourceWorker {
    pub(crate) fn new(
        reconciler: Arc<Reconciler>,
        resource: Resource,
        token: CancellationToken,
        guard: RegistrationGuard,
    ) -> Self {
        let target = resource.status;
        Self {
            reconciler,
            resource,
            target,
            token,
            guard,
        }
    }

    pub(crate) async fn run(self) -> WorkerOutcome {
        let outcome = self.converge().await;

        let Self {
            reconciler,
            resource,
            target,
            guard,
            ..
        } = self;
        drop(guard);

        let stats = reconciler.counters();
        match &outcome {
            WorkerOutcome::Completed => StatsCounters::incr(&stats.workers_completed),
            WorkerOutcome::Cancelled => StatsCounters::incr(&stats.workers_cancelled),
            WorkerOutcome::Superseded => StatsCounters::incr(&stats.workers_superseded),
            WorkerOutcome::Failed(_) | WorkerOutcome::Panicked(_) => {
                StatsCounters::incr(&stats.workers_failed)
            }
        }
        info!(resource_id = %resource.id, target = %target, outcome = %outcome, "Worker exited");
        reconciler.events().emit(ControllerEventKind::WorkerExited {
            id: resource.id.clone(),
            target,
            outcome: outcome.clone(),
        });

        if matches!(outcome, WorkerOutcome::Cancelled | WorkerOutcome::Superseded) {
            reconciler.requeue_after_cancel(&resource);
        }
        outcome
    }

    async fn converge(&self) -> WorkerOutcome {
        let action = AssertUnwindSafe(self.action()).catch_unwind();

        tokio::select! {
            biased;

            _ = self.token.cancelled() => {
                warn!(resource_id = %self.resource.id, target = %self.target, "Worker cancelled");
                WorkerOutcome::Cancelled
            }
            result = action => match result {
                Ok(Ok(())) => self.commit().await,
                Ok(Err(e)) => {
                    warn!(resource_id = %self.resource.id, target = %self.target, error = %e, "Worker action failed");
                    if self.mark_failed().await {
                        WorkerOutcome::Failed(e.to_string())
                    } else {
                        WorkerOutcome::Superseded
                    }
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    error!(resource_id = %self.resource.id, target = %self.target, panic = %message, "Worker action panicked");
                    if self.mark_failed().await {
                        WorkerOutcome::Panicked(message)
                    } else {
                        WorkerOutcome::Superseded
                    }
                }
            }
        }
    }

    async fn action(&self) -> Result<(), HookError> {
        let provisioner = self.reconciler.provisioner();
        match self.target {
            ResourceStatus::Creating => provisioner.provision(&self.resource).await,
            ResourceStatus::Deleting => provisioner.teardown(&self.resource).await,
            other => Err(HookError::execution(format!(
                "no convergence action for status {other}"
            ))),
        }
    }

    async fn commit(&self) -> WorkerOutcome {
        let store = self.reconciler.store();
        let id = self.resource.id.as_str();

        let result = match self.target {
            ResourceStatus::Creating => store
                .update_status_if(id, ResourceStatus::Creating, ResourceStatus::Running)
                .await
                .map(|update| update.is_some()),
            _ => store
                .delete_if(id, self.target)
                .await
                .map(|removed| removed.is_some()),
        };

        match result {
            Ok(true) => {
                info!(resource_id = %id, target = %self.target, "Resource converged");
                WorkerOutcome::Completed
            }
            Ok(false) => {
                debug!(resource_id = %id, target = %self.target, "Status moved on before commit");
                WorkerOutcome::Superseded
            }
            Err(e) => {
                warn!(resource_id = %id, error = %e, "Failed to commit convergence");
                WorkerOutcome::Failed(e.to_string())
            }
        }
    }

    /// Move the resource to `Failed` if it still carries the worker's target.
    /// Returns `false` only if the status had moved on.
    async fn mark_failed(&self) -> bool {
        let id = self.resource.id.as_str();
        match self
            .reconciler
            .store()
            .update_status_if(id, self.target, ResourceStatus::Failed)
            .await
        {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(resource_id = %id, target = %self.target, "Status moved on, not marking failed");
                false
            }
            Err(e) => {
                warn!(resource_id = %id, error = %e, "Failed to mark resource as failed");
                true
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
