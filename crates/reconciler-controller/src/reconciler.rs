//! Per-resource decision logic shared by the sweep and the notification path.
//!
//! | status     | action                                                   |
//! |------------|----------------------------------------------------------|
//! | `Creating` | ensure a worker that provisions, then sets `Running`     |
//! | `Deleting` | ensure a worker that tears down, then deletes            |
//! | `Running`  | health check; unhealthy, error or timeout sets `Failed`  |
//! | `Failed`   | failure hook; `Retry` sets `Creating` and re-notifies    |
//! | `Unknown`  | nothing                                                  |
//!
//! Each resource is reconciled behind its own panic boundary, so one
//! misbehaving resource never stops the others from being processed.
//!
//! Hook outcomes are written back with a conditional update: if the status
//! changed while the hook ran, the stale result is dropped. At most one hook
//! call is in flight per resource.

use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::join_all;
use reconciler_core::events::{ControllerEventKind, EventBroadcaster};
use reconciler_core::{Resource, ResourceId, ResourceStatus};
use reconciler_storage::{DynStore, StorageError};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{ControllerConfig, ShutdownPolicy};
use crate::hooks::{FailureAction, HealthStatus, LifecycleHooks};
use crate::notify::Notifier;
use crate::provisioner::Provisioner;
use crate::registry::{StartOutcome, WorkerRegistry};
use crate::stats::{ControllerStats, StatsCounters};
use crate::worker::{ResourceWorker, panic_message};

/// What one reconcile pass did for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// A worker was registered and spawned.
    WorkerStarted,
    /// A worker for the same target is already in flight.
    WorkerAlreadyRunning,
    /// A worker for another target was asked to stop; the new target waits
    /// for a later pass.
    WorkerCancelRequested { running: ResourceStatus },
    /// The health check passed.
    Healthy,
    /// The health check failed and the resource was moved to `Failed`.
    MarkedFailed { reason: String },
    /// The failure hook raised an alert; the resource stays `Failed`.
    Alerted,
    /// The failure hook asked for a retry; the resource is `Creating` again.
    Retried,
    /// The status changed while the hook ran; its result was not written.
    StatusChanged { current: Option<ResourceStatus> },
    /// A hook call for this resource is already in progress.
    HookInFlight,
    /// `Unknown` status; nothing to do.
    Ignored,
    /// The id is not in the store.
    NotFound,
    /// Reconciling this resource panicked.
    Panicked { message: String },
}

/// Outcome of a full sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub outcomes: Vec<(ResourceId, Reconciliation)>,
}

impl SweepReport {
    /// Number of resources in the snapshot.
    pub fn resources(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcome(&self, id: &str) -> Option<&Reconciliation> {
        self.outcomes
            .iter()
            .find(|(resource_id, _)| resource_id.as_str() == id)
            .map(|(_, outcome)| outcome)
    }

    /// Number of resources whose reconcile pass panicked.
    pub fn panicked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Reconciliation::Panicked { .. }))
            .count()
    }
}

pub(crate) struct ReconcilerParts {
    pub store: DynStore,
    pub provisioner: Arc<dyn Provisioner>,
    pub hooks: Arc<dyn LifecycleHooks>,
    pub events: Arc<EventBroadcaster>,
    pub notifier: Notifier,
    pub config: ControllerConfig,
}

/// Shared state behind the controller loop and every worker it spawns.
pub struct Reconciler {
    store: DynStore,
    registry: Arc<WorkerRegistry>,
    provisioner: Arc<dyn Provisioner>,
    hooks: Arc<dyn LifecycleHooks>,
    events: Arc<EventBroadcaster>,
    notifier: Notifier,
    tracker: TaskTracker,
    /// Reconcile passes the loop has handed off.
    passes: TaskTracker,
    hooks_in_flight: HookSlots,
    stats: StatsCounters,
    config: ControllerConfig,
}

impl Reconciler {
    pub(crate) fn new(parts: ReconcilerParts) -> Self {
        Self {
            store: parts.store,
            registry: Arc::new(WorkerRegistry::default()),
            provisioner: parts.provisioner,
            hooks: parts.hooks,
            events: parts.events,
            notifier: parts.notifier,
            tracker: TaskTracker::new(),
            passes: TaskTracker::new(),
            hooks_in_flight: HookSlots::default(),
            stats: StatsCounters::default(),
            config: parts.config,
        }
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats.snapshot()
    }

    /// Number of spawned worker tasks that have not finished yet.
    pub fn active_workers(&self) -> usize {
        self.tracker.len()
    }

    /// Number of reconcile passes still running off the loop task.
    pub fn active_passes(&self) -> usize {
        self.passes.len()
    }

    /// Run a reconcile pass off the loop task.
    pub(crate) fn spawn_pass<F>(&self, pass: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.passes.spawn(pass)
    }

    pub(crate) fn provisioner(&self) -> &Arc<dyn Provisioner> {
        &self.provisioner
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.stats
    }

    /// Reconcile every resource in one snapshot of the store.
    ///
    /// Resources are processed concurrently; the report keeps snapshot order.
    pub async fn reconcile_all(self: &Arc<Self>) -> Result<SweepReport, StorageError> {
        let resources = self.store.get_all().await?;
        StatsCounters::incr(&self.stats.sweeps);
        debug!(resources = resources.len(), "Sweeping resources");
        self.events.emit(ControllerEventKind::SweepStarted {
            resources: resources.len(),
        });

        let ids: Vec<ResourceId> = resources.iter().map(|r| r.id.clone()).collect();
        let outcomes = join_all(
            resources
                .into_iter()
                .map(|resource| self.reconcile_isolated(resource)),
        )
        .await;
        Ok(SweepReport {
            outcomes: ids.into_iter().zip(outcomes).collect(),
        })
    }

    /// Reconcile the current snapshot of a single resource.
    pub async fn reconcile_one(self: &Arc<Self>, id: &str) -> Result<Reconciliation, StorageError> {
        match self.store.get(id).await? {
            Some(resource) => Ok(self.reconcile_isolated(resource).await),
            None => {
                debug!(resource_id = %id, "Notified resource no longer exists");
                Ok(Reconciliation::NotFound)
            }
        }
    }

    async fn reconcile_isolated(self: &Arc<Self>, resource: Resource) -> Reconciliation {
        match AssertUnwindSafe(self.process_state(&resource))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic);
                StatsCounters::incr(&self.stats.reconcile_panics);
                error!(resource_id = %resource.id, panic = %message, "Reconcile panicked");
                self.events.emit(ControllerEventKind::ReconcilePanicked {
                    id: resource.id.clone(),
                    message: message.clone(),
                });
                Reconciliation::Panicked { message }
            }
        }
    }

    /// Decide and perform the action for one resource snapshot.
    pub async fn process_state(self: &Arc<Self>, resource: &Resource) -> Reconciliation {
        match resource.status {
            ResourceStatus::Creating | ResourceStatus::Deleting => self.ensure_worker(resource),
            ResourceStatus::Running | ResourceStatus::Failed => {
                let Some(_slot) = self.hooks_in_flight.acquire(&resource.id) else {
                    debug!(resource_id = %resource.id, "Hook already in flight");
                    return Reconciliation::HookInFlight;
                };
                if resource.status == ResourceStatus::Running {
                    self.check_health(resource).await
                } else {
                    self.handle_failed(resource).await
                }
            }
            ResourceStatus::Unknown => {
                debug!(resource_id = %resource.id, "Ignoring resource in unknown status");
                Reconciliation::Ignored
            }
        }
    }

    fn ensure_worker(self: &Arc<Self>, resource: &Resource) -> Reconciliation {
        let id = &resource.id;
        let target = resource.status;

        let outcome = self.registry.try_start(id, target, |token| {
            StatsCounters::incr(&self.stats.workers_started);
            info!(resource_id = %id, target = %target, "Starting worker");
            self.events.emit(ControllerEventKind::WorkerStarted {
                id: id.clone(),
                target,
            });

            let worker = ResourceWorker::new(
                Arc::clone(self),
                resource.clone(),
                token,
                self.registry.guard(id.clone()),
            );
            let span = info_span!("worker", resource_id = %id, target = %target);
            self.tracker.spawn(worker.run().instrument(span));
        });

        match outcome {
            StartOutcome::Started => Reconciliation::WorkerStarted,
            StartOutcome::AlreadyRunning => {
                self.events.emit(ControllerEventKind::WorkerAlreadyRunning {
                    id: id.clone(),
                    target,
                });
                Reconciliation::WorkerAlreadyRunning
            }
            StartOutcome::CancelRequested { running } => {
                StatsCounters::incr(&self.stats.cancel_requests);
                self.events.emit(ControllerEventKind::WorkerCancelRequested {
                    id: id.clone(),
                    running,
                    requested: target,
                });
                Reconciliation::WorkerCancelRequested { running }
            }
        }
    }

    async fn check_health(&self, resource: &Resource) -> Reconciliation {
        let check = tokio::time::timeout(
            self.config.hook_timeout(),
            self.hooks.health_check(resource),
        )
        .await;

        let reason = match check {
            Ok(Ok(HealthStatus::Healthy)) => return Reconciliation::Healthy,
            Ok(Ok(HealthStatus::Unhealthy(reason))) => reason,
            Ok(Err(e)) => format!("health check error: {e}"),
            Err(_) => format!(
                "health check timed out after {}ms",
                self.config.hook_timeout_ms
            ),
        };

        match self
            .store
            .update_status_if(
                resource.id.as_str(),
                ResourceStatus::Running,
                ResourceStatus::Failed,
            )
            .await
        {
            Ok(Some(_)) => {
                warn!(
                    resource_id = %resource.id,
                    hooks = self.hooks.name(),
                    reason = %reason,
                    "Health check failed, resource marked failed"
                );
                StatsCounters::incr(&self.stats.health_check_failures);
                self.events.emit(ControllerEventKind::HealthCheckFailed {
                    id: resource.id.clone(),
                    reason: reason.clone(),
                });
                Reconciliation::MarkedFailed { reason }
            }
            Ok(None) => self.status_changed(resource).await,
            Err(e) => {
                warn!(resource_id = %resource.id, error = %e, "Failed to mark resource failed");
                Reconciliation::MarkedFailed { reason }
            }
        }
    }

    async fn handle_failed(&self, resource: &Resource) -> Reconciliation {
        let action =
            tokio::time::timeout(self.config.hook_timeout(), self.hooks.on_failed(resource)).await;

        let action = match action {
            Ok(Ok(action)) => action,
            Ok(Err(e)) => {
                warn!(resource_id = %resource.id, error = %e, "Failure hook returned an error");
                FailureAction::Alert
            }
            Err(_) => {
                warn!(
                    resource_id = %resource.id,
                    timeout_ms = self.config.hook_timeout_ms,
                    "Failure hook timed out"
                );
                FailureAction::Alert
            }
        };

        let retried = action == FailureAction::Retry;
        self.events.emit(ControllerEventKind::FailureHandled {
            id: resource.id.clone(),
            retried,
        });

        if !retried {
            return Reconciliation::Alerted;
        }

        info!(resource_id = %resource.id, "Retrying failed resource");
        match self
            .store
            .update_status_if(
                resource.id.as_str(),
                ResourceStatus::Failed,
                ResourceStatus::Creating,
            )
            .await
        {
            Ok(Some(_)) => {
                if let Err(e) = self.notifier.try_notify(resource.id.clone()) {
                    debug!(resource_id = %resource.id, error = %e, "Retry left to the next sweep");
                }
                Reconciliation::Retried
            }
            Ok(None) => self.status_changed(resource).await,
            Err(e) => {
                warn!(resource_id = %resource.id, error = %e, "Failed to retry resource");
                Reconciliation::Alerted
            }
        }
    }

    /// A hook result was dropped because the stored status moved on.
    async fn status_changed(&self, resource: &Resource) -> Reconciliation {
        let current = match self.store.get(resource.id.as_str()).await {
            Ok(current) => current.map(|r| r.status),
            Err(e) => {
                debug!(resource_id = %resource.id, error = %e, "Could not read current status");
                None
            }
        };
        info!(
            resource_id = %resource.id,
            seen = %resource.status,
            current = ?current,
            "Status changed while the hook ran, result dropped"
        );
        Reconciliation::StatusChanged { current }
    }

    /// Re-queue a resource whose worker exited cancelled, so the status that
    /// caused the cancellation is picked up without waiting for a sweep.
    pub(crate) fn requeue_after_cancel(&self, resource: &Resource) {
        if !self.config.requeue_on_cancel || self.registry.root_token().is_cancelled() {
            return;
        }
        match self.notifier.try_notify(resource.id.clone()) {
            Ok(()) => debug!(resource_id = %resource.id, "Requeued after cancellation"),
            Err(e) => debug!(resource_id = %resource.id, error = %e, "Requeue skipped"),
        }
    }

    /// Stop accepting work and apply the shutdown policy to what is in flight.
    ///
    /// `Drain` cancels every registered worker, cancels the root token so a
    /// pass still running cannot start a live worker, then waits for workers
    /// and passes within one grace period. Returns how many registered
    /// workers were asked to stop.
    pub(crate) async fn shutdown(&self) -> usize {
        self.passes.close();
        self.tracker.close();

        match self.config.shutdown_policy {
            ShutdownPolicy::Drain => {
                let in_flight = self.registry.cancel_all();
                self.registry.root_token().cancel();
                info!(
                    workers = in_flight,
                    passes = self.passes.len(),
                    "Draining workers"
                );

                let grace = self.config.shutdown_grace();
                let drained = async {
                    self.passes.wait().await;
                    self.tracker.wait().await;
                };
                if tokio::time::timeout(grace, drained).await.is_err() {
                    warn!(
                        remaining = self.tracker.len(),
                        passes = self.passes.len(),
                        grace_ms = self.config.shutdown_grace_ms,
                        "Work still running after shutdown grace period"
                    );
                }
                in_flight
            }
            ShutdownPolicy::Detach => {
                info!(
                    workers = self.tracker.len(),
                    passes = self.passes.len(),
                    "Detaching in-flight work"
                );
                0
            }
        }
    }
}

/// Ids with a lifecycle hook call in progress.
#[derive(Debug, Default)]
struct HookSlots {
    ids: Mutex<HashSet<ResourceId>>,
}

impl HookSlots {
    /// Claim the slot for `id`, or `None` if a hook for it is already running.
    fn acquire(&self, id: &ResourceId) -> Option<HookSlot<'_>> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.insert(id.clone()).then(|| HookSlot {
            slots: self,
            id: id.clone(),
        })
    }
}

/// Releases a hook slot when dropped, including on panic.
struct HookSlot<'a> {
    slots: &'a HookSlots,
    id: ResourceId,
}

impl Drop for HookSlot<'_> {
    fn drop(&mut self) {
        self.slots
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("hooks", &self.hooks.name())
            .field("workers", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
