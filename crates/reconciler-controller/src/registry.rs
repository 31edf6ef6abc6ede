//! Worker registry: which resources have a convergence worker in flight.
//!
//! At most one entry exists per resource id at any instant. That is the
//! mutual-exclusion guarantee the whole controller rests on.
//!
//! # Locking
//!
//! One `std::sync::Mutex` guards the map. It is never held across an await
//! point, which lets a worker's [`RegistrationGuard`] remove its entry from
//! `Drop` on every exit path, including panics and task aborts. The registry
//! lock is independent of the store's lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reconciler_core::{ResourceId, ResourceStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of [`WorkerRegistry::try_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// No worker was in flight; one was registered and launched.
    Started,
    /// A worker for the same target is already in flight.
    AlreadyRunning,
    /// A worker for a different target was in flight and has been asked to
    /// stop. Nothing new was started; a later pass retries once it has exited.
    CancelRequested { running: ResourceStatus },
}

#[derive(Debug)]
struct WorkerEntry {
    target: ResourceStatus,
    token: CancellationToken,
    started_at: Instant,
}

/// Read-only view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub id: ResourceId,
    pub target: ResourceStatus,
    pub started_at: Instant,
    pub cancel_requested: bool,
}

/// Tracks in-flight workers per resource id.
#[derive(Debug)]
pub struct WorkerRegistry {
    workers: Mutex<HashMap<ResourceId, WorkerEntry>>,
    /// Parent of every worker token; cancelling it cancels every worker.
    root: CancellationToken,
}

impl WorkerRegistry {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            root,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceId, WorkerEntry>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a worker for `id` unless one is already in flight.
    ///
    /// Under a single critical section:
    /// - no entry: register `target` with a fresh child token, then call
    ///   `start` with that token to launch the worker;
    /// - entry with the same target: do nothing;
    /// - entry with another target: cancel it and return without starting.
    ///
    /// `start` must not block; it should only spawn.
    pub fn try_start<F>(&self, id: &ResourceId, target: ResourceStatus, start: F) -> StartOutcome
    where
        F: FnOnce(CancellationToken),
    {
        let mut workers = self.lock();

        if let Some(entry) = workers.get(id) {
            if entry.target == target {
                debug!(resource_id = %id, target = %target, "Worker already running");
                return StartOutcome::AlreadyRunning;
            }

            info!(
                resource_id = %id,
                running = %entry.target,
                requested = %target,
                "Status changed, cancelling worker and waiting for it to exit"
            );
            entry.token.cancel();
            return StartOutcome::CancelRequested {
                running: entry.target,
            };
        }

        let token = self.root.child_token();
        workers.insert(
            id.clone(),
            WorkerEntry {
                target,
                token: token.clone(),
                started_at: Instant::now(),
            },
        );
        start(token);
        StartOutcome::Started
    }

    /// Delete the entry for `id`. Only a worker's own exit path calls this.
    pub fn remove(&self, id: &str) -> Option<ResourceStatus> {
        self.lock().remove(id).map(|entry| entry.target)
    }

    /// Target of the in-flight worker for `id`.
    pub fn target_of(&self, id: &str) -> Option<ResourceStatus> {
        self.lock().get(id).map(|entry| entry.target)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every entry.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.lock()
            .iter()
            .map(|(id, entry)| WorkerInfo {
                id: id.clone(),
                target: entry.target,
                started_at: entry.started_at,
                cancel_requested: entry.token.is_cancelled(),
            })
            .collect()
    }

    /// Request cancellation of every in-flight worker. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let workers = self.lock();
        for entry in workers.values() {
            entry.token.cancel();
        }
        workers.len()
    }

    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Guard that removes the entry for `id` when dropped.
    pub fn guard(self: &Arc<Self>, id: ResourceId) -> RegistrationGuard {
        RegistrationGuard {
            registry: Arc::clone(self),
            id,
        }
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

/// Removes a worker's registry entry when dropped.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<WorkerRegistry>,
    id: ResourceId,
}

impl RegistrationGuard {
    pub fn id(&self) -> &ResourceId {
        &self.id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id.as_str());
    }
}
