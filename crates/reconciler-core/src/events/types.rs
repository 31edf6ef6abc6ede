//! Event types describing what the controller does.
//!
//! The event stream is the observable surface of the controller: controller
//! start and stop, sweeps, notifications, worker start/cancel/exit and every
//! committed store mutation. Text is not stable; the order of events is.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::resource::{ResourceId, ResourceStatus};

// ============================================================================
// Store Mutations
// ============================================================================

/// A committed change to the resource store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreMutation {
    /// A resource was added to the store.
    Inserted { status: ResourceStatus },
    /// A resource's status was replaced.
    StatusUpdated {
        from: ResourceStatus,
        to: ResourceStatus,
    },
    /// A resource was removed from the store.
    Deleted { last_status: ResourceStatus },
}

// ============================================================================
// Worker Outcomes
// ============================================================================

/// How a resource worker ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// The action finished and its result was committed to the store.
    Completed,
    /// Cancellation was observed before the action finished. Nothing was committed.
    Cancelled,
    /// The action finished but the stored status had moved away from the
    /// worker's target. Nothing was committed.
    Superseded,
    /// The action returned an error.
    Failed(String),
    /// The action panicked.
    Panicked(String),
}

impl WorkerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerOutcome::Completed => "completed",
            WorkerOutcome::Cancelled => "cancelled",
            WorkerOutcome::Superseded => "superseded",
            WorkerOutcome::Failed(_) => "failed",
            WorkerOutcome::Panicked(_) => "panicked",
        }
    }
}

impl std::fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerOutcome::Completed | WorkerOutcome::Cancelled | WorkerOutcome::Superseded => {
                f.write_str(self.as_str())
            }
            WorkerOutcome::Failed(reason) | WorkerOutcome::Panicked(reason) => {
                write!(f, "{}: {reason}", self.as_str())
            }
        }
    }
}

// ============================================================================
// Controller Events
// ============================================================================

/// Kind of controller event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEventKind {
    ControllerStarted,
    ControllerStopped,
    /// A periodic sweep began over `resources` snapshots.
    SweepStarted { resources: usize },
    /// A resource id was taken off the notification queue.
    NotificationReceived { id: ResourceId },
    WorkerStarted {
        id: ResourceId,
        target: ResourceStatus,
    },
    /// A worker for the same target is already in flight; nothing was started.
    WorkerAlreadyRunning {
        id: ResourceId,
        target: ResourceStatus,
    },
    /// The in-flight worker targets a different status and was asked to stop.
    WorkerCancelRequested {
        id: ResourceId,
        running: ResourceStatus,
        requested: ResourceStatus,
    },
    /// Emitted after the worker's registry entry has been removed.
    WorkerExited {
        id: ResourceId,
        target: ResourceStatus,
        outcome: WorkerOutcome,
    },
    HealthCheckFailed { id: ResourceId, reason: String },
    FailureHandled { id: ResourceId, retried: bool },
    /// Reconciling one resource panicked; the sweep continued.
    ReconcilePanicked { id: ResourceId, message: String },
    StoreMutation {
        id: ResourceId,
        mutation: StoreMutation,
    },
}

/// A controller event with its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerEvent {
    #[serde(flatten)]
    pub kind: ControllerEventKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ControllerEvent {
    pub fn new(kind: ControllerEventKind) -> Self {
        Self {
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// The resource this event is about, if any.
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match &self.kind {
            ControllerEventKind::ControllerStarted
            | ControllerEventKind::ControllerStopped
            | ControllerEventKind::SweepStarted { .. } => None,
            ControllerEventKind::NotificationReceived { id }
            | ControllerEventKind::WorkerStarted { id, .. }
            | ControllerEventKind::WorkerAlreadyRunning { id, .. }
            | ControllerEventKind::WorkerCancelRequested { id, .. }
            | ControllerEventKind::WorkerExited { id, .. }
            | ControllerEventKind::HealthCheckFailed { id, .. }
            | ControllerEventKind::FailureHandled { id, .. }
            | ControllerEventKind::ReconcilePanicked { id, .. }
            | ControllerEventKind::StoreMutation { id, .. } => Some(id),
        }
    }

    /// Check if this event concerns the given resource.
    pub fn is_for(&self, id: &str) -> bool {
        self.resource_id().is_some_and(|rid| rid.as_str() == id)
    }
}

impl From<ControllerEventKind> for ControllerEvent {
    fn from(kind: ControllerEventKind) -> Self {
        Self::new(kind)
    }
}
