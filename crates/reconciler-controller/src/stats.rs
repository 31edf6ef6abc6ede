use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the controller's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Periodic sweeps run.
    pub sweeps: u64,
    /// Notifications taken off the queue.
    pub notifications_received: u64,
    pub workers_started: u64,
    /// Conflicting workers asked to stop.
    pub cancel_requests: u64,
    pub workers_completed: u64,
    pub workers_cancelled: u64,
    /// Workers that finished after the stored status had moved on.
    pub workers_superseded: u64,
    /// Workers whose action errored or panicked.
    pub workers_failed: u64,
    /// Running resources moved to Failed.
    pub health_check_failures: u64,
    /// Reconcile passes for one resource that panicked.
    pub reconcile_panics: u64,
}

/// Live counters shared by the loop and its workers.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub sweeps: AtomicU64,
    pub notifications_received: AtomicU64,
    pub workers_started: AtomicU64,
    pub cancel_requests: AtomicU64,
    pub workers_completed: AtomicU64,
    pub workers_cancelled: AtomicU64,
    pub workers_superseded: AtomicU64,
    pub workers_failed: AtomicU64,
    pub health_check_failures: AtomicU64,
    pub reconcile_panics: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ControllerStats {
        ControllerStats {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            cancel_requests: self.cancel_requests.load(Ordering::Relaxed),
            workers_completed: self.workers_completed.load(Ordering::Relaxed),
            workers_cancelled: self.workers_cancelled.load(Ordering::Relaxed),
            workers_superseded: self.workers_superseded.load(Ordering::Relaxed),
            workers_failed: self.workers_failed.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
            reconcile_panics: self.reconcile_panics.load(Ordering::Relaxed),
        }
    }
}
