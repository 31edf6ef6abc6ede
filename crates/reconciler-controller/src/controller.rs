//! The controller loop.
//!
//! One task waits on three sources with a fixed priority:
//!
//! 1. shutdown signal
//! 2. notification queue (reconcile one resource)
//! 3. sweep timer (reconcile every resource)
//!
//! The loop only dispatches. Each notification and each sweep runs as its own
//! pass off the loop task, so a slow lifecycle hook never delays the next
//! notification. A tick that arrives while the previous sweep is still
//! running is skipped. Workers run on their own tasks as well.

use std::sync::Arc;

use reconciler_core::ResourceId;
use reconciler_core::events::{ControllerEventKind, EventBroadcaster};
use reconciler_storage::DynStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, debug_span, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::hooks::{LifecycleHooks, LoggingHooks};
use crate::notify::{NotificationQueue, Notifier, notification_channel};
use crate::provisioner::{Provisioner, SimulatedProvisioner};
use crate::reconciler::{Reconciler, ReconcilerParts};
use crate::stats::{ControllerStats, StatsCounters};

/// Builder for [`Controller`].
pub struct ControllerBuilder {
    store: DynStore,
    config: ControllerConfig,
    provisioner: Option<Arc<dyn Provisioner>>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    events: Option<Arc<EventBroadcaster>>,
}

impl ControllerBuilder {
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Publish controller events on `events`.
    ///
    /// Pass the same broadcaster to an `EventedStore` wrapping the store to
    /// get store mutations on the same stream.
    pub fn events(mut self, events: Arc<EventBroadcaster>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<Controller, ControllerError> {
        self.config.validate()?;

        let (notifier, queue) = notification_channel(self.config.notify_capacity);
        let reconciler = Reconciler::new(ReconcilerParts {
            store: self.store,
            provisioner: self
                .provisioner
                .unwrap_or_else(|| Arc::new(SimulatedProvisioner::default())),
            hooks: self.hooks.unwrap_or_else(|| Arc::new(LoggingHooks)),
            events: self.events.unwrap_or_else(EventBroadcaster::new_shared),
            notifier,
            config: self.config,
        });

        Ok(Controller {
            reconciler: Arc::new(reconciler),
            queue,
        })
    }
}

/// Reconciliation controller: owns the notification queue and drives the loop.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: NotificationQueue,
}

impl Controller {
    pub fn builder(store: DynStore) -> ControllerBuilder {
        ControllerBuilder {
            store,
            config: ControllerConfig::default(),
            provisioner: None,
            hooks: None,
            events: None,
        }
    }

    /// Handle for queueing resource ids.
    pub fn notifier(&self) -> Notifier {
        self.reconciler.notifier().clone()
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        self.reconciler.events()
    }

    /// Run the loop until `shutdown` turns `true` or its sender is dropped.
    ///
    /// On exit the shutdown policy is applied to in-flight workers and the
    /// queue is closed; later notifications fail with `NotifyError::Closed`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            reconciler,
            mut queue,
        } = self;
        let config = reconciler.config().clone();
        info!(
            sweep_interval_ms = config.sweep_interval_ms,
            notify_capacity = config.notify_capacity,
            shutdown_policy = ?config.shutdown_policy,
            "Controller started"
        );
        reconciler.events().emit(ControllerEventKind::ControllerStarted);

        let mut ticker = interval(config.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep_task: Option<JoinHandle<()>> = None;

        if !*shutdown.borrow_and_update() {
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        match changed {
                            Ok(()) if *shutdown.borrow_and_update() => break,
                            Ok(()) => continue,
                            Err(_) => {
                                debug!("Shutdown sender dropped");
                                break;
                            }
                        }
                    }

                    Some(id) = queue.recv() => {
                        notification_received(&reconciler, &id);
                        let pass = Arc::clone(&reconciler);
                        let span = debug_span!("notification", resource_id = %id);
                        reconciler.spawn_pass(
                            async move { reconcile_notified(&pass, id.as_str()).await }.instrument(span),
                        );
                    }

                    _ = ticker.tick() => {
                        if sweep_task.as_ref().is_some_and(|task| !task.is_finished()) {
                            debug!("Previous sweep still running, skipping tick");
                        } else {
                            let pass = Arc::clone(&reconciler);
                            sweep_task = Some(reconciler.spawn_pass(
                                async move { sweep(&pass).await }.instrument(debug_span!("sweep")),
                            ));
                        }
                    }
                }
            }
        }

        info!("Controller shutting down");
        let cancelled = reconciler.shutdown().await;
        debug!(cancelled, "Shutdown policy applied");
        // Close the queue before announcing the stop.
        drop(queue);
        reconciler.events().emit(ControllerEventKind::ControllerStopped);
        info!("Controller stopped");
    }

    /// Spawn the loop on the current runtime.
    pub fn start(self) -> ControllerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = self.notifier();
        let reconciler = Arc::clone(&self.reconciler);
        let task = tokio::spawn(self.run(shutdown_rx));

        ControllerHandle {
            shutdown_tx,
            task,
            notifier,
            reconciler,
        }
    }
}

fn notification_received(reconciler: &Reconciler, id: &ResourceId) {
    StatsCounters::incr(&reconciler.counters().notifications_received);
    debug!(resource_id = %id, "Notification received");
    reconciler
        .events()
        .emit(ControllerEventKind::NotificationReceived { id: id.clone() });
}

async fn reconcile_notified(reconciler: &Arc<Reconciler>, id: &str) {
    if let Err(e) = reconciler.reconcile_one(id).await {
        warn!(
            resource_id = %id,
            error = %e,
            category = %e.category(),
            "Failed to reconcile notified resource"
        );
    }
}

async fn sweep(reconciler: &Arc<Reconciler>) {
    match reconciler.reconcile_all().await {
        Ok(report) if report.panicked() > 0 => {
            warn!(
                resources = report.resources(),
                panicked = report.panicked(),
                "Sweep finished with panics"
            );
        }
        Ok(report) => debug!(resources = report.resources(), "Sweep finished"),
        Err(e) => error!(
            error = %e,
            category = %e.category(),
            "Sweep failed to read the store"
        ),
    }
}

/// Handle to a controller loop started with [`Controller::start`].
pub struct ControllerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    notifier: Notifier,
    reconciler: Arc<Reconciler>,
}

impl ControllerHandle {
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn stats(&self) -> ControllerStats {
        self.reconciler.stats()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop to stop and wait for it to apply the shutdown policy.
    pub async fn shutdown(self) -> Result<(), ControllerError> {
        let _ = self.shutdown_tx.send(true);
        self.task.await?;
        Ok(())
    }
}
