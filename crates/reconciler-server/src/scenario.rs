//! The demonstration scenario.
//!
//! Seeds an in-memory store, starts the controller, replays scripted external
//! status changes (each followed by a notification) and shuts the controller
//! down after the configured run time or on interrupt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reconciler_controller::{Controller, ControllerStats, Notifier, SimulatedProvisioner};
use reconciler_core::events::EventBroadcaster;
use reconciler_core::Resource;
use reconciler_storage::{
    DynStore, EventedStore, InMemoryStore, ResourceStore, StorageError,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ScriptedAction, SeedResource};

/// Final state of a scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    /// Store contents after shutdown, sorted by id.
    pub resources: Vec<Resource>,
    pub stats: ControllerStats,
    /// Whether the run was cut short by the interrupt future.
    pub interrupted: bool,
}

/// Insert every seed resource. Returns how many were inserted.
pub async fn seed_store(
    store: &dyn ResourceStore,
    seed: &[SeedResource],
) -> Result<usize, StorageError> {
    for resource in seed {
        store
            .insert(Resource::new(resource.id.as_str(), resource.status))
            .await?;
    }
    Ok(seed.len())
}

/// Apply scripted actions at their offsets from now, notifying after each.
pub async fn play_actions(store: DynStore, notifier: Notifier, mut actions: Vec<ScriptedAction>) {
    let start = Instant::now();
    actions.sort_by_key(|action| action.after_ms);

    for action in actions {
        sleep_until(start + Duration::from_millis(action.after_ms)).await;

        match store.update_status(&action.id, action.status).await {
            Ok(Some(update)) => info!(
                resource_id = %action.id,
                from = %update.previous,
                to = %action.status,
                "External status change"
            ),
            Ok(None) => warn!(resource_id = %action.id, "Scripted action targets a missing resource"),
            Err(e) => {
                warn!(resource_id = %action.id, error = %e, "Scripted action rejected by store");
                continue;
            }
        }

        if let Err(e) = notifier.notify(action.id.as_str()).await {
            warn!(error = %e, "Controller stopped, abandoning script");
            return;
        }
    }
}

/// Log every controller event as JSON at debug level.
pub fn spawn_event_log(events: &EventBroadcaster) -> JoinHandle<()> {
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(event = %json, "Controller event"),
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Run the scenario described by `config`.
///
/// Stops after `scenario.run_for_ms` or as soon as `interrupt` resolves,
/// whichever comes first.
pub async fn run_scenario(
    config: &AppConfig,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<ScenarioOutcome> {
    let events = EventBroadcaster::new_shared();
    let store = Arc::new(EventedStore::new(
        InMemoryStore::with_policy(config.store.transition_policy),
        events.clone(),
    ));
    let event_log = spawn_event_log(&events);

    let seeded = seed_store(store.as_ref(), &config.scenario.seed).await?;
    info!(
        resources = seeded,
        policy = ?config.store.transition_policy,
        "Store seeded"
    );

    let provisioner = SimulatedProvisioner::new(
        config.provisioner.create_delay(),
        config.provisioner.delete_delay(),
    );
    let handle = Controller::builder(store.clone())
        .config(config.controller.clone())
        .provisioner(Arc::new(provisioner))
        .events(events.clone())
        .build()?
        .start();

    let script = tokio::spawn(play_actions(
        store.clone(),
        handle.notifier().clone(),
        config.scenario.actions.clone(),
    ));

    let interrupted = tokio::select! {
        _ = sleep(config.scenario.run_for()) => false,
        _ = interrupt => true,
    };
    info!(interrupted, "Stopping scenario");

    script.abort();
    let reconciler = handle.reconciler().clone();
    handle.shutdown().await?;
    event_log.abort();

    let mut resources = store.get_all().await?;
    resources.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    for resource in &resources {
        info!(resource_id = %resource.id, status = %resource.status, "Final state");
    }

    Ok(ScenarioOutcome {
        resources,
        stats: reconciler.stats(),
        interrupted,
    })
}
