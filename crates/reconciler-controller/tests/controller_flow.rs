//! Integration tests for the controller loop.
//!
//! All tests run on a paused tokio clock, so the simulated 4s/5s actions
//! complete instantly in wall time while preserving their ordering.

use std::sync::Arc;
use std::time::Duration;

use reconciler_controller::{
    Controller, ControllerConfig, ControllerHandle, NotifyError, SimulatedProvisioner,
};
use reconciler_core::events::{
    ControllerEvent, ControllerEventKind, EventBroadcaster, StoreMutation, WorkerOutcome,
};
use reconciler_core::{Resource, ResourceStatus};
use reconciler_storage::{EventedStore, InMemoryStore, ResourceStore};
use tokio::sync::broadcast;
use tokio::time::sleep;

type TestStore = Arc<EventedStore<InMemoryStore>>;

/// Store seeded with `resources`, publishing on a fresh broadcaster.
fn seeded_store(resources: &[(&str, ResourceStatus)]) -> (TestStore, Arc<EventBroadcaster>) {
    let events = EventBroadcaster::new_shared();
    let inner = InMemoryStore::from_resources(
        resources
            .iter()
            .map(|(id, status)| Resource::new(*id, *status)),
    );
    (Arc::new(EventedStore::new(inner, events.clone())), events)
}

fn start_controller(
    store: &TestStore,
    events: &Arc<EventBroadcaster>,
    config: ControllerConfig,
) -> ControllerHandle {
    Controller::builder(store.clone())
        .config(config)
        .provisioner(Arc::new(SimulatedProvisioner::new(
            Duration::from_secs(4),
            Duration::from_secs(5),
        )))
        .events(events.clone())
        .build()
        .expect("valid config")
        .start()
}

fn drain(receiver: &mut broadcast::Receiver<ControllerEvent>) -> Vec<ControllerEventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

fn position(kinds: &[ControllerEventKind], predicate: impl Fn(&ControllerEventKind) -> bool) -> usize {
    kinds
        .iter()
        .position(predicate)
        .expect("expected event not found")
}

async fn status_of(store: &TestStore, id: &str) -> Option<ResourceStatus> {
    store.get(id).await.unwrap().map(|r| r.status)
}

#[tokio::test(start_paused = true)]
async fn creating_resource_converges_to_running() {
    let (store, events) = seeded_store(&[("res-1", ResourceStatus::Creating)]);
    let handle = start_controller(&store, &events, ControllerConfig::for_testing());

    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(status_of(&store, "res-1").await, Some(ResourceStatus::Creating));
    assert_eq!(
        handle.reconciler().registry().target_of("res-1"),
        Some(ResourceStatus::Creating)
    );

    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(status_of(&store, "res-1").await, Some(ResourceStatus::Running));
    assert!(handle.reconciler().registry().is_empty());

    let stats = handle.stats();
    assert_eq!(stats.workers_started, 1);
    assert_eq!(stats.workers_completed, 1);
    assert!(stats.sweeps >= 4);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn deletion_is_terminal() {
    let (store, events) = seeded_store(&[("res-1", ResourceStatus::Running)]);
    let handle = start_controller(&store, &events, ControllerConfig::for_testing());

    sleep(Duration::from_millis(500)).await;
    store
        .update_status("res-1", ResourceStatus::Deleting)
        .await
        .unwrap();
    handle.notifier().notify("res-1").await.unwrap();

    sleep(Duration::from_millis(5_700)).await;
    assert_eq!(status_of(&store, "res-1").await, None);
    assert!(store.is_empty().await.unwrap());

    // Later sweeps and notifications never bring it back.
    handle.notifier().notify("res-1").await.unwrap();
    sleep(Duration::from_secs(3)).await;
    assert!(store.is_empty().await.unwrap());
    assert!(handle.reconciler().registry().is_empty());
    assert_eq!(handle.stats().workers_started, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn status_change_cancels_then_defers_new_worker() {
    let (store, events) = seeded_store(&[("res-1", ResourceStatus::Creating)]);
    let mut receiver = events.subscribe();
    let handle = start_controller(&store, &events, ControllerConfig::for_testing());

    sleep(Duration::from_millis(2_500)).await;
    store
        .update_status("res-1", ResourceStatus::Deleting)
        .await
        .unwrap();
    handle.notifier().notify("res-1").await.unwrap();

    // The cancelled worker exited and the requeue started the delete worker.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(
        handle.reconciler().registry().target_of("res-1"),
        Some(ResourceStatus::Deleting)
    );
    assert_eq!(status_of(&store, "res-1").await, Some(ResourceStatus::Deleting));

    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(status_of(&store, "res-1").await, None);
    handle.shutdown().await.unwrap();

    let kinds = drain(&mut receiver);
    let cancel = position(&kinds, |k| {
        matches!(
            k,
            ControllerEventKind::WorkerCancelRequested {
                running: ResourceStatus::Creating,
                requested: ResourceStatus::Deleting,
                ..
            }
        )
    });
    let exited = position(&kinds, |k| {
        matches!(
            k,
            ControllerEventKind::WorkerExited {
                target: ResourceStatus::Creating,
                outcome: WorkerOutcome::Cancelled,
                ..
            }
        )
    });
    let started = position(&kinds, |k| {
        matches!(
            k,
            ControllerEventKind::WorkerStarted {
                target: ResourceStatus::Deleting,
                ..
            }
        )
    });
    let deleted = position(&kinds, |k| {
        matches!(
            k,
            ControllerEventKind::StoreMutation {
                mutation: StoreMutation::Deleted { .. },
                ..
            }
        )
    });
    assert!(cancel < exited);
    assert!(exited < started);
    assert!(started < deleted);

    // The cancelled create never committed Running.
    assert!(!kinds.iter().any(|k| matches!(
        k,
        ControllerEventKind::StoreMutation {
            mutation: StoreMutation::StatusUpdated {
                to: ResourceStatus::Running,
                ..
            },
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn without_requeue_next_sweep_starts_new_target() {
    let (store, events) = seeded_store(&[("res-1", ResourceStatus::Creating)]);
    let config = ControllerConfig {
        requeue_on_cancel: false,
        ..ControllerConfig::for_testing()
    };
    let handle = start_controller(&store, &events, config);

    sleep(Duration::from_millis(2_500)).await;
    store
        .update_status("res-1", ResourceStatus::Deleting)
        .await
        .unwrap();
    handle.notifier().notify("res-1").await.unwrap();

    sleep(Duration::from_millis(100)).await;
    assert!(handle.reconciler().registry().is_empty());

    // The sweep at t=3s picks it up.
    sleep(Duration::from_millis(900)).await;
    assert_eq!(
        handle.reconciler().registry().target_of("res-1"),
        Some(ResourceStatus::Deleting)
    );

    let stats = handle.stats();
    assert_eq!(stats.cancel_requests, 1);
    assert_eq!(stats.workers_cancelled, 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn repeated_notifications_start_one_worker() {
    let (store, events) = seeded_store(&[
        ("res-1", ResourceStatus::Creating),
        ("res-2", ResourceStatus::Creating),
    ]);
    let handle = start_controller(&store, &events, ControllerConfig::for_testing());

    for _ in 0..5 {
        handle.notifier().notify("res-1").await.unwrap();
        handle.notifier().notify("res-2").await.unwrap();
    }
    sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.reconciler().registry().len(), 2);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(status_of(&store, "res-1").await, Some(ResourceStatus::Running));
    assert_eq!(status_of(&store, "res-2").await, Some(ResourceStatus::Running));

    let stats = handle.stats();
    assert_eq!(stats.workers_started, 2);
    assert_eq!(stats.notifications_received, 10);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn notification_for_missing_resource_is_harmless() {
    let (store, events) = seeded_store(&[]);
    let handle = start_controller(&store, &events, ControllerConfig::for_testing());

    handle.notifier().notify("ghost").await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(
        handle.reconciler().reconcile_one("ghost").await.unwrap(),
        reconciler_controller::Reconciliation::NotFound
    );
    assert!(handle.reconciler().registry().is_empty());
    assert_eq!(handle.stats().notifications_received, 1);
    handle.shutdown().await.unwrap();
}

/// The demo scenario: res-1 is being created while res-2 runs; two seconds
/// in, res-2 is marked for deletion.
#[tokio::test(start_paused = true)]
async fn demo_scenario_converges() {
    let (store, events) = seeded_store(&[
        ("res-1", ResourceStatus::Creating),
        ("res-2", ResourceStatus::Running),
    ]);
    let mut receiver = events.subscribe();
    let handle = start_controller(&store, &events, ControllerConfig::default());

    sleep(Duration::from_secs(2)).await;
    store
        .update_status("res-2", ResourceStatus::Deleting)
        .await
        .unwrap();
    handle.notifier().notify("res-2").await.unwrap();

    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(status_of(&store, "res-1").await, Some(ResourceStatus::Running));
    assert_eq!(status_of(&store, "res-2").await, Some(ResourceStatus::Deleting));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(status_of(&store, "res-2").await, None);
    assert_eq!(store.len().await.unwrap(), 1);

    handle.shutdown().await.unwrap();

    let kinds = drain(&mut receiver);
    assert_eq!(kinds.first(), Some(&ControllerEventKind::ControllerStarted));
    assert_eq!(kinds.last(), Some(&ControllerEventKind::ControllerStopped));
    let exits = kinds
        .iter()
        .filter(|k| {
            matches!(
                k,
                ControllerEventKind::WorkerExited {
                    outcome: WorkerOutcome::Completed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(exits, 2);
}

#[tokio::test(start_paused = true)]
async fn notifier_reports_closed_after_shutdown() {
    let (store, events) = seeded_store(&[]);
    let handle = start_controller(&store, &events, ControllerConfig::for_testing());
    let notifier = handle.notifier().clone();

    handle.shutdown().await.unwrap();

    assert!(notifier.is_closed());
    assert!(matches!(
        notifier.try_notify("res-1"),
        Err(NotifyError::Closed(_))
    ));
    assert!(matches!(
        notifier.notify("res-1").await,
        Err(NotifyError::Closed(_))
    ));
}

#[tokio::test]
async fn build_rejects_invalid_config() {
    let (store, _) = seeded_store(&[]);
    let config = ControllerConfig {
        sweep_interval_ms: 0,
        ..Default::default()
    };
    let err = Controller::builder(store).config(config).build().err().unwrap();
    assert!(err.to_string().contains("sweep_interval_ms"));
}
