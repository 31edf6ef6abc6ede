//! # reconciler-controller
//!
//! A level-triggered reconciliation controller. It continuously drives every
//! resource in a [`reconciler_storage::ResourceStore`] toward the behavior its
//! status implies:
//!
//! - `Creating` / `Deleting` resources get exactly one background worker that
//!   performs the slow action and commits the result.
//! - `Running` / `Failed` resources are handled by the reconcile pass through
//!   [`LifecycleHooks`]; a hook result is only written if the status has not
//!   changed in the meantime.
//!
//! Work is triggered by a periodic sweep and by explicit notifications sent
//! through a [`Notifier`]. A status change while a worker is in flight
//! cancels that worker; the new target starts only after the old worker has
//! exited and released its registry entry.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reconciler_controller::{Controller, ControllerConfig};
//! use reconciler_storage::InMemoryStore;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let handle = Controller::builder(store.clone())
//!     .config(ControllerConfig::default())
//!     .build()?
//!     .start();
//!
//! store.update_status("res-1", ResourceStatus::Deleting).await?;
//! handle.notifier().notify("res-1").await?;
//!
//! handle.shutdown().await?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod hooks;
pub mod notify;
pub mod provisioner;
pub mod reconciler;
pub mod registry;
mod stats;
mod worker;

pub use config::{ControllerConfig, ShutdownPolicy};
pub use controller::{Controller, ControllerBuilder, ControllerHandle};
pub use error::{ControllerError, NotifyError};
pub use hooks::{FailureAction, HealthStatus, HookError, LifecycleHooks, LoggingHooks};
pub use notify::{NotificationQueue, Notifier, notification_channel};
pub use provisioner::{Provisioner, SimulatedProvisioner};
pub use reconciler::{Reconciliation, Reconciler, SweepReport};
pub use registry::{StartOutcome, WorkerInfo, WorkerRegistry};
pub use stats::ControllerStats;
