//! Controller event system.
//!
//! ```text
//!  Controller loop ──┐
//!  Workers ──────────┼──► EventBroadcaster ──► subscribers (logs, tests)
//!  EventedStore ─────┘    (tokio::sync::broadcast)
//! ```
//!
//! - [`types`]: `ControllerEvent`, `ControllerEventKind`, `StoreMutation`, `WorkerOutcome`
//! - [`broadcaster`]: the event bus

pub mod broadcaster;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use types::{ControllerEvent, ControllerEventKind, StoreMutation, WorkerOutcome};
