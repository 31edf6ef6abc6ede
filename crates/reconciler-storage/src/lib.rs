//! # reconciler-storage
//!
//! The resource store the controller reconciles against.
//!
//! The main trait is [`ResourceStore`]: snapshot reads of every resource or of
//! one resource, status updates and deletion, all linearizable. Addressing an
//! absent id is a no-op, reported as `Ok(None)`.
//!
//! ## Example
//!
//! ```ignore
//! use reconciler_core::{Resource, ResourceStatus};
//! use reconciler_storage::{InMemoryStore, ResourceStore};
//!
//! let store = InMemoryStore::new();
//! store.insert(Resource::new("res-1", ResourceStatus::Creating)).await?;
//! store.update_status("res-1", ResourceStatus::Running).await?;
//! ```
//!
//! ## Backends
//!
//! - [`InMemoryStore`]: a map behind one `tokio::sync::RwLock`, with an optional
//!   strict [`TransitionPolicy`]
//! - [`EventedStore`]: wraps any store and publishes a `StoreMutation` event
//!   after every committed change

mod error;
pub mod evented;
pub mod memory;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use evented::EventedStore;
pub use memory::{InMemoryStore, TransitionPolicy};
pub use traits::{ResourceStore, StatusUpdate};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared store trait object.
pub type DynStore = std::sync::Arc<dyn ResourceStore>;
