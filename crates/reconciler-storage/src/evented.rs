//! EventedStore - a store wrapper that emits events after mutations.
//!
//! This wrapper delegates all operations to an inner store while emitting a
//! `StoreMutation` event to the broadcaster after each committed change.
//!
//! # Example
//!
//! ```ignore
//! use reconciler_core::events::EventBroadcaster;
//! use reconciler_storage::{EventedStore, InMemoryStore};
//!
//! let events = EventBroadcaster::new_shared();
//! let store = EventedStore::new(InMemoryStore::new(), events);
//!
//! // After this, a StoreMutation event is emitted
//! store.update_status("res-1", ResourceStatus::Running).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use reconciler_core::events::{ControllerEventKind, EventBroadcaster, StoreMutation};
use reconciler_core::{Resource, ResourceStatus};
use tracing::debug;

use crate::error::StorageError;
use crate::traits::{ResourceStore, StatusUpdate};

/// A store wrapper that emits events after successful mutations.
///
/// Events are emitted **after** the inner store commits, so every event
/// corresponds to an actual change. No-op updates and deletes of absent ids
/// emit nothing.
pub struct EventedStore<S: ResourceStore> {
    /// The inner store implementation.
    inner: S,
    /// The event broadcaster.
    broadcaster: Arc<EventBroadcaster>,
}

impl<S: ResourceStore> EventedStore<S> {
    /// Create a new evented store wrapper.
    pub fn new(inner: S, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a reference to the broadcaster.
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    fn emit(&self, resource: &Resource, mutation: StoreMutation) {
        if !self.broadcaster.has_subscribers() {
            return;
        }
        let count = self.broadcaster.emit(ControllerEventKind::StoreMutation {
            id: resource.id.clone(),
            mutation,
        });
        debug!(
            resource_id = %resource.id,
            subscribers = count,
            "Emitted StoreMutation event"
        );
    }

    fn emit_delete(&self, removed: Option<&Resource>) {
        if let Some(resource) = removed {
            self.emit(
                resource,
                StoreMutation::Deleted {
                    last_status: resource.status,
                },
            );
        }
    }

    fn emit_update(&self, update: Option<&StatusUpdate>) {
        if let Some(update) = update {
            self.emit(
                &update.resource,
                StoreMutation::StatusUpdated {
                    from: update.previous,
                    to: update.resource.status,
                },
            );
        }
    }
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for EventedStore<S> {
    async fn get_all(&self) -> Result<Vec<Resource>, StorageError> {
        // Read operations don't emit events
        self.inner.get_all().await
    }

    async fn get(&self, id: &str) -> Result<Option<Resource>, StorageError> {
        self.inner.get(id).await
    }

    async fn insert(&self, resource: Resource) -> Result<(), StorageError> {
        let snapshot = resource.clone();
        self.inner.insert(resource).await?;
        self.emit(
            &snapshot,
            StoreMutation::Inserted {
                status: snapshot.status,
            },
        );
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: ResourceStatus,
    ) -> Result<Option<StatusUpdate>, StorageError> {
        let result = self.inner.update_status(id, status).await?;
        self.emit_update(result.as_ref());
        Ok(result)
    }

    async fn update_status_if(
        &self,
        id: &str,
        expected: ResourceStatus,
        status: ResourceStatus,
    ) -> Result<Option<StatusUpdate>, StorageError> {
        let result = self.inner.update_status_if(id, expected, status).await?;
        self.emit_update(result.as_ref());
        Ok(result)
    }

    async fn delete(&self, id: &str) -> Result<Option<Resource>, StorageError> {
        let removed = self.inner.delete(id).await?;
        self.emit_delete(removed.as_ref());
        Ok(removed)
    }

    async fn delete_if(
        &self,
        id: &str,
        expected: ResourceStatus,
    ) -> Result<Option<Resource>, StorageError> {
        let removed = self.inner.delete_if(id, expected).await?;
        self.emit_delete(removed.as_ref());
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, StorageError> {
        self.inner.len().await
    }
}
