//! The resource store contract.

use async_trait::async_trait;
use reconciler_core::{Resource, ResourceStatus};

use crate::error::StorageError;

/// Result of an applied status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Status before the update.
    pub previous: ResourceStatus,
    /// Snapshot after the update.
    pub resource: Resource,
}

/// Authoritative state of every managed resource.
///
/// All operations are linearizable with respect to each other: a reader never
/// observes a half-applied write. Status transitions are the only mutation
/// path once a resource exists.
///
/// Addressing an absent id is a no-op reported as `Ok(None)`, not an error.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Point-in-time copy of every resource, in no particular order.
    async fn get_all(&self) -> Result<Vec<Resource>, StorageError>;

    /// Snapshot of a single resource.
    async fn get(&self, id: &str) -> Result<Option<Resource>, StorageError>;

    /// Add a new resource.
    async fn insert(&self, resource: Resource) -> Result<(), StorageError>;

    /// Atomically set the status and refresh `updated_at`.
    ///
    /// Returns the previous status and the updated snapshot, or `None` if the
    /// id is absent.
    async fn update_status(
        &self,
        id: &str,
        status: ResourceStatus,
    ) -> Result<Option<StatusUpdate>, StorageError>;

    /// Set the status only if it currently equals `expected`.
    ///
    /// The comparison and the write happen under one lock. Returns `None` if
    /// the id is absent or its status is no longer `expected`; nothing is
    /// written in either case.
    async fn update_status_if(
        &self,
        id: &str,
        expected: ResourceStatus,
        status: ResourceStatus,
    ) -> Result<Option<StatusUpdate>, StorageError>;

    /// Atomically remove a resource.
    ///
    /// Returns the removed snapshot, or `None` if the id was absent.
    async fn delete(&self, id: &str) -> Result<Option<Resource>, StorageError>;

    /// Remove a resource only if its status currently equals `expected`.
    ///
    /// Returns the removed snapshot, or `None` if the id is absent or its
    /// status is no longer `expected`.
    async fn delete_if(
        &self,
        id: &str,
        expected: ResourceStatus,
    ) -> Result<Option<Resource>, StorageError>;

    /// Number of stored resources.
    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.get_all().await?.len())
    }

    /// Check if the store holds no resources.
    async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl<T: ResourceStore + ?Sized> ResourceStore for std::sync::Arc<T> {
    async fn get_all(&self) -> Result<Vec<Resource>, StorageError> {
        (**self).get_all().await
    }

    async fn get(&self, id: &str) -> Result<Option<Resource>, StorageError> {
        (**self).get(id).await
    }

    async fn insert(&self, resource: Resource) -> Result<(), StorageError> {
        (**self).insert(resource).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: ResourceStatus,
    ) -> Result<Option<StatusUpdate>, StorageError> {
        (**self).update_status(id, status).await
    }

    async fn update_status_if(
        &self,
        id: &str,
        expected: ResourceStatus,
        status: ResourceStatus,
    ) -> Result<Option<StatusUpdate>, StorageError> {
        (**self).update_status_if(id, expected, status).await
    }

    async fn delete(&self, id: &str) -> Result<Option<Resource>, StorageError> {
        (**self).delete(id).await
    }

    async fn delete_if(
        &self,
        id: &str,
        expected: ResourceStatus,
    ) -> Result<Option<Resource>, StorageError> {
        (**self).delete_if(id, expected).await
    }

    async fn len(&self) -> Result<usize, StorageError> {
        (**self).len().await
    }
}
