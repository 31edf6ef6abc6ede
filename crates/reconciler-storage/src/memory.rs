//! In-memory resource store.

use std::collections::HashMap;

use async_trait::async_trait;
use reconciler_core::{Resource, ResourceId, ResourceStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::traits::{ResourceStore, StatusUpdate};

/// Whether the store validates status updates against the lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any status may replace any other.
    #[default]
    Permissive,
    /// Only edges allowed by [`ResourceStatus::can_transition_to`] are applied.
    Strict,
}

/// In-memory store guarded by a single reader-writer lock.
///
/// Every operation takes the one lock for its whole duration, which makes them
/// linearizable with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<HashMap<ResourceId, Resource>>,
    policy: TransitionPolicy,
}

impl InMemoryStore {
    /// Creates an empty, permissive store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given transition policy.
    pub fn with_policy(policy: TransitionPolicy) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Creates a permissive store holding `resources`. Later duplicates win.
    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let data = resources
            .into_iter()
            .map(|resource| (resource.id.clone(), resource))
            .collect();
        Self {
            data: RwLock::new(data),
            policy: TransitionPolicy::Permissive,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Write `status` into an entry the caller holds under the write lock.
    fn apply(
        &self,
        resource: &mut Resource,
        status: ResourceStatus,
    ) -> Result<StatusUpdate, StorageError> {
        let previous = resource.status;
        if self.policy == TransitionPolicy::Strict && !previous.can_transition_to(status) {
            return Err(StorageError::illegal_transition(
                resource.id.clone(),
                previous,
                status,
            ));
        }

        resource.set_status(status);
        info!(resource_id = %resource.id, from = %previous, to = %status, "Resource status updated");
        Ok(StatusUpdate {
            previous,
            resource: resource.clone(),
        })
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_all(&self) -> Result<Vec<Resource>, StorageError> {
        let guard = self.data.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Resource>, StorageError> {
        let guard = self.data.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn insert(&self, resource: Resource) -> Result<(), StorageError> {
        let mut guard = self.data.write().await;
        if guard.contains_key(&resource.id) {
            return Err(StorageError::already_exists(resource.id));
        }
        info!(resource_id = %resource.id, status = %resource.status, "Resource inserted");
        guard.insert(resource.id.clone(), resource);
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: ResourceStatus,
    ) -> Result<Option<StatusUpdate>, StorageError> {
        let mut guard = self.data.write().await;
        let Some(resource) = guard.get_mut(id) else {
            debug!(resource_id = %id, status = %status, "Status update for absent resource ignored");
            return Ok(None);
        };

        self.apply(resource, status).map(Some)
    }

    async fn update_status_if(
        &self,
        id: &str,
        expected: ResourceStatus,
        status: ResourceStatus,
    ) -> Result<Option<StatusUpdate>, StorageError> {
        let mut guard = self.data.write().await;
        let Some(resource) = guard.get_mut(id) else {
            debug!(resource_id = %id, status = %status, "Conditional update for absent resource ignored");
            return Ok(None);
        };
        if resource.status != expected {
            debug!(
                resource_id = %id,
                expected = %expected,
                actual = %resource.status,
                status = %status,
                "Conditional update skipped, status changed"
            );
            return Ok(None);
        }

        self.apply(resource, status).map(Some)
    }

    async fn delete(&self, id: &str) -> Result<Option<Resource>, StorageError> {
        let mut guard = self.data.write().await;
        let removed = guard.remove(id);
        match &removed {
            Some(resource) => {
                info!(resource_id = %id, last_status = %resource.status, "Resource deleted")
            }
            None => debug!(resource_id = %id, "Delete for absent resource ignored"),
        }
        Ok(removed)
    }

    async fn delete_if(
        &self,
        id: &str,
        expected: ResourceStatus,
    ) -> Result<Option<Resource>, StorageError> {
        let mut guard = self.data.write().await;
        match guard.get(id).map(|resource| resource.status) {
            Some(actual) if actual == expected => {
                let removed = guard.remove(id);
                info!(resource_id = %id, last_status = %expected, "Resource deleted");
                Ok(removed)
            }
            Some(actual) => {
                debug!(
                    resource_id = %id,
                    expected = %expected,
                    actual = %actual,
                    "Conditional delete skipped, status changed"
                );
                Ok(None)
            }
            None => {
                debug!(resource_id = %id, "Conditional delete for absent resource ignored");
                Ok(None)
            }
        }
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.data.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn seeded() -> InMemoryStore {
        InMemoryStore::from_resources([
            Resource::new("res-1", ResourceStatus::Creating),
            Resource::new("res-2", ResourceStatus::Running),
        ])
    }

    #[tokio::test]
    async fn test_get_all_returns_snapshots() {
        let store = seeded();
        let mut all = store.get_all().await.unwrap();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id.as_str(), "res-1");
        assert_eq!(all[1].status, ResourceStatus::Running);

        // Mutating a snapshot does not touch the store.
        all[0].status = ResourceStatus::Failed;
        let stored = store.get("res-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ResourceStatus::Creating);
    }

    #[tokio::test]
    async fn test_update_status_refreshes_timestamp() {
        let store = seeded();
        let before = store.get("res-1").await.unwrap().unwrap().updated_at;

        let update = store
            .update_status("res-1", ResourceStatus::Running)
            .await
            .unwrap()
            .expect("resource exists");
        assert_eq!(update.previous, ResourceStatus::Creating);
        assert_eq!(update.resource.status, ResourceStatus::Running);
        assert!(update.resource.updated_at >= before);
    }

    #[tokio::test]
    async fn test_update_absent_is_noop() {
        let store = seeded();
        let result = store
            .update_status("missing", ResourceStatus::Running)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_is_terminal() {
        let store = seeded();
        let removed = store.delete("res-2").await.unwrap();
        assert_eq!(removed.map(|r| r.status), Some(ResourceStatus::Running));

        assert!(store.get("res-2").await.unwrap().is_none());
        assert!(store.get_all().await.unwrap().iter().all(|r| r.id.as_str() != "res-2"));
        assert!(store.delete("res-2").await.unwrap().is_none());
        assert!(
            store
                .update_status("res-2", ResourceStatus::Running)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = seeded();
        let err = store
            .insert(Resource::new("res-1", ResourceStatus::Unknown))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        store
            .insert(Resource::new("res-3", ResourceStatus::Unknown))
            .await
            .unwrap();
        assert_eq!(store.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_permissive_allows_any_transition() {
        let store = seeded();
        let update = store
            .update_status("res-2", ResourceStatus::Creating)
            .await
            .unwrap();
        assert!(update.is_some());
    }

    #[tokio::test]
    async fn test_strict_rejects_illegal_transition() {
        let store = InMemoryStore::with_policy(TransitionPolicy::Strict);
        store
            .insert(Resource::new("res-1", ResourceStatus::Running))
            .await
            .unwrap();

        let err = store
            .update_status("res-1", ResourceStatus::Creating)
            .await
            .unwrap_err();
        assert!(err.is_illegal_transition());
        let stored = store.get("res-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ResourceStatus::Running);

        store
            .update_status("res-1", ResourceStatus::Deleting)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_conditional_update_applies_on_match() {
        let store = seeded();
        let update = store
            .update_status_if("res-2", ResourceStatus::Running, ResourceStatus::Failed)
            .await
            .unwrap()
            .expect("status matched");
        assert_eq!(update.previous, ResourceStatus::Running);
        assert_eq!(update.resource.status, ResourceStatus::Failed);
    }

    #[tokio::test]
    async fn test_conditional_update_skips_changed_status() {
        let store = seeded();
        store
            .update_status("res-2", ResourceStatus::Deleting)
            .await
            .unwrap();
        let before = store.get("res-2").await.unwrap().unwrap();

        let result = store
            .update_status_if("res-2", ResourceStatus::Running, ResourceStatus::Failed)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.get("res-2").await.unwrap().unwrap(), before);

        assert!(
            store
                .update_status_if("missing", ResourceStatus::Running, ResourceStatus::Failed)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_conditional_update_respects_strict_policy() {
        let store = InMemoryStore::with_policy(TransitionPolicy::Strict);
        store
            .insert(Resource::new("res-1", ResourceStatus::Running))
            .await
            .unwrap();

        let err = store
            .update_status_if("res-1", ResourceStatus::Running, ResourceStatus::Creating)
            .await
            .unwrap_err();
        assert!(err.is_illegal_transition());
    }

    #[tokio::test]
    async fn test_conditional_delete_checks_status() {
        let store = seeded();
        store
            .update_status("res-1", ResourceStatus::Running)
            .await
            .unwrap();

        assert!(
            store
                .delete_if("res-1", ResourceStatus::Deleting)
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.get("res-1").await.unwrap().is_some());

        let removed = store
            .delete_if("res-1", ResourceStatus::Running)
            .await
            .unwrap();
        assert_eq!(removed.map(|r| r.status), Some(ResourceStatus::Running));
        assert!(store.get("res-1").await.unwrap().is_none());
        assert!(
            store
                .delete_if("res-1", ResourceStatus::Running)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_concurrent_conditional_updates_apply_once() {
        let store = Arc::new(seeded());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_status_if("res-2", ResourceStatus::Running, ResourceStatus::Failed)
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..10 {
            store
                .insert(Resource::new(format!("res-{i}"), ResourceStatus::Creating))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_status(&format!("res-{i}"), ResourceStatus::Running)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        let all = store.get_all().await.unwrap();
        assert!(all.iter().all(|r| r.status == ResourceStatus::Running));
    }

    #[test]
    fn test_policy_serde() {
        let policy: TransitionPolicy = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(policy, TransitionPolicy::Strict);
        assert_eq!(TransitionPolicy::default(), TransitionPolicy::Permissive);
    }
}
