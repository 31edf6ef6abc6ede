//! Notification channel: "this resource changed, reconcile it now".
//!
//! A bounded multi-producer, single-consumer queue of resource ids. The
//! controller loop owns the consuming end; any number of [`Notifier`] clones
//! may produce into it. Ids are delivered in FIFO order.
//!
//! # Backpressure
//!
//! Producers choose the policy per call:
//!
//! - [`Notifier::notify`] waits for capacity when the queue is full.
//! - [`Notifier::try_notify`] never waits and returns [`NotifyError::Full`]
//!   instead, leaving the resource to the next periodic sweep.
//!
//! Callers are expected to update the store *before* notifying. Blank ids are
//! rejected with [`NotifyError::InvalidId`] and never reach the queue.

use reconciler_core::ResourceId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::error::NotifyError;

/// Create a notification queue with the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero. `ControllerConfig::validate` rejects that.
pub fn notification_channel(capacity: usize) -> (Notifier, NotificationQueue) {
    let (sender, receiver) = mpsc::channel(capacity);
    (Notifier { sender }, NotificationQueue { receiver })
}

/// Producer handle for the notification queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::Sender<ResourceId>,
}

impl Notifier {
    /// Queue `id`, waiting for capacity if the queue is full.
    pub async fn notify(&self, id: impl Into<ResourceId>) -> Result<(), NotifyError> {
        let id = checked(id.into())?;
        debug!(resource_id = %id, "Queueing notification");
        self.sender
            .send(id)
            .await
            .map_err(|err| NotifyError::Closed(err.0))
    }

    /// Queue `id` without waiting.
    pub fn try_notify(&self, id: impl Into<ResourceId>) -> Result<(), NotifyError> {
        let id = checked(id.into())?;
        self.sender.try_send(id).map_err(|err| match err {
            TrySendError::Full(id) => NotifyError::Full(id),
            TrySendError::Closed(id) => NotifyError::Closed(id),
        })
    }

    /// Check if the consuming end is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Free slots in the queue.
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}

fn checked(id: ResourceId) -> Result<ResourceId, NotifyError> {
    if id.as_str().trim().is_empty() {
        return Err(NotifyError::InvalidId(id));
    }
    Ok(id)
}

/// Consuming end of the notification queue, owned by the controller loop.
#[derive(Debug)]
pub struct NotificationQueue {
    receiver: mpsc::Receiver<ResourceId>,
}

impl NotificationQueue {
    /// Wait for the next id. `None` once every notifier is dropped.
    pub async fn recv(&mut self) -> Option<ResourceId> {
        self.receiver.recv().await
    }

    /// Number of ids waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
