use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Opaque, stable identifier of a managed resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates an ID, rejecting empty or whitespace-only values.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::invalid_id(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unchecked conversion for ids that are known to be valid. Use
/// [`ResourceId::new`] for untrusted input.
impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a managed resource.
///
/// `Creating` and `Deleting` are transient: a resource in either status needs an
/// asynchronous worker to converge. `Running` is the stable state of a live
/// resource; a deleted resource is simply absent from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResourceStatus {
    Creating,
    Running,
    Deleting,
    Failed,
    #[default]
    Unknown,
}

impl ResourceStatus {
    pub const ALL: [ResourceStatus; 5] = [
        ResourceStatus::Creating,
        ResourceStatus::Running,
        ResourceStatus::Deleting,
        ResourceStatus::Failed,
        ResourceStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Creating => "Creating",
            ResourceStatus::Running => "Running",
            ResourceStatus::Deleting => "Deleting",
            ResourceStatus::Failed => "Failed",
            ResourceStatus::Unknown => "Unknown",
        }
    }

    /// Whether converging this status requires a long-running worker.
    pub fn needs_async(&self) -> bool {
        matches!(self, ResourceStatus::Creating | ResourceStatus::Deleting)
    }

    /// Whether this status is a convergence end point.
    pub fn is_stable(&self) -> bool {
        matches!(self, ResourceStatus::Running)
    }

    /// Legal lifecycle edges.
    ///
    /// Setting a status to itself is always allowed. `Unknown` may move anywhere,
    /// nothing may move back to `Unknown`.
    pub fn can_transition_to(&self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Unknown, _) => true,
            (_, Unknown) => false,
            (Creating, Running | Failed | Deleting) => true,
            (Running, Deleting | Failed) => true,
            (Failed, Creating | Deleting) => true,
            (Deleting, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::invalid_status(s))
    }
}

/// A snapshot of one managed resource as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub status: ResourceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Resource {
    pub fn new(id: impl Into<ResourceId>, status: ResourceStatus) -> Self {
        Self {
            id: id.into(),
            status,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the status and refreshes `updated_at`.
    pub fn set_status(&mut self, status: ResourceStatus) {
        self.status = status;
        self.updated_at = OffsetDateTime::now_utc();
    }
}
