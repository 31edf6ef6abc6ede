//! Resource model and controller events shared by the reconciler crates.

pub mod error;
pub mod events;
pub mod resource;

pub use error::{CoreError, Result};
pub use resource::{Resource, ResourceId, ResourceStatus};
