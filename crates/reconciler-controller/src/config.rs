//! Controller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// What happens to in-flight workers when the controller loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Cancel every worker and wait (up to the grace period) for them to exit.
    #[default]
    Drain,
    /// Leave workers running; they outlive the loop.
    Detach,
}

/// Configuration for the reconciliation controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Period of the full sweep over every resource.
    /// Default: 5000 ms
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Capacity of the notification queue.
    /// Default: 10
    #[serde(default = "default_notify_capacity")]
    pub notify_capacity: usize,

    /// Upper bound on one health-check or failure hook call.
    /// Default: 30000 ms
    #[serde(default = "default_hook_timeout_ms")]
    pub hook_timeout_ms: u64,

    /// Push a resource back onto the notification queue when its worker exits
    /// cancelled, so the replacement target is picked up without waiting for
    /// the next sweep.
    /// Default: true
    #[serde(default = "default_true")]
    pub requeue_on_cancel: bool,

    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,

    /// How long a draining shutdown waits for workers.
    /// Default: 10000 ms
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_sweep_interval_ms() -> u64 {
    5_000
}
fn default_notify_capacity() -> usize {
    10
}
fn default_hook_timeout_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            notify_capacity: default_notify_capacity(),
            hook_timeout_ms: default_hook_timeout_ms(),
            requeue_on_cancel: default_true(),
            shutdown_policy: ShutdownPolicy::default(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.sweep_interval_ms == 0 {
            return Err(ControllerError::config("sweep_interval_ms must be > 0"));
        }
        if self.notify_capacity == 0 {
            return Err(ControllerError::config("notify_capacity must be > 0"));
        }
        if self.hook_timeout_ms == 0 {
            return Err(ControllerError::config("hook_timeout_ms must be > 0"));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Create a configuration for testing with fast timeouts.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            sweep_interval_ms: 1_000,
            hook_timeout_ms: 500,
            shutdown_grace_ms: 1_000,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.notify_capacity, 10);
        assert!(config.requeue_on_cancel);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"sweep_interval_ms": 250, "shutdown_policy": "detach"}"#)
                .unwrap();
        assert_eq!(config.sweep_interval_ms, 250);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Detach);
        assert_eq!(config.notify_capacity, 10);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = ControllerConfig {
            notify_capacity: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("notify_capacity"));
    }
}
