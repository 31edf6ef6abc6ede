use std::collections::HashSet;
use std::time::Duration;

use reconciler_controller::ControllerConfig;
use reconciler_core::ResourceStatus;
use reconciler_storage::TransitionPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Controller validations
        self.controller.validate().map_err(|e| e.to_string())?;

        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }

        // Scenario validations
        let mut seen = HashSet::new();
        for seed in &self.scenario.seed {
            if seed.id.trim().is_empty() {
                return Err("scenario.seed ids must not be empty".into());
            }
            if !seen.insert(seed.id.as_str()) {
                return Err(format!("scenario.seed contains duplicate id '{}'", seed.id));
            }
        }
        if self
            .scenario
            .actions
            .iter()
            .any(|action| action.id.trim().is_empty())
        {
            return Err("scenario.actions ids must not be empty".into());
        }
        if self.scenario.run_for_ms == 0 {
            return Err("scenario.run_for_ms must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    #[serde(default = "default_create_delay_ms")]
    pub create_delay_ms: u64,
    #[serde(default = "default_delete_delay_ms")]
    pub delete_delay_ms: u64,
}
fn default_create_delay_ms() -> u64 {
    4_000
}
fn default_delete_delay_ms() -> u64 {
    5_000
}
impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            create_delay_ms: default_create_delay_ms(),
            delete_delay_ms: default_delete_delay_ms(),
        }
    }
}
impl ProvisionerConfig {
    pub fn create_delay(&self) -> Duration {
        Duration::from_millis(self.create_delay_ms)
    }
    pub fn delete_delay(&self) -> Duration {
        Duration::from_millis(self.delete_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub transition_policy: TransitionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A resource present in the store before the controller starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedResource {
    pub id: String,
    pub status: ResourceStatus,
}

/// An external state change: after `after_ms`, set `id` to `status` and notify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedAction {
    pub after_ms: u64,
    pub id: String,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// How long the controller runs before a graceful shutdown.
    #[serde(default = "default_run_for_ms")]
    pub run_for_ms: u64,
    #[serde(default = "default_seed")]
    pub seed: Vec<SeedResource>,
    #[serde(default = "default_actions")]
    pub actions: Vec<ScriptedAction>,
}
fn default_seed() -> Vec<SeedResource> {
    vec![
        SeedResource {
            id: "res-1".into(),
            status: ResourceStatus::Creating,
        },
        SeedResource {
            id: "res-2".into(),
            status: ResourceStatus::Running,
        },
    ]
}
fn default_actions() -> Vec<ScriptedAction> {
    vec![ScriptedAction {
        after_ms: 2_000,
        id: "res-2".into(),
        status: ResourceStatus::Deleting,
    }]
}
fn default_run_for_ms() -> u64 {
    60_000
}
impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            run_for_ms: default_run_for_ms(),
            seed: default_seed(),
            actions: default_actions(),
        }
    }
}
impl ScenarioConfig {
    pub fn run_for(&self) -> Duration {
        Duration::from_millis(self.run_for_ms)
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("reconciler.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., RECONCILER__CONTROLLER__SWEEP_INTERVAL_MS=1000
        builder = builder.add_source(
            Environment::with_prefix("RECONCILER")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }

    /// Render a configuration as TOML.
    pub fn to_toml(config: &AppConfig) -> Result<String, String> {
        toml::to_string_pretty(config).map_err(|e| format!("config render error: {e}"))
    }
}
