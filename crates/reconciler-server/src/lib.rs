pub mod config;
pub mod observability;
pub mod scenario;

pub use config::AppConfig;
pub use observability::{apply_logging_level, init_tracing};
pub use scenario::{ScenarioOutcome, run_scenario};
