use std::env;

use reconciler_server::config::loader::{load_config, to_toml};
use reconciler_server::{apply_logging_level, init_tracing, run_scenario};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From RECONCILER_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (reconciler.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (RECONCILER_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );
    apply_logging_level(&cfg.logging.level);

    if env::args().skip(1).any(|arg| arg == "--print-config") {
        println!("{}", to_toml(&cfg).map_err(anyhow::Error::msg)?);
        return Ok(());
    }

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Interrupt received");
    };

    let outcome = run_scenario(&cfg, interrupt).await?;
    tracing::info!(
        resources = outcome.resources.len(),
        interrupted = outcome.interrupted,
        sweeps = outcome.stats.sweeps,
        workers_started = outcome.stats.workers_started,
        workers_completed = outcome.stats.workers_completed,
        workers_cancelled = outcome.stats.workers_cancelled,
        workers_superseded = outcome.stats.workers_superseded,
        workers_failed = outcome.stats.workers_failed,
        "Scenario finished"
    );
    Ok(())
}

fn resolve_config_path() -> (String, ConfigSource) {
    // 1. Check CLI: --config <path>
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    // 2. Check environment variable
    if let Ok(path) = env::var("RECONCILER_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    // 3. Default to reconciler.toml
    ("reconciler.toml".to_string(), ConfigSource::Default)
}
