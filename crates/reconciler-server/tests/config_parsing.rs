use std::{env, fs};

use reconciler_controller::ShutdownPolicy;
use reconciler_core::ResourceStatus;
use reconciler_server::config::loader::{load_config, to_toml};
use reconciler_storage::TransitionPolicy;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("reconciler.toml");

    let toml_content = r#"
[controller]
sweep_interval_ms = 1000
notify_capacity = 4
shutdown_policy = "detach"

[provisioner]
create_delay_ms = 100
delete_delay_ms = 200

[store]
transition_policy = "strict"

[logging]
level = "debug"

[scenario]
run_for_ms = 3000

[[scenario.seed]]
id = "db-1"
status = "Creating"

[[scenario.actions]]
after_ms = 500
id = "db-1"
status = "Deleting"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses, unspecified fields take defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.controller.sweep_interval_ms, 1000);
    assert_eq!(cfg.controller.notify_capacity, 4);
    assert_eq!(cfg.controller.hook_timeout_ms, 30_000);
    assert_eq!(cfg.controller.shutdown_policy, ShutdownPolicy::Detach);
    assert_eq!(cfg.provisioner.delete_delay_ms, 200);
    assert_eq!(cfg.store.transition_policy, TransitionPolicy::Strict);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.scenario.seed.len(), 1);
    assert_eq!(cfg.scenario.seed[0].status, ResourceStatus::Creating);
    assert_eq!(cfg.scenario.actions[0].after_ms, 500);

    // 2) Env override should win over file
    unsafe {
        env::set_var("RECONCILER__CONTROLLER__NOTIFY_CAPACITY", "32");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.controller.notify_capacity, 32);
    unsafe {
        env::remove_var("RECONCILER__CONTROLLER__NOTIFY_CAPACITY");
    }

    // 3) Validation error on bad values
    let bad = toml_content.replace("notify_capacity = 4", "notify_capacity = 0");
    fs::write(&path, bad).expect("write bad toml");
    let err = load_config(path.to_str()).unwrap_err();
    assert!(err.contains("notify_capacity"), "unexpected error: {err}");

    // 4) Unknown status names are rejected
    let bad = toml_content.replace("status = \"Deleting\"", "status = \"Exploding\"");
    fs::write(&path, bad).expect("write bad toml");
    assert!(load_config(path.to_str()).is_err());
}

#[test]
fn rendered_defaults_load_back() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("reconciler.toml");

    let defaults = reconciler_server::AppConfig::default();
    fs::write(&path, to_toml(&defaults).expect("render")).expect("write toml");

    let cfg = load_config(path.to_str()).expect("defaults should load");
    assert_eq!(cfg.controller.sweep_interval_ms, 5_000);
    assert_eq!(cfg.scenario.run_for_ms, 60_000);
    assert_eq!(cfg.scenario.seed, defaults.scenario.seed);
    assert_eq!(cfg.scenario.actions, defaults.scenario.actions);
}
