// tests/config_env.rs
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use econ_calendar_alerts::config::app::{
    ENV_CONFIG_PATH, ENV_DATA_DIR, ENV_POLL_INTERVAL_SECS, ENV_TABLE_PATH, SETTINGS_FILE_NAME,
};
use econ_calendar_alerts::config::AppConfig;

const VARS: &[&str] = &[
    ENV_CONFIG_PATH,
    ENV_DATA_DIR,
    ENV_POLL_INTERVAL_SECS,
    ENV_TABLE_PATH,
];

fn clear() {
    for v in VARS {
        env::remove_var(v);
    }
}

#[serial_test::serial]
#[test]
fn file_in_data_dir_then_env_override() {
    clear();
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        "poll_interval_secs = 30\ndaily_task_name = \"Daily_Test\"\n",
    )
    .unwrap();

    env::set_var(ENV_DATA_DIR, tmp.path());
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.poll_interval, Duration::from_secs(30));
    assert_eq!(cfg.daily_task_name, "Daily_Test");
    assert_eq!(cfg.settings_path, tmp.path().join(SETTINGS_FILE_NAME));

    env::set_var(ENV_POLL_INTERVAL_SECS, "5");
    env::set_var(ENV_TABLE_PATH, "/elsewhere/table.csv");
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.poll_interval, Duration::from_secs(5));
    assert_eq!(cfg.table_path, PathBuf::from("/elsewhere/table.csv"));

    clear();
}

#[serial_test::serial]
#[test]
fn explicit_config_path_must_exist() {
    clear();
    let tmp = tempfile::tempdir().unwrap();
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
    assert!(AppConfig::load().is_err());
    clear();
}
