// src/config/app.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clock::ClockZone;
use crate::engine::DEFAULT_POLL_INTERVAL;

// --- env names ---
pub const ENV_CONFIG_PATH: &str = "CALENDAR_CONFIG_PATH";
pub const ENV_DATA_DIR: &str = "CALENDAR_DATA_DIR";
pub const ENV_TABLE_PATH: &str = "CALENDAR_TABLE_PATH";
pub const ENV_SETTINGS_PATH: &str = "CALENDAR_SETTINGS_PATH";
pub const ENV_LOG_DIR: &str = "CALENDAR_LOG_DIR";
pub const ENV_EXE_PATH: &str = "CALENDAR_EXE_PATH";
pub const ENV_POLL_INTERVAL_SECS: &str = "CALENDAR_POLL_INTERVAL_SECS";
pub const ENV_DAILY_TIME: &str = "CALENDAR_DAILY_TIME";
pub const ENV_TIMEZONE: &str = "CALENDAR_TIMEZONE";
pub const ENV_REFRESH_COMMAND: &str = "CALENDAR_REFRESH_COMMAND";

// --- defaults ---
pub const TABLE_FILE_NAME: &str = "calendario_profit_filtrado.csv";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LOG_FILE_NAME: &str = "app.log";
pub const EXE_FILE_NAME: &str = "CalendarioEconomico.exe";
pub const LOGON_TASK_NAME: &str = "AtualizarCalendario_Logon";
pub const DAILY_TASK_NAME: &str = "AtualizarCalendario_Diario";
pub const DEFAULT_DAILY_TIME: &str = "08:30";

/// Every path and constant the components need, built once at startup and
/// passed down explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub table_path: PathBuf,
    pub settings_path: PathBuf,
    pub log_dir: PathBuf,
    /// Executable the scheduled tasks relaunch.
    pub exe_path: PathBuf,
    pub logon_task_name: String,
    pub daily_task_name: String,
    pub daily_time: NaiveTime,
    pub poll_interval: Duration,
    /// Zone "now" is read in; the table's zone unless set to `local`.
    pub timezone: ClockZone,
    /// External acquisition command (program + args). `None` means the table is
    /// produced by something else and a refresh only validates it.
    pub refresh_command: Option<Vec<String>>,
}

/// One configuration source. Later layers override earlier ones field by field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub data_dir: Option<PathBuf>,
    pub table_path: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub exe_path: Option<PathBuf>,
    pub logon_task_name: Option<String>,
    pub daily_task_name: Option<String>,
    pub daily_time: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub timezone: Option<String>,
    pub refresh_command: Option<Vec<String>>,
}

impl ConfigLayer {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing config TOML")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Read `CALENDAR_*` variables through `lookup` (normally `std::env::var`).
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let poll_interval_secs = get(ENV_POLL_INTERVAL_SECS)
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| anyhow!("{ENV_POLL_INTERVAL_SECS} must be whole seconds, got {v:?}"))
            })
            .transpose()?;

        Ok(Self {
            data_dir: get(ENV_DATA_DIR).map(PathBuf::from),
            table_path: get(ENV_TABLE_PATH).map(PathBuf::from),
            settings_path: get(ENV_SETTINGS_PATH).map(PathBuf::from),
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from),
            exe_path: get(ENV_EXE_PATH).map(PathBuf::from),
            logon_task_name: None,
            daily_task_name: None,
            daily_time: get(ENV_DAILY_TIME),
            poll_interval_secs,
            timezone: get(ENV_TIMEZONE),
            refresh_command: get(ENV_REFRESH_COMMAND)
                .map(|v| parse_command(&v))
                .transpose()?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// `other` wins wherever it is set.
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            data_dir: other.data_dir.or(self.data_dir),
            table_path: other.table_path.or(self.table_path),
            settings_path: other.settings_path.or(self.settings_path),
            log_dir: other.log_dir.or(self.log_dir),
            exe_path: other.exe_path.or(self.exe_path),
            logon_task_name: other.logon_task_name.or(self.logon_task_name),
            daily_task_name: other.daily_task_name.or(self.daily_task_name),
            daily_time: other.daily_time.or(self.daily_time),
            poll_interval_secs: other.poll_interval_secs.or(self.poll_interval_secs),
            timezone: other.timezone.or(self.timezone),
            refresh_command: other.refresh_command.or(self.refresh_command),
        }
    }
}

/// A JSON array (`["C:\\Program Files\\fetch.exe", "--fast"]`) keeps
/// arguments with spaces intact; anything else is split on whitespace.
fn parse_command(raw: &str) -> Result<Vec<String>> {
    if raw.starts_with('[') {
        serde_json::from_str(raw)
            .with_context(|| format!("{ENV_REFRESH_COMMAND} is not a JSON string array"))
    } else {
        Ok(raw.split_whitespace().map(str::to_string).collect())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join("Profit").join("Calendar"))
        .unwrap_or_else(|| PathBuf::from("calendar-data"))
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("CalendarApp"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

impl AppConfig {
    /// Defaults < config file < environment.
    ///
    /// The file is `$CALENDAR_CONFIG_PATH` when set (it must exist), otherwise
    /// `<data_dir>/config.toml` when present.
    pub fn load() -> Result<Self> {
        let env = ConfigLayer::from_env()?;

        let file = match std::env::var_os(ENV_CONFIG_PATH) {
            Some(p) => ConfigLayer::from_file(Path::new(&p))?,
            None => {
                let dir = env.data_dir.clone().unwrap_or_else(default_data_dir);
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.exists() {
                    ConfigLayer::from_file(&candidate)?
                } else {
                    ConfigLayer::default()
                }
            }
        };

        Self::resolve(file.merge(env))
    }

    /// Fill unset fields with defaults and validate.
    pub fn resolve(layer: ConfigLayer) -> Result<Self> {
        let data_dir = layer.data_dir.unwrap_or_else(default_data_dir);

        let daily_time_raw = layer
            .daily_time
            .unwrap_or_else(|| DEFAULT_DAILY_TIME.to_string());
        let daily_time = NaiveTime::parse_from_str(&daily_time_raw, "%H:%M")
            .with_context(|| format!("daily_time must be HH:MM, got {daily_time_raw:?}"))?;

        let poll_interval = match layer.poll_interval_secs {
            Some(0) => bail!("poll interval must be at least one second"),
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_POLL_INTERVAL,
        };

        let timezone = match layer.timezone.as_deref() {
            Some(raw) => ClockZone::parse(raw)
                .ok_or_else(|| anyhow!("unknown timezone {raw:?} (IANA name or \"local\")"))?,
            None => ClockZone::default(),
        };

        let refresh_command = layer.refresh_command.filter(|c| !c.is_empty());

        let exe_path = layer.exe_path.unwrap_or_else(|| {
            std::env::current_exe().unwrap_or_else(|_| data_dir.join(EXE_FILE_NAME))
        });

        Ok(Self {
            table_path: layer
                .table_path
                .unwrap_or_else(|| data_dir.join(TABLE_FILE_NAME)),
            settings_path: layer
                .settings_path
                .unwrap_or_else(|| data_dir.join(SETTINGS_FILE_NAME)),
            log_dir: layer.log_dir.unwrap_or_else(default_log_dir),
            exe_path,
            logon_task_name: layer
                .logon_task_name
                .unwrap_or_else(|| LOGON_TASK_NAME.to_string()),
            daily_task_name: layer
                .daily_task_name
                .unwrap_or_else(|| DAILY_TASK_NAME.to_string()),
            daily_time,
            poll_interval,
            timezone,
            refresh_command,
            data_dir,
        })
    }

    /// Create the data and log directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.log_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_derive_from_data_dir() {
        let cfg = AppConfig::resolve(ConfigLayer {
            data_dir: Some(PathBuf::from("/data/cal")),
            ..ConfigLayer::default()
        })
        .unwrap();

        assert_eq!(cfg.table_path, PathBuf::from("/data/cal").join(TABLE_FILE_NAME));
        assert_eq!(cfg.settings_path, PathBuf::from("/data/cal").join(SETTINGS_FILE_NAME));
        assert_eq!(cfg.poll_interval, Duration::from_secs(15));
        assert_eq!(cfg.daily_time, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(cfg.logon_task_name, LOGON_TASK_NAME);
        assert_eq!(cfg.daily_task_name, DAILY_TASK_NAME);
        assert!(cfg.refresh_command.is_none());
        assert_eq!(cfg.timezone, ClockZone::default());
    }

    #[test]
    fn env_overrides_file() {
        let file = ConfigLayer::from_toml_str(
            r#"
            data_dir = "/from/file"
            daily_time = "07:00"
            poll_interval_secs = 30
            refresh_command = ["python", "fetch.py"]
            "#,
        )
        .unwrap();
        let env = ConfigLayer::from_env_with(env_of(&[
            (ENV_DAILY_TIME, "09:15"),
            (ENV_TIMEZONE, "Europe/Lisbon"),
        ]))
        .unwrap();

        let cfg = AppConfig::resolve(file.merge(env)).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/from/file"));
        assert_eq!(cfg.daily_time, NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.timezone, ClockZone::parse("Europe/Lisbon").unwrap());
        assert_eq!(
            cfg.refresh_command,
            Some(vec!["python".to_string(), "fetch.py".to_string()])
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ConfigLayer::from_env_with(env_of(&[(ENV_POLL_INTERVAL_SECS, "soon")])).is_err());
        assert!(AppConfig::resolve(ConfigLayer {
            poll_interval_secs: Some(0),
            ..ConfigLayer::default()
        })
        .is_err());
        assert!(AppConfig::resolve(ConfigLayer {
            daily_time: Some("8h30".into()),
            ..ConfigLayer::default()
        })
        .is_err());
        assert!(ConfigLayer::from_toml_str("unknown_key = 1").is_err());
        assert!(AppConfig::resolve(ConfigLayer {
            timezone: Some("Nowhere/Atlantis".into()),
            ..ConfigLayer::default()
        })
        .is_err());
    }

    #[test]
    fn local_time_is_opt_in() {
        let cfg = AppConfig::resolve(ConfigLayer {
            timezone: Some("local".into()),
            ..ConfigLayer::default()
        })
        .unwrap();
        assert_eq!(cfg.timezone, ClockZone::Local);
    }

    #[test]
    fn refresh_command_as_json_array_keeps_spaces() {
        let env = ConfigLayer::from_env_with(env_of(&[(
            ENV_REFRESH_COMMAND,
            r#"["C:\\Program Files\\Calendar\\fetch.exe", "--headless"]"#,
        )]))
        .unwrap();
        assert_eq!(
            env.refresh_command,
            Some(vec![
                r"C:\Program Files\Calendar\fetch.exe".to_string(),
                "--headless".to_string()
            ])
        );

        let plain = ConfigLayer::from_env_with(env_of(&[(ENV_REFRESH_COMMAND, "python fetch.py")]))
            .unwrap();
        assert_eq!(
            plain.refresh_command,
            Some(vec!["python".to_string(), "fetch.py".to_string()])
        );

        assert!(ConfigLayer::from_env_with(env_of(&[(ENV_REFRESH_COMMAND, "[oops")])).is_err());
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let env = ConfigLayer::from_env_with(env_of(&[(ENV_DATA_DIR, "  ")])).unwrap();
        assert_eq!(env, ConfigLayer::default());
    }
}
